use std::time::Duration;

use tracing::debug;

use crate::error::CrawlError;
use crate::ports::{BrowserDriver, ElementHandle, Result, Scope, WaitCondition};
use crate::selectors::{SelectorName, SelectorTable};

/// Result of trying to click a control that may or may not be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked,
    NotFound,
}

/// Resolves named selectors against the driver.
///
/// Every lookup is bounded. `require` turns an expired wait into
/// [`CrawlError::ElementNotFound`]; the best-effort calls swallow it.
pub struct ElementLocator<'a> {
    driver: &'a dyn BrowserDriver,
    selectors: &'a SelectorTable,
}

impl<'a> ElementLocator<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, selectors: &'a SelectorTable) -> Self {
        Self { driver, selectors }
    }

    pub fn driver(&self) -> &'a dyn BrowserDriver {
        self.driver
    }

    pub fn require(
        &self,
        name: SelectorName,
        args: &[&str],
        scope: Scope<'_>,
        timeout: Duration,
    ) -> Result<ElementHandle> {
        let locator = self.selectors.resolve(name, args)?;
        let found = self
            .driver
            .wait_for(&locator, scope, WaitCondition::Present, timeout)?;
        found.ok_or_else(|| CrawlError::ElementNotFound {
            selector: format!("{name} ({locator})"),
            waited_ms: timeout.as_millis(),
        })
    }

    pub fn best_effort(
        &self,
        name: SelectorName,
        args: &[&str],
        scope: Scope<'_>,
        timeout: Duration,
    ) -> Option<ElementHandle> {
        let locator = match self.selectors.resolve(name, args) {
            Ok(locator) => locator,
            Err(e) => {
                debug!(selector = %name, error = %e, "selector could not be resolved");
                return None;
            }
        };
        match self
            .driver
            .wait_for(&locator, scope, WaitCondition::Present, timeout)
        {
            Ok(found) => found,
            Err(e) => {
                debug!(selector = %name, error = %e, "best-effort lookup failed");
                None
            }
        }
    }

    /// Every current match, without waiting.
    ///
    /// An empty list means nothing matched; a driver failure is an error.
    pub fn all(&self, name: SelectorName, args: &[&str], scope: Scope<'_>) -> Result<Vec<ElementHandle>> {
        let locator = self.selectors.resolve(name, args)?;
        Ok(self.driver.find_all(&locator, scope)?)
    }

    /// Waits for a clickable match and clicks it.
    /// A missing control, or one that refuses the click, is `NotFound`.
    pub fn try_click(
        &self,
        name: SelectorName,
        args: &[&str],
        scope: Scope<'_>,
        timeout: Duration,
    ) -> Result<ClickOutcome> {
        let locator = self.selectors.resolve(name, args)?;
        let element = match self
            .driver
            .wait_for(&locator, scope, WaitCondition::Clickable, timeout)
        {
            Ok(Some(element)) => element,
            Ok(None) => return Ok(ClickOutcome::NotFound),
            Err(e) => {
                debug!(selector = %name, error = %e, "waiting for clickable control failed");
                return Ok(ClickOutcome::NotFound);
            }
        };
        Ok(self.click(name, &element))
    }

    /// First clickable match within `timeout`, if any.
    pub fn wait_clickable(&self, name: SelectorName, scope: Scope<'_>, timeout: Duration) -> Result<Option<ElementHandle>> {
        let locator = self.selectors.resolve(name, &[])?;
        match self
            .driver
            .wait_for(&locator, scope, WaitCondition::Clickable, timeout)
        {
            Ok(found) => Ok(found),
            Err(e) => {
                debug!(selector = %name, error = %e, "waiting for clickable control failed");
                Ok(None)
            }
        }
    }

    /// Clicks an already located element.
    pub fn click(&self, name: SelectorName, element: &ElementHandle) -> ClickOutcome {
        match self.driver.click(element) {
            Ok(()) => ClickOutcome::Clicked,
            Err(e) => {
                debug!(selector = %name, error = %e, "click failed");
                ClickOutcome::NotFound
            }
        }
    }

    /// Visible text of the best-effort match, trimmed; blank text counts as absent.
    pub fn text_of(&self, name: SelectorName, scope: Scope<'_>, timeout: Duration) -> Option<String> {
        let element = self.best_effort(name, &[], scope, timeout)?;
        self.read_text(&element)
    }

    pub fn read_text(&self, element: &ElementHandle) -> Option<String> {
        match self.driver.text(element) {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                debug!(element = element.id(), error = %e, "reading text failed");
                None
            }
        }
    }

    pub fn attribute_of(
        &self,
        name: SelectorName,
        attribute: &str,
        scope: Scope<'_>,
        timeout: Duration,
    ) -> Option<String> {
        let element = self.best_effort(name, &[], scope, timeout)?;
        self.read_attribute(&element, attribute)
    }

    pub fn read_attribute(&self, element: &ElementHandle, attribute: &str) -> Option<String> {
        match self.driver.attribute(element, attribute) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                debug!(element = element.id(), attribute, error = %e, "reading attribute failed");
                None
            }
        }
    }
}
