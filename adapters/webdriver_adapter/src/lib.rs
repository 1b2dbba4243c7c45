use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crawler_core::error::DriverError;
use crawler_core::ports::{BrowserDriver, DriverResult, ElementHandle, Scope, WaitCondition};
use crawler_core::selectors::{Locator, Strategy};
use thirtyfour::prelude::*;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";
const PAGE_HEIGHT: &str = "return document.body.scrollHeight;";
const VIEWPORT_BOTTOM: &str = "return Math.ceil(window.scrollY + window.innerHeight);";

/// W3C WebDriver session (Firefox through geckodriver) behind the
/// synchronous [`BrowserDriver`] port.
///
/// Async calls run on a private current-thread runtime. Elements handed out
/// as [`ElementHandle`]s are cached by their WebDriver element id until the
/// next navigation.
pub struct WebDriverSession {
    runtime: Runtime,
    driver: WebDriver,
    elements: RefCell<HashMap<String, WebElement>>,
}

impl WebDriverSession {
    /// Starts a new browser session on the WebDriver server at `server_url`.
    pub fn connect(server_url: &str, headless: bool) -> DriverResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(command)?;

        let mut caps = DesiredCapabilities::firefox();
        if headless {
            caps.set_headless().map_err(command)?;
        }
        let driver = runtime
            .block_on(WebDriver::new(server_url, caps))
            .map_err(command)?;

        info!(server_url, headless, "browser session started");
        Ok(Self {
            runtime,
            driver,
            elements: RefCell::new(HashMap::new()),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn register(&self, element: WebElement) -> ElementHandle {
        let id = element.element_id().to_string();
        self.elements.borrow_mut().insert(id.clone(), element);
        ElementHandle(id)
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<WebElement> {
        self.elements
            .borrow()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| DriverError::StaleElement(handle.id().to_string()))
    }

    fn script_number(&self, script: &str) -> DriverResult<i64> {
        let ret = self
            .block_on(self.driver.execute(script, Vec::new()))
            .map_err(command)?;
        ret.convert::<i64>().map_err(command)
    }
}

fn by(locator: &Locator) -> By {
    let query = locator.query.as_str();
    match locator.strategy {
        Strategy::Css => By::Css(query),
        Strategy::XPath => By::XPath(query),
        Strategy::Name => By::Name(query),
        Strategy::Id => By::Id(query),
        Strategy::Tag => By::Tag(query),
        Strategy::Class => By::ClassName(query),
    }
}

fn command(e: impl Display) -> DriverError {
    DriverError::Command(e.to_string())
}

impl BrowserDriver for WebDriverSession {
    fn navigate(&self, url: &str) -> DriverResult<()> {
        self.elements.borrow_mut().clear();
        debug!(url, "navigating");
        self.block_on(self.driver.goto(url)).map_err(command)
    }

    fn find_all(&self, locator: &Locator, scope: Scope<'_>) -> DriverResult<Vec<ElementHandle>> {
        let found = match scope {
            Scope::Page => self.block_on(self.driver.find_all(by(locator))),
            Scope::Within(parent) => {
                let parent = self.element(parent)?;
                self.block_on(parent.find_all(by(locator)))
            }
        }
        .map_err(command)?;

        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    fn wait_for(
        &self,
        locator: &Locator,
        scope: Scope<'_>,
        condition: WaitCondition,
        timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>> {
        let parent = match scope {
            Scope::Page => None,
            Scope::Within(parent) => Some(self.element(parent)?),
        };
        let query = match &parent {
            None => self.driver.query(by(locator)),
            Some(parent) => parent.query(by(locator)),
        };
        let query = query.wait(timeout, POLL_INTERVAL);
        let query = match condition {
            WaitCondition::Present => query,
            WaitCondition::Clickable => query.and_clickable(),
        };

        let found = self.block_on(query.first_opt()).map_err(command)?;
        Ok(found.map(|el| self.register(el)))
    }

    fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let element = self.element(element)?;
        self.block_on(element.click()).map_err(command)
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let element = self.element(element)?;
        self.block_on(element.send_keys(text)).map_err(command)
    }

    fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let element = self.element(element)?;
        self.block_on(element.text()).map_err(command)
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let element = self.element(element)?;
        self.block_on(element.attr(name)).map_err(command)
    }

    fn scroll_to_bottom(&self) -> DriverResult<()> {
        self.block_on(self.driver.execute(SCROLL_TO_BOTTOM, Vec::new()))
            .map_err(command)?;
        Ok(())
    }

    fn page_height(&self) -> DriverResult<i64> {
        self.script_number(PAGE_HEIGHT)
    }

    fn scroll_position(&self) -> DriverResult<i64> {
        self.script_number(VIEWPORT_BOTTOM)
    }

    fn quit(&self) -> DriverResult<()> {
        self.elements.borrow_mut().clear();
        self.block_on(self.driver.clone().quit()).map_err(command)?;
        info!("browser session closed");
        Ok(())
    }
}
