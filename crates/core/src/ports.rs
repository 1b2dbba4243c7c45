use std::path::Path;
use std::time::Duration;

use crate::domain::{Record, RecordId};
use crate::error::{CrawlError, DriverError};
use crate::selectors::Locator;

pub type Result<T> = std::result::Result<T, CrawlError>;
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Opaque handle to a live page element, issued by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Where a lookup searches: the whole document or the subtree of one element.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Page,
    Within(&'a ElementHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    Present,
    Clickable,
}

/// Browser automation capability used by the crawler.
/// This is a port: the webdriver adapter and the test fake implement it.
pub trait BrowserDriver {
    fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Immediate lookup; an empty vec when nothing matches.
    fn find_all(&self, locator: &Locator, scope: Scope<'_>) -> DriverResult<Vec<ElementHandle>>;

    /// Polls until an element satisfies `condition` or `timeout` expires (`Ok(None)`).
    fn wait_for(
        &self,
        locator: &Locator,
        scope: Scope<'_>,
        condition: WaitCondition,
        timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>>;

    fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    fn scroll_to_bottom(&self) -> DriverResult<()>;

    /// Total content height of the document.
    fn page_height(&self) -> DriverResult<i64>;

    /// Vertical position of the bottom edge of the viewport.
    fn scroll_position(&self) -> DriverResult<i64>;

    fn quit(&self) -> DriverResult<()>;
}

/// Durable storage behind the [`RecordStore`](crate::store::RecordStore).
pub trait RecordRepository {
    fn exists(&self) -> bool;

    /// All stored rows in insertion order.
    fn load(&self) -> Result<Vec<(RecordId, Record)>>;

    /// Replaces the stored contents with `rows`.
    fn save(&self, rows: &[(RecordId, Record)]) -> Result<()>;

    fn location(&self) -> String;
}

/// Newline-delimited post URL list file.
pub trait PostListStore {
    fn read(&self, path: &Path) -> Result<Vec<String>>;
    fn write(&self, path: &Path, posts: &[String]) -> Result<()>;
}
