use thiserror::Error;

use crate::domain::RecordId;

/// Failures reported by a [`BrowserDriver`](crate::ports::BrowserDriver) implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out waiting for element")]
    Timeout,

    #[error("no such element")]
    NoSuchElement,

    #[error("stale element handle: {0}")]
    StaleElement(String),

    #[error("driver command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("required element '{selector}' did not appear within {waited_ms} ms")]
    ElementNotFound { selector: String, waited_ms: u128 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("resume post url {0} is not present in the post list")]
    InvalidResumeTarget(String),

    #[error("run interrupted")]
    Interrupted,

    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("operation not supported by the record store: {0}")]
    NotImplemented(&'static str),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("no posts found to crawl")]
    EmptyWorkList,

    #[error("post list error: {0}")]
    PostList(String),

    #[error("selector configuration error: {0}")]
    Selector(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}
