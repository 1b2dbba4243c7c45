//! Traversal and extraction core for the thread crawler.
//!
//! The crate is organised as ports and adapters: `ports` declares what the
//! crawler needs from the outside world (a browser driver, durable record
//! storage, a post list file) and `application` drives a run against those
//! ports. Concrete adapters live in their own workspace crates.

pub mod application;
pub mod cancel;
pub mod config;
pub mod convergence;
pub mod domain;
pub mod error;
pub mod extract;
pub mod locator;
pub mod ports;
pub mod probe;
pub mod selectors;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CrawlError, DriverError};
pub use ports::Result;
