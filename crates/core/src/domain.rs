use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Canonical column set of the record table, in storage order.
pub const COLUMNS: [&str; 9] = [
    "post_url",
    "is_post",
    "commenter",
    "text",
    "replies_to",
    "replies_count",
    "likes",
    "date",
    "crawl_time",
];

/// Row identifier, generated once when a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One row of the record table: a post caption, a comment or a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub post_url: String,
    pub is_post: bool,
    pub commenter: String,
    pub text: Option<String>,
    pub replies_to: Option<RecordId>,
    pub replies_count: Option<u32>,
    pub likes: Option<String>,
    pub date: Option<String>,
    pub crawl_time: DateTime<Utc>,
}

impl Record {
    pub fn is_reply(&self) -> bool {
        self.replies_to.is_some()
    }

    pub fn is_comment(&self) -> bool {
        !self.is_post && self.replies_to.is_none()
    }

    /// Names of the optional content fields that could not be resolved.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.text.is_none() {
            missing.push("text");
        }
        if self.likes.is_none() {
            missing.push("likes");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        missing
    }
}

/// Restart points reported when a run stops before finishing its work list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Last post whose records were persisted; resuming from it re-crawls the failed post.
    pub last_completed: Option<String>,
    /// Post that was being crawled; resuming from it skips that post.
    pub in_progress: String,
}
