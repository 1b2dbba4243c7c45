use chrono::Utc;
use tracing::warn;

use crate::config::Timing;
use crate::domain::{Record, RecordId};
use crate::locator::ElementLocator;
use crate::ports::{ElementHandle, Scope};
use crate::selectors::SelectorName;
use crate::utils::normalize_timestamp;

const DATETIME_ATTRIBUTE: &str = "datetime";

/// What kind of content a record was extracted from. Used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Post,
    Comment,
    Reply,
}

impl ContentKind {
    fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Comment => "comment",
            ContentKind::Reply => "reply",
        }
    }

    fn selectors(&self) -> FieldSelectors {
        match self {
            ContentKind::Post => FieldSelectors {
                text: SelectorName::PostCaption,
                author: None,
                likes: SelectorName::PostLikes,
                date: SelectorName::PostDate,
            },
            ContentKind::Comment => FieldSelectors {
                text: SelectorName::CommentText,
                author: Some(SelectorName::CommentOwner),
                likes: SelectorName::CommentLikes,
                date: SelectorName::CommentDate,
            },
            ContentKind::Reply => FieldSelectors {
                text: SelectorName::ReplyText,
                author: Some(SelectorName::ReplyOwner),
                likes: SelectorName::ReplyLikes,
                date: SelectorName::ReplyDate,
            },
        }
    }
}

struct FieldSelectors {
    text: SelectorName,
    /// `None` when the author is known up front (the crawled account).
    author: Option<SelectorName>,
    likes: SelectorName,
    date: SelectorName,
}

#[derive(Debug, Default)]
struct ContentFields {
    text: Option<String>,
    author: Option<String>,
    likes: Option<String>,
    date: Option<String>,
}

/// Builds records from located content containers.
///
/// Every field is looked up independently and best-effort: a field whose
/// element is missing stays `None` and the record is still produced.
pub struct Extractor<'a> {
    locator: &'a ElementLocator<'a>,
    timing: &'a Timing,
}

impl<'a> Extractor<'a> {
    pub fn new(locator: &'a ElementLocator<'a>, timing: &'a Timing) -> Self {
        Self { locator, timing }
    }

    /// The post's own caption record. Its fields are looked up page-wide.
    pub fn post_record(&self, post_url: &str, account: &str, replies_count: u32) -> Record {
        let fields = self.fields(ContentKind::Post, Scope::Page);
        let record = Record {
            post_url: post_url.to_string(),
            is_post: true,
            commenter: account.to_string(),
            text: fields.text,
            replies_to: None,
            replies_count: Some(replies_count),
            likes: fields.likes,
            date: fields.date,
            crawl_time: Utc::now(),
        };
        report_partial(ContentKind::Post, &record, false);
        record
    }

    pub fn comment_record(&self, post_url: &str, container: &ElementHandle, replies_count: u32) -> Record {
        self.nested_record(ContentKind::Comment, post_url, container, None, Some(replies_count))
    }

    pub fn reply_record(&self, post_url: &str, container: &ElementHandle, parent: RecordId) -> Record {
        self.nested_record(ContentKind::Reply, post_url, container, Some(parent), None)
    }

    fn nested_record(
        &self,
        kind: ContentKind,
        post_url: &str,
        container: &ElementHandle,
        replies_to: Option<RecordId>,
        replies_count: Option<u32>,
    ) -> Record {
        let fields = self.fields(kind, Scope::Within(container));
        let author_missing = fields.author.is_none();
        let record = Record {
            post_url: post_url.to_string(),
            is_post: false,
            commenter: fields.author.unwrap_or_default(),
            text: fields.text,
            replies_to,
            replies_count,
            likes: fields.likes,
            date: fields.date,
            crawl_time: Utc::now(),
        };
        report_partial(kind, &record, author_missing);
        record
    }

    fn fields(&self, kind: ContentKind, scope: Scope<'_>) -> ContentFields {
        let selectors = kind.selectors();
        let wait = self.timing.field_wait();

        ContentFields {
            text: self.locator.text_of(selectors.text, scope, wait),
            author: selectors
                .author
                .and_then(|author| self.locator.text_of(author, scope, wait)),
            likes: self.locator.text_of(selectors.likes, scope, wait),
            date: self
                .locator
                .attribute_of(selectors.date, DATETIME_ATTRIBUTE, scope, wait)
                .and_then(|raw| normalize_timestamp(&raw)),
        }
    }
}

fn report_partial(kind: ContentKind, record: &Record, author_missing: bool) {
    let mut missing = record.missing_fields();
    if author_missing {
        missing.push("commenter");
    }
    if !missing.is_empty() {
        warn!(
            post_url = %record.post_url,
            kind = kind.as_str(),
            missing = ?missing,
            "partial extraction"
        );
    }
}
