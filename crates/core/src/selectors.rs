use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::CrawlError;
use crate::ports::Result;

/// How a query string is interpreted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Css,
    #[serde(rename = "xpath")]
    XPath,
    Name,
    Id,
    Tag,
    Class,
}

/// Logical names for every element the crawler looks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorName {
    CookiePopup,
    NotificationPopup,
    ProfileIndicator,
    UsernameInput,
    PasswordInput,
    LoginButton,
    AccountHeader,
    CurrentlyVisiblePosts,
    PostLoaded,
    HiddenComments,
    PostCaption,
    PostLikes,
    PostDate,
    LoadMoreComments,
    ViewMoreReplies,
    CommentThreads,
    CommentContainer,
    CommentText,
    CommentOwner,
    CommentLikes,
    CommentDate,
    ReplyContainers,
    ReplyText,
    ReplyOwner,
    ReplyLikes,
    ReplyDate,
}

impl SelectorName {
    pub const ALL: [SelectorName; 26] = [
        SelectorName::CookiePopup,
        SelectorName::NotificationPopup,
        SelectorName::ProfileIndicator,
        SelectorName::UsernameInput,
        SelectorName::PasswordInput,
        SelectorName::LoginButton,
        SelectorName::AccountHeader,
        SelectorName::CurrentlyVisiblePosts,
        SelectorName::PostLoaded,
        SelectorName::HiddenComments,
        SelectorName::PostCaption,
        SelectorName::PostLikes,
        SelectorName::PostDate,
        SelectorName::LoadMoreComments,
        SelectorName::ViewMoreReplies,
        SelectorName::CommentThreads,
        SelectorName::CommentContainer,
        SelectorName::CommentText,
        SelectorName::CommentOwner,
        SelectorName::CommentLikes,
        SelectorName::CommentDate,
        SelectorName::ReplyContainers,
        SelectorName::ReplyText,
        SelectorName::ReplyOwner,
        SelectorName::ReplyLikes,
        SelectorName::ReplyDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorName::CookiePopup => "cookie_popup",
            SelectorName::NotificationPopup => "notification_popup",
            SelectorName::ProfileIndicator => "profile_indicator",
            SelectorName::UsernameInput => "username_input",
            SelectorName::PasswordInput => "password_input",
            SelectorName::LoginButton => "login_button",
            SelectorName::AccountHeader => "account_header",
            SelectorName::CurrentlyVisiblePosts => "currently_visible_posts",
            SelectorName::PostLoaded => "post_loaded",
            SelectorName::HiddenComments => "hidden_comments",
            SelectorName::PostCaption => "post_caption",
            SelectorName::PostLikes => "post_likes",
            SelectorName::PostDate => "post_date",
            SelectorName::LoadMoreComments => "load_more_comments",
            SelectorName::ViewMoreReplies => "view_more_replies",
            SelectorName::CommentThreads => "comment_threads",
            SelectorName::CommentContainer => "comment_container",
            SelectorName::CommentText => "comment_text",
            SelectorName::CommentOwner => "comment_owner",
            SelectorName::CommentLikes => "comment_likes",
            SelectorName::CommentDate => "comment_date",
            SelectorName::ReplyContainers => "reply_containers",
            SelectorName::ReplyText => "reply_text",
            SelectorName::ReplyOwner => "reply_owner",
            SelectorName::ReplyLikes => "reply_likes",
            SelectorName::ReplyDate => "reply_date",
        }
    }
}

impl FromStr for SelectorName {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self> {
        SelectorName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CrawlError::Selector(format!("unknown selector name '{s}'")))
    }
}

impl fmt::Display for SelectorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PLACEHOLDER: &str = "{}";

/// Query string with positional `{}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct QueryTemplate(String);

impl QueryTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn placeholders(&self) -> usize {
        self.0.matches(PLACEHOLDER).count()
    }

    /// Substitutes `args` into the placeholders, left to right.
    /// The argument count must match the placeholder count exactly.
    pub fn interpolate(&self, args: &[&str]) -> Result<String> {
        let expected = self.placeholders();
        if expected != args.len() {
            return Err(CrawlError::Selector(format!(
                "query '{}' expects {} argument(s), got {}",
                self.0,
                expected,
                args.len()
            )));
        }

        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        for arg in args {
            // placeholder count was checked above
            if let Some(pos) = rest.find(PLACEHOLDER) {
                out.push_str(&rest[..pos]);
                out.push_str(arg);
                rest = &rest[pos + PLACEHOLDER.len()..];
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A declarative element descriptor: strategy plus query template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Selector {
    pub strategy: Strategy,
    pub query: QueryTemplate,
}

impl Selector {
    pub fn new(strategy: Strategy, query: &str) -> Self {
        Self {
            strategy,
            query: QueryTemplate::new(query),
        }
    }

    pub fn resolve(&self, args: &[&str]) -> Result<Locator> {
        Ok(Locator {
            strategy: self.strategy,
            query: self.query.interpolate(args)?,
        })
    }
}

/// A fully interpolated selector, ready to hand to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub strategy: Strategy,
    pub query: String,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.strategy, self.query)
    }
}

/// Static mapping from logical names to selectors. Built once at startup.
#[derive(Debug, Clone)]
pub struct SelectorTable {
    entries: HashMap<SelectorName, Selector>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        use SelectorName::*;
        use Strategy::*;

        let defaults = [
            (CookiePopup, XPath, "//*[text()='Allow essential and optional cookies']"),
            (NotificationPopup, XPath, "//*[text()='Not now']"),
            (ProfileIndicator, XPath, ".//div[contains(text(), 'Profil')]"),
            (UsernameInput, Name, "username"),
            (PasswordInput, Name, "password"),
            (LoginButton, Css, "button[type='submit']"),
            (AccountHeader, XPath, "//h2[contains(text(),'{}')]"),
            (CurrentlyVisiblePosts, Css, "article a"),
            (PostLoaded, Css, "li div>div div:nth-child(2)"),
            (HiddenComments, XPath, ".//*[contains(text(), 'View hidden')]"),
            (PostCaption, Css, "div[role='button'] li div div div:nth-child(2) div>span"),
            (PostLikes, Css, "div[role='presentation'] div section:nth-child(2) div div div a div"),
            (PostDate, Css, "div[role='presentation'] div div:nth-child(2) time"),
            (LoadMoreComments, Css, "[aria-label='Load more comments']"),
            (ViewMoreReplies, XPath, ".//*[contains(text(), 'View replies') and @class='_a9yi']"),
            (CommentThreads, Css, "div[role='presentation'] ul>ul"),
            (CommentContainer, Css, "li div>div div:nth-child(2)"),
            (CommentText, Css, "div._a9zs span"),
            (CommentOwner, Css, "h3"),
            (CommentLikes, XPath, ".//div[contains(text(), 'like')]"),
            (CommentDate, Css, "time"),
            (ReplyContainers, Css, "li > ul > div[role='button']>li>div>div>div:nth-child(2)"),
            (ReplyText, Css, "div._a9zs span"),
            (ReplyOwner, Css, "h3"),
            (ReplyLikes, XPath, ".//div[contains(text(), 'like')]"),
            (ReplyDate, Css, "time"),
        ];

        let entries = defaults
            .into_iter()
            .map(|(name, strategy, query)| (name, Selector::new(strategy, query)))
            .collect();
        Self { entries }
    }
}

impl SelectorTable {
    /// Default table with `overrides` replacing individual entries.
    pub fn with_overrides(overrides: HashMap<SelectorName, Selector>) -> Self {
        let mut table = Self::default();
        table.entries.extend(overrides);
        table
    }

    pub fn get(&self, name: SelectorName) -> Result<&Selector> {
        self.entries
            .get(&name)
            .ok_or_else(|| CrawlError::Selector(format!("no selector configured for '{name}'")))
    }

    pub fn resolve(&self, name: SelectorName, args: &[&str]) -> Result<Locator> {
        self.get(name)?.resolve(args)
    }
}
