//! Live check of the selector table against a known test account.
//!
//! Walks the same path a crawl takes (login, account feed, first post,
//! first comment thread, first reply) and records for every selector
//! whether it matched. Selectors behind a failed step are reported as
//! skipped rather than failed.

use std::fmt;

use tracing::{debug, info};

use crate::config::{Credentials, CrawlerConfig};
use crate::locator::{ClickOutcome, ElementLocator};
use crate::ports::{BrowserDriver, ElementHandle, Result, Scope};
use crate::selectors::SelectorName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Found,
    Missing,
    Skipped,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeStatus::Found => "ok",
            ProbeStatus::Missing => "FAILED",
            ProbeStatus::Skipped => "skipped",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCheck {
    pub name: SelectorName,
    pub status: ProbeStatus,
    /// Overlays and optional reveals are allowed to be absent.
    pub required: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub checks: Vec<SelectorCheck>,
}

impl ProbeReport {
    /// Required selectors that did not match or were never reached.
    pub fn failures(&self) -> impl Iterator<Item = &SelectorCheck> {
        self.checks
            .iter()
            .filter(|c| c.required && c.status != ProbeStatus::Found)
    }

    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn status_of(&self, name: SelectorName) -> Option<ProbeStatus> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.status)
    }
}

const OPTIONAL: &[SelectorName] = &[
    SelectorName::CookiePopup,
    SelectorName::NotificationPopup,
    SelectorName::HiddenComments,
];

struct Probe<'a> {
    locator: ElementLocator<'a>,
    config: &'a CrawlerConfig,
    report: ProbeReport,
}

impl<'a> Probe<'a> {
    fn record(&mut self, name: SelectorName, status: ProbeStatus, detail: Option<String>) {
        self.push(name, status, !OPTIONAL.contains(&name), detail);
    }

    fn push(&mut self, name: SelectorName, status: ProbeStatus, required: bool, detail: Option<String>) {
        debug!(selector = %name, %status, required, "selector probed");
        self.report.checks.push(SelectorCheck {
            name,
            status,
            required,
            detail,
        });
    }

    fn check(&mut self, name: SelectorName, args: &[&str], scope: Scope<'_>) -> Option<ElementHandle> {
        let wait = self.config.timing.control_wait();
        let found = self.locator.best_effort(name, args, scope, wait);
        let status = if found.is_some() {
            ProbeStatus::Found
        } else {
            ProbeStatus::Missing
        };
        self.record(name, status, None);
        found
    }

    fn check_all(&mut self, name: SelectorName, scope: Scope<'_>) -> Result<Vec<ElementHandle>> {
        let found = self.locator.all(name, &[], scope)?;
        let status = if found.is_empty() {
            ProbeStatus::Missing
        } else {
            ProbeStatus::Found
        };
        self.record(name, status, Some(format!("{} match(es)", found.len())));
        Ok(found)
    }

    /// A timestamp element only counts when it carries a `datetime` attribute.
    fn check_date(&mut self, name: SelectorName, scope: Scope<'_>) {
        let wait = self.config.timing.control_wait();
        match self.locator.best_effort(name, &[], scope, wait) {
            Some(el) => match self.locator.read_attribute(&el, "datetime") {
                Some(value) => self.record(name, ProbeStatus::Found, Some(value)),
                None => self.record(
                    name,
                    ProbeStatus::Missing,
                    Some("element has no datetime attribute".to_string()),
                ),
            },
            None => self.record(name, ProbeStatus::Missing, None),
        }
    }

    fn skip(&mut self, names: &[SelectorName], reason: &str) {
        for &name in names {
            self.record(name, ProbeStatus::Skipped, Some(reason.to_string()));
        }
    }

    /// Skipped selectors that could not have rendered, so they count as optional.
    fn skip_unreachable(&mut self, names: &[SelectorName], reason: &str) {
        for &name in names {
            self.push(name, ProbeStatus::Skipped, false, Some(reason.to_string()));
        }
    }
}

/// Logs in, opens `test_account` and its first post, and probes every selector.
///
/// Driver failures while navigating propagate; a selector that does not
/// match is only recorded.
pub fn check_selectors(
    driver: &dyn BrowserDriver,
    config: &CrawlerConfig,
    credentials: Option<&Credentials>,
    test_account: &str,
) -> Result<ProbeReport> {
    let mut probe = Probe {
        locator: ElementLocator::new(driver, &config.selectors),
        config,
        report: ProbeReport::default(),
    };
    let timing = &config.timing;

    driver.navigate(&config.base_url)?;
    if let Some(popup) = probe.check(SelectorName::CookiePopup, &[], Scope::Page) {
        probe.locator.click(SelectorName::CookiePopup, &popup);
    }

    // an authenticated browser profile never renders the login form
    let already_logged_in = probe
        .locator
        .best_effort(SelectorName::ProfileIndicator, &[], Scope::Page, timing.control_wait())
        .is_some();
    if already_logged_in {
        probe.skip_unreachable(LOGIN_FORM, "browser profile is already logged in");
    } else {
        let username = probe.check(SelectorName::UsernameInput, &[], Scope::Page);
        let password = probe.check(SelectorName::PasswordInput, &[], Scope::Page);
        let login = probe.check(SelectorName::LoginButton, &[], Scope::Page);
        if let (Some(credentials), Some(username), Some(password), Some(login)) =
            (credentials, username, password, login)
        {
            driver.send_keys(&username, &credentials.username)?;
            driver.send_keys(&password, &credentials.password)?;
            probe.locator.click(SelectorName::LoginButton, &login);
        }
    }

    let logged_in = probe
        .locator
        .best_effort(SelectorName::ProfileIndicator, &[], Scope::Page, timing.login_wait());
    probe.record(
        SelectorName::ProfileIndicator,
        if logged_in.is_some() {
            ProbeStatus::Found
        } else {
            ProbeStatus::Missing
        },
        None,
    );
    if let Some(popup) = probe.check(SelectorName::NotificationPopup, &[], Scope::Page) {
        probe.locator.click(SelectorName::NotificationPopup, &popup);
    }

    driver.navigate(&config.account_url(test_account))?;
    probe.check(SelectorName::AccountHeader, &[test_account], Scope::Page);

    let posts = probe.check_all(SelectorName::CurrentlyVisiblePosts, Scope::Page)?;
    let first_post = posts
        .first()
        .and_then(|link| probe.locator.read_attribute(link, "href"));
    let Some(post_url) = first_post else {
        probe.skip(POST_PAGE, "no post link on the test account");
        return Ok(finish(probe.report));
    };

    driver.navigate(&post_url)?;
    if probe.check(SelectorName::PostLoaded, &[], Scope::Page).is_none() {
        probe.skip(&POST_PAGE[1..], "post page did not load");
        return Ok(finish(probe.report));
    }
    probe.check(SelectorName::PostCaption, &[], Scope::Page);
    probe.check(SelectorName::PostLikes, &[], Scope::Page);
    probe.check_date(SelectorName::PostDate, Scope::Page);
    probe.check(SelectorName::LoadMoreComments, &[], Scope::Page);
    probe.check(SelectorName::HiddenComments, &[], Scope::Page);
    let view_replies = probe.check(SelectorName::ViewMoreReplies, &[], Scope::Page);

    let threads = probe.check_all(SelectorName::CommentThreads, Scope::Page)?;
    let Some(thread) = threads.first() else {
        probe.skip(COMMENT_FIELDS, "no comment thread on the post");
        probe.skip(REPLY_FIELDS, "no comment thread on the post");
        return Ok(finish(probe.report));
    };

    match probe.check(SelectorName::CommentContainer, &[], Scope::Within(thread)) {
        Some(container) => {
            probe.check(SelectorName::CommentText, &[], Scope::Within(&container));
            probe.check(SelectorName::CommentOwner, &[], Scope::Within(&container));
            probe.check(SelectorName::CommentLikes, &[], Scope::Within(&container));
            probe.check_date(SelectorName::CommentDate, Scope::Within(&container));
        }
        None => probe.skip(&COMMENT_FIELDS[1..], "no comment container in the first thread"),
    }

    // replies of the first thread only render once expanded
    if let Some(control) = view_replies {
        if probe.locator.click(SelectorName::ViewMoreReplies, &control) == ClickOutcome::Clicked {
            std::thread::sleep(timing.reply_settle());
        }
    }
    let replies = probe.check_all(SelectorName::ReplyContainers, Scope::Within(thread))?;
    match replies.first() {
        Some(reply) => {
            probe.check(SelectorName::ReplyText, &[], Scope::Within(reply));
            probe.check(SelectorName::ReplyOwner, &[], Scope::Within(reply));
            probe.check(SelectorName::ReplyLikes, &[], Scope::Within(reply));
            probe.check_date(SelectorName::ReplyDate, Scope::Within(reply));
        }
        None => probe.skip(&REPLY_FIELDS[1..], "no reply in the first thread"),
    }

    Ok(finish(probe.report))
}

fn finish(report: ProbeReport) -> ProbeReport {
    let failed = report.failures().count();
    info!(checked = report.checks.len(), failed, "selector check finished");
    report
}

const LOGIN_FORM: &[SelectorName] = &[
    SelectorName::UsernameInput,
    SelectorName::PasswordInput,
    SelectorName::LoginButton,
];

const COMMENT_FIELDS: &[SelectorName] = &[
    SelectorName::CommentContainer,
    SelectorName::CommentText,
    SelectorName::CommentOwner,
    SelectorName::CommentLikes,
    SelectorName::CommentDate,
];

const REPLY_FIELDS: &[SelectorName] = &[
    SelectorName::ReplyContainers,
    SelectorName::ReplyText,
    SelectorName::ReplyOwner,
    SelectorName::ReplyLikes,
    SelectorName::ReplyDate,
];

const POST_PAGE: &[SelectorName] = &[
    SelectorName::PostLoaded,
    SelectorName::PostCaption,
    SelectorName::PostLikes,
    SelectorName::PostDate,
    SelectorName::LoadMoreComments,
    SelectorName::HiddenComments,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::testing::{FakeDriver, FakeElement};

    const BASE: &str = "https://www.instagram.com/";
    const ACCOUNT: &str = "wdb_test";
    const POST: &str = "https://www.instagram.com/p/first/";

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            timing: Timing::immediate(),
            ..CrawlerConfig::default()
        }
    }

    fn feed(driver: &FakeDriver, config: &CrawlerConfig) {
        let feed = config.account_url(ACCOUNT);
        let header = config
            .selectors
            .resolve(SelectorName::AccountHeader, &[ACCOUNT])
            .unwrap();
        driver.add(&feed, None, FakeElement::matching(header.query));
        driver.add(
            &feed,
            None,
            FakeElement::of(SelectorName::CurrentlyVisiblePosts).attr("href", POST),
        );
    }

    /// Login form whose submit reveals the logged-in indicator.
    fn login_page(driver: &FakeDriver) {
        driver.add(BASE, None, FakeElement::of(SelectorName::UsernameInput));
        driver.add(BASE, None, FakeElement::of(SelectorName::PasswordInput));
        let indicator = driver.add(BASE, None, FakeElement::of(SelectorName::ProfileIndicator).hidden());
        driver.add(
            BASE,
            None,
            FakeElement::of(SelectorName::LoginButton)
                .clicks_until_gone(1)
                .reveals(vec![indicator]),
        );
    }

    fn full_post(driver: &FakeDriver) {
        for name in [
            SelectorName::PostLoaded,
            SelectorName::PostCaption,
            SelectorName::PostLikes,
            SelectorName::LoadMoreComments,
        ] {
            driver.add(POST, None, FakeElement::of(name));
        }
        driver.add(
            POST,
            None,
            FakeElement::of(SelectorName::PostDate).attr("datetime", "2023-03-01T17:24:11.000Z"),
        );

        let thread = driver.add(POST, None, FakeElement::of(SelectorName::CommentThreads));
        let container = driver.add(POST, Some(&thread), FakeElement::of(SelectorName::CommentContainer));
        for name in [
            SelectorName::CommentText,
            SelectorName::CommentOwner,
            SelectorName::CommentLikes,
        ] {
            driver.add(POST, Some(&container), FakeElement::of(name));
        }
        driver.add(
            POST,
            Some(&container),
            FakeElement::of(SelectorName::CommentDate).attr("datetime", "2023-03-01T18:00:00.000Z"),
        );

        let reply = driver.add(
            POST,
            Some(&thread),
            FakeElement::of(SelectorName::ReplyContainers).hidden(),
        );
        for name in [
            SelectorName::ReplyText,
            SelectorName::ReplyOwner,
            SelectorName::ReplyLikes,
        ] {
            driver.add(POST, Some(&reply), FakeElement::of(name));
        }
        driver.add(
            POST,
            Some(&reply),
            FakeElement::of(SelectorName::ReplyDate).attr("datetime", "2023-03-01T19:00:00.000Z"),
        );
        driver.add(
            POST,
            None,
            FakeElement::of(SelectorName::ViewMoreReplies)
                .clicks_until_gone(1)
                .reveals(vec![reply]),
        );
    }

    #[test]
    fn test_every_required_selector_found() {
        let driver = FakeDriver::new();
        let config = config();
        login_page(&driver);
        feed(&driver, &config);
        full_post(&driver);
        let credentials = Credentials::from_parts(Some("tester".into()), Some("pw".into()));

        let report = check_selectors(&driver, &config, credentials.as_ref(), ACCOUNT).unwrap();
        let failures: Vec<_> = report.failures().map(|c| c.name).collect();
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
        assert!(report.passed());
        assert_eq!(report.status_of(SelectorName::CookiePopup), Some(ProbeStatus::Missing));
        assert_eq!(report.status_of(SelectorName::ReplyDate), Some(ProbeStatus::Found));
        assert_eq!(driver.typed().len(), 2);
    }

    #[test]
    fn test_logged_in_profile_does_not_fail_login_form() {
        let driver = FakeDriver::new();
        let config = config();
        driver.add(BASE, None, FakeElement::of(SelectorName::ProfileIndicator));
        feed(&driver, &config);
        full_post(&driver);
        let credentials = Credentials::from_parts(Some("tester".into()), Some("pw".into()));

        let report = check_selectors(&driver, &config, credentials.as_ref(), ACCOUNT).unwrap();
        for name in [
            SelectorName::UsernameInput,
            SelectorName::PasswordInput,
            SelectorName::LoginButton,
        ] {
            assert_eq!(report.status_of(name), Some(ProbeStatus::Skipped));
        }
        assert_eq!(report.status_of(SelectorName::ProfileIndicator), Some(ProbeStatus::Found));
        assert!(report.passed(), "failures: {:?}", report.failures().collect::<Vec<_>>());
        assert!(driver.typed().is_empty());
    }

    #[test]
    fn test_date_without_datetime_attribute_fails() {
        let driver = FakeDriver::new();
        let config = config();
        login_page(&driver);
        feed(&driver, &config);
        driver.add(POST, None, FakeElement::of(SelectorName::PostLoaded));
        driver.add(POST, None, FakeElement::of(SelectorName::PostDate));

        let report = check_selectors(&driver, &config, None, ACCOUNT).unwrap();
        assert_eq!(report.status_of(SelectorName::PostDate), Some(ProbeStatus::Missing));
        assert_eq!(report.status_of(SelectorName::CommentText), Some(ProbeStatus::Skipped));
        assert!(!report.passed());
    }

    #[test]
    fn test_missing_post_link_skips_post_selectors() {
        let driver = FakeDriver::new();
        let config = config();
        login_page(&driver);

        let report = check_selectors(&driver, &config, None, ACCOUNT).unwrap();
        assert_eq!(report.status_of(SelectorName::AccountHeader), Some(ProbeStatus::Missing));
        assert_eq!(report.status_of(SelectorName::PostLoaded), Some(ProbeStatus::Skipped));
        assert_eq!(report.status_of(SelectorName::ReplyDate), Some(ProbeStatus::Skipped));
        assert!(!report.passed());
        assert!(driver.typed().is_empty());
    }
}
