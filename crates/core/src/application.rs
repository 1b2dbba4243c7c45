use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::{post_list_path, Credentials, CrawlerConfig};
use crate::convergence::{expand_pagination, expand_threads, scroll_to_end};
use crate::domain::{Checkpoint, RecordId};
use crate::error::CrawlError;
use crate::extract::Extractor;
use crate::locator::{ClickOutcome, ElementLocator};
use crate::ports::{BrowserDriver, PostListStore, Result, Scope};
use crate::selectors::SelectorName;
use crate::store::RecordStore;

const POST_LINK_ATTRIBUTE: &str = "href";

/// What a single run should do.
#[derive(Debug, Clone, Default)]
pub struct CrawlRequest {
    pub account: String,
    /// Existing post list; enumeration is skipped when set.
    pub post_list: Option<PathBuf>,
    /// Stop after writing the enumerated post list.
    pub only_enumerate: bool,
    /// Crawling starts at the entry after this url.
    pub resume_from: Option<String>,
}

impl CrawlRequest {
    /// Rejects argument combinations that need no browser to detect.
    pub fn validate(&self) -> Result<()> {
        if self.account.trim().is_empty() {
            return Err(CrawlError::InvalidArguments(
                "account name must not be empty".to_string(),
            ));
        }
        if self.only_enumerate && self.post_list.is_some() {
            return Err(CrawlError::InvalidArguments(
                "stopping after enumeration makes no sense with an existing post list".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads a given post list and checks the resume target against it.
    ///
    /// Needs no browser, so a bad list or resume url fails before one starts.
    pub fn check_post_list(&self, post_lists: &dyn PostListStore) -> Result<()> {
        self.validate()?;
        if let Some(path) = &self.post_list {
            let posts = post_lists.read(path)?;
            work_start(&posts, self.resume_from.as_deref())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Enumerated {
        posts: usize,
        post_list: PathBuf,
    },
    /// `skipped` posts already had a post record in the table.
    Crawled {
        posts: usize,
        skipped: usize,
        post_list: PathBuf,
    },
}

/// Counts for one crawled post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    pub comments: usize,
    pub replies: usize,
}

/// A post failed or the run was interrupted mid-crawl.
#[derive(Debug, Error)]
#[error("crawling {} failed: {source}", .checkpoint.in_progress)]
pub struct RunFailure {
    pub checkpoint: Checkpoint,
    /// The list the run was working through, for restart instructions.
    pub post_list: PathBuf,
    #[source]
    pub source: CrawlError,
}

#[derive(Debug, Error)]
pub enum RunError {
    /// Failed before any post was crawled.
    #[error(transparent)]
    Setup(#[from] CrawlError),

    #[error(transparent)]
    Aborted(#[from] RunFailure),
}

/// Drives a crawl: session, enumeration, per-post extraction and checkpointing.
///
/// The service owns the browser session and the record table for the whole
/// run and shuts the browser down when [`run`](CrawlService::run) returns.
pub struct CrawlService {
    driver: Box<dyn BrowserDriver>,
    store: RecordStore,
    post_lists: Box<dyn PostListStore>,
    config: CrawlerConfig,
    cancel: CancelFlag,
    data_dir: PathBuf,
    credentials: Option<Credentials>,
}

impl CrawlService {
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        store: RecordStore,
        post_lists: Box<dyn PostListStore>,
        config: CrawlerConfig,
        cancel: CancelFlag,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            driver,
            store,
            post_lists,
            config,
            cancel,
            data_dir: data_dir.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Executes the request and quits the browser, whatever the result.
    pub fn run(mut self, request: &CrawlRequest) -> std::result::Result<RunOutcome, RunError> {
        let result = self.execute(request);
        if let Err(e) = self.driver.quit() {
            warn!(error = %e, "browser session did not shut down cleanly");
        }
        result
    }

    fn execute(&mut self, request: &CrawlRequest) -> std::result::Result<RunOutcome, RunError> {
        request.validate()?;

        let (posts, post_list, logged_in) = match &request.post_list {
            Some(path) => {
                let posts = self.post_lists.read(path)?;
                info!(path = %path.display(), posts = posts.len(), "post list loaded");
                (posts, path.clone(), false)
            }
            None => {
                self.establish_session(false)?;
                let posts = self.enumerate_posts(&request.account)?;
                let path = post_list_path(&self.data_dir, &request.account);
                self.post_lists.write(&path, &posts)?;
                info!(path = %path.display(), posts = posts.len(), "post urls saved");

                if request.only_enumerate {
                    return Ok(RunOutcome::Enumerated {
                        posts: posts.len(),
                        post_list: path,
                    });
                }
                (posts, path, true)
            }
        };

        let start = work_start(&posts, request.resume_from.as_deref())?;
        let work = &posts[start..];

        self.establish_session(logged_in)?;

        let mut checkpoint = Checkpoint {
            last_completed: request.resume_from.clone(),
            in_progress: String::new(),
        };
        let mut crawled_posts = 0;
        let mut skipped = 0;
        for (position, post_url) in work.iter().enumerate() {
            checkpoint.in_progress = post_url.clone();
            if self.store.has_post(post_url) {
                info!(post_url = %post_url, "post already in the record table, skipping");
                skipped += 1;
                checkpoint.last_completed = Some(post_url.clone());
                continue;
            }
            debug!(post_url = %post_url, position = start + position + 1, total = posts.len(), "crawling post");

            let crawled = self
                .cancel
                .check()
                .and_then(|()| self.crawl_post(post_url, &request.account));
            if let Err(source) = crawled {
                return Err(RunFailure {
                    checkpoint,
                    post_list,
                    source,
                }
                .into());
            }
            crawled_posts += 1;
            checkpoint.last_completed = Some(post_url.clone());
        }

        info!(posts = crawled_posts, skipped, records = self.store.len(), "crawl finished");
        Ok(RunOutcome::Crawled {
            posts: crawled_posts,
            skipped,
            post_list,
        })
    }

    /// Opens the base page and, unless `logged_in`, clears the cookie overlay and logs in.
    ///
    /// Every step here is best-effort: an already authenticated browser
    /// profile simply shows none of the login controls.
    pub fn establish_session(&self, logged_in: bool) -> Result<()> {
        let timing = &self.config.timing;
        self.driver.navigate(&self.config.base_url)?;
        let locator = ElementLocator::new(self.driver.as_ref(), &self.config.selectors);

        if !logged_in {
            if locator.try_click(SelectorName::CookiePopup, &[], Scope::Page, timing.popup_wait())?
                == ClickOutcome::NotFound
            {
                debug!("no cookie consent overlay");
            }
            self.login(&locator)?;
        }

        if locator
            .best_effort(SelectorName::ProfileIndicator, &[], Scope::Page, timing.page_load_wait())
            .is_none()
        {
            warn!("logged-in indicator did not appear; continuing anyway");
        }

        // shows up at random after login
        locator.try_click(SelectorName::NotificationPopup, &[], Scope::Page, timing.popup_wait())?;
        Ok(())
    }

    fn login(&self, locator: &ElementLocator<'_>) -> Result<()> {
        let timing = &self.config.timing;
        let Some(credentials) = &self.credentials else {
            info!("no credentials configured, resuming existing browser session");
            return Ok(());
        };

        thread::sleep(timing.account_settle());
        let Some(username) =
            locator.best_effort(SelectorName::UsernameInput, &[], Scope::Page, timing.login_wait())
        else {
            warn!("login form did not appear");
            return Ok(());
        };
        let Some(password) =
            locator.best_effort(SelectorName::PasswordInput, &[], Scope::Page, timing.field_wait())
        else {
            warn!("password input not found");
            return Ok(());
        };

        let driver = locator.driver();
        let typed = driver
            .send_keys(&username, &credentials.username)
            .and_then(|()| driver.send_keys(&password, &credentials.password));
        if let Err(e) = typed {
            warn!(error = %e, "typing credentials failed");
            return Ok(());
        }

        match locator.try_click(SelectorName::LoginButton, &[], Scope::Page, timing.control_wait())? {
            ClickOutcome::Clicked => info!(username = %credentials.username, "login submitted"),
            ClickOutcome::NotFound => warn!("login button not found"),
        }
        Ok(())
    }

    /// Scrolls the account feed to the end and returns its post urls in first-seen order.
    pub fn enumerate_posts(&self, account: &str) -> Result<Vec<String>> {
        let timing = &self.config.timing;
        self.driver.navigate(&self.config.account_url(account))?;
        let locator = ElementLocator::new(self.driver.as_ref(), &self.config.selectors);
        locator.require(SelectorName::AccountHeader, &[account], Scope::Page, timing.page_load_wait())?;
        thread::sleep(timing.account_settle());

        let mut seen_links = HashSet::new();
        let mut seen_urls = HashSet::new();
        let mut posts = Vec::new();
        let report = scroll_to_end(self.driver.as_ref(), timing, &self.cancel, || {
            // the next scroll lists the same links again
            let links = match locator.all(SelectorName::CurrentlyVisiblePosts, &[], Scope::Page) {
                Ok(links) => links,
                Err(e) => {
                    warn!(error = %e, "listing visible posts failed");
                    return Ok(());
                }
            };
            for link in links {
                if !seen_links.insert(link.clone()) {
                    continue;
                }
                if let Some(url) = locator.read_attribute(&link, POST_LINK_ATTRIBUTE) {
                    if seen_urls.insert(url.clone()) {
                        posts.push(url);
                    }
                }
            }
            Ok(())
        })?;

        info!(account, posts = posts.len(), scrolls = report.actions, "post enumeration finished");
        Ok(posts)
    }

    /// Crawls one post fully and persists the table once at the end.
    pub fn crawl_post(&mut self, post_url: &str, account: &str) -> Result<PostSummary> {
        let timing = &self.config.timing;
        let cancel = &self.cancel;

        self.driver.navigate(post_url)?;
        let locator = ElementLocator::new(self.driver.as_ref(), &self.config.selectors);
        locator.require(SelectorName::PostLoaded, &[], Scope::Page, timing.page_load_wait())?;
        cancel.check()?;

        let pagination = expand_pagination(&locator, SelectorName::LoadMoreComments, timing, cancel)?;
        debug!(post_url, clicks = pagination.actions, "comments loaded");
        cancel.check()?;

        if locator.try_click(SelectorName::HiddenComments, &[], Scope::Page, timing.control_wait())?
            == ClickOutcome::Clicked
        {
            debug!(post_url, "hidden comments revealed");
            thread::sleep(timing.pagination_settle());
        }

        let expansion = expand_threads(&locator, SelectorName::ViewMoreReplies, timing, cancel)?;
        debug!(post_url, clicks = expansion.actions, "replies loaded");
        cancel.check()?;

        let threads = locator.all(SelectorName::CommentThreads, &[], Scope::Page)?;
        let extractor = Extractor::new(&locator, timing);
        self.store.upsert(
            RecordId::generate(),
            extractor.post_record(post_url, account, count(threads.len())),
        );

        let mut summary = PostSummary::default();
        for thread in &threads {
            cancel.check()?;
            let container = locator.require(
                SelectorName::CommentContainer,
                &[],
                Scope::Within(thread),
                timing.field_wait(),
            )?;
            let replies = locator.all(SelectorName::ReplyContainers, &[], Scope::Within(thread))?;

            let comment_id = RecordId::generate();
            self.store.upsert(
                comment_id,
                extractor.comment_record(post_url, &container, count(replies.len())),
            );
            summary.comments += 1;

            for reply in &replies {
                self.store
                    .upsert(RecordId::generate(), extractor.reply_record(post_url, reply, comment_id));
                summary.replies += 1;
            }
        }

        self.store.persist()?;
        for violation in self.store.integrity_violations() {
            warn!(post_url, violation = %violation, "record table integrity");
        }
        info!(post_url, comments = summary.comments, replies = summary.replies, "post crawled");
        Ok(summary)
    }
}

/// Index of the first post to crawl: the entry after `resume_from`, or 0.
pub fn resume_index(posts: &[String], resume_from: Option<&str>) -> Result<usize> {
    match resume_from {
        None => Ok(0),
        Some(url) => posts
            .iter()
            .position(|p| p == url)
            .map(|i| i + 1)
            .ok_or_else(|| CrawlError::InvalidResumeTarget(url.to_string())),
    }
}

/// Like [`resume_index`], but an empty remainder is an error.
fn work_start(posts: &[String], resume_from: Option<&str>) -> Result<usize> {
    let start = resume_index(posts, resume_from)?;
    if start >= posts.len() {
        return Err(CrawlError::EmptyWorkList);
    }
    Ok(start)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
