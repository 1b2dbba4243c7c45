//! Loops that reveal lazily loaded content until the page stops changing.
//!
//! All three share one shape: act, let the page settle for a fixed delay,
//! observe, stop once the observation no longer moves. A missing control is
//! the normal way for a loop to end, not an error.

use std::thread;

use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::config::Timing;
use crate::locator::{ClickOutcome, ElementLocator};
use crate::ports::{BrowserDriver, Result, Scope};
use crate::selectors::SelectorName;

/// How a convergence loop finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Scrolls or clicks performed.
    pub actions: usize,
    /// The loop hit `max_rounds` before the signal settled.
    pub exhausted: bool,
}

impl ConvergenceReport {
    fn converged(actions: usize) -> Self {
        Self {
            actions,
            exhausted: false,
        }
    }

    fn exhausted(actions: usize) -> Self {
        Self {
            actions,
            exhausted: true,
        }
    }
}

/// Scrolls to the bottom until the page height stops growing.
///
/// `observe` runs once before the first scroll and after every scroll, so
/// callers can collect elements that are only rendered while in view.
/// A page whose viewport already reaches the bottom is left untouched.
pub fn scroll_to_end<F>(
    driver: &dyn BrowserDriver,
    timing: &Timing,
    cancel: &CancelFlag,
    mut observe: F,
) -> Result<ConvergenceReport>
where
    F: FnMut() -> Result<()>,
{
    let mut last_height = driver.page_height()?;
    observe()?;

    if driver.scroll_position()? >= last_height {
        debug!(height = last_height, "already at end of page");
        return Ok(ConvergenceReport::converged(0));
    }

    let mut scrolls = 0;
    loop {
        cancel.check()?;
        if scrolls >= timing.max_rounds {
            warn!(scrolls, "scrolling stopped at round limit before page height settled");
            return Ok(ConvergenceReport::exhausted(scrolls));
        }

        driver.scroll_to_bottom()?;
        scrolls += 1;
        thread::sleep(timing.scroll_settle());

        observe()?;
        let new_height = driver.page_height()?;
        debug!(scrolls, last_height, new_height, "scrolled");
        if new_height == last_height {
            return Ok(ConvergenceReport::converged(scrolls));
        }
        last_height = new_height;
    }
}

/// Clicks a single "load more" control until it can no longer be clicked.
pub fn expand_pagination(
    locator: &ElementLocator<'_>,
    control: SelectorName,
    timing: &Timing,
    cancel: &CancelFlag,
) -> Result<ConvergenceReport> {
    let mut clicks = 0;
    loop {
        cancel.check()?;
        if clicks >= timing.max_rounds {
            warn!(control = %control, clicks, "pagination stopped at round limit");
            return Ok(ConvergenceReport::exhausted(clicks));
        }

        match locator.try_click(control, &[], Scope::Page, timing.control_wait())? {
            ClickOutcome::Clicked => {
                clicks += 1;
                thread::sleep(timing.pagination_settle());
            }
            ClickOutcome::NotFound => {
                debug!(control = %control, clicks, "pagination converged");
                return Ok(ConvergenceReport::converged(clicks));
            }
        }
    }
}

/// Clicks every visible instance of a control, round after round, until none remain.
pub fn expand_threads(
    locator: &ElementLocator<'_>,
    control: SelectorName,
    timing: &Timing,
    cancel: &CancelFlag,
) -> Result<ConvergenceReport> {
    let mut clicks = 0;
    let mut rounds = 0;
    loop {
        cancel.check()?;
        if rounds >= timing.max_rounds {
            warn!(control = %control, clicks, rounds, "thread expansion stopped at round limit");
            return Ok(ConvergenceReport::exhausted(clicks));
        }
        rounds += 1;

        if locator
            .wait_clickable(control, Scope::Page, timing.control_wait())?
            .is_none()
        {
            break;
        }

        let mut clicked_this_round = 0;
        for element in locator.all(control, &[], Scope::Page)? {
            cancel.check()?;
            if locator.click(control, &element) == ClickOutcome::Clicked {
                clicked_this_round += 1;
                thread::sleep(timing.reply_settle());
            }
        }

        // a control that stays visible but never takes a click would spin forever
        if clicked_this_round == 0 {
            break;
        }
        clicks += clicked_this_round;
    }

    debug!(control = %control, clicks, rounds, "thread expansion converged");
    Ok(ConvergenceReport::converged(clicks))
}
