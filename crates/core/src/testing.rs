//! Scripted in-memory browser used by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::CancelFlag;
use crate::error::DriverError;
use crate::ports::{BrowserDriver, DriverResult, ElementHandle, Scope, WaitCondition};
use crate::selectors::{Locator, SelectorName, SelectorTable};

/// Query string of a default selector.
pub(crate) fn q(name: SelectorName) -> String {
    SelectorTable::default()
        .get(name)
        .map(|s| s.query.as_str().to_string())
        .unwrap()
}

/// Formatted log lines written while running `f` on this thread.
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeElement {
    query: String,
    text: Option<String>,
    attrs: HashMap<String, String>,
    /// `Some(n)`: the element detaches after `n` clicks.
    clicks_until_gone: Option<usize>,
    reveals: Vec<ElementHandle>,
    hidden: bool,
    unclickable: bool,
}

impl FakeElement {
    pub(crate) fn matching(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub(crate) fn of(name: SelectorName) -> Self {
        Self::matching(q(name))
    }

    pub(crate) fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub(crate) fn attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn clicks_until_gone(mut self, clicks: usize) -> Self {
        self.clicks_until_gone = Some(clicks);
        self
    }

    pub(crate) fn reveals(mut self, handles: Vec<ElementHandle>) -> Self {
        self.reveals = handles;
        self
    }

    /// Not attached until something reveals it.
    pub(crate) fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub(crate) fn unclickable(mut self) -> Self {
        self.unclickable = true;
        self
    }
}

#[derive(Debug)]
struct Node {
    page: String,
    parent: Option<String>,
    element: FakeElement,
    attached: bool,
    clicks: usize,
}

#[derive(Debug, Default)]
struct PageScript {
    height: i64,
    scroll_position: i64,
    /// Each scroll pops the next (height, revealed elements) step.
    steps: VecDeque<(i64, Vec<ElementHandle>)>,
}

#[derive(Debug, Default)]
struct FakeState {
    nodes: HashMap<String, Node>,
    order: Vec<String>,
    pages: HashMap<String, PageScript>,
    current: String,
    next_id: usize,
    navigations: Vec<String>,
    scrolls: usize,
    clicks: usize,
    typed: Vec<(String, String)>,
    failing_urls: Vec<String>,
    failing_queries: Vec<String>,
    interrupt_on: Option<(String, CancelFlag)>,
    quit: bool,
}

impl FakeState {
    fn is_within(&self, id: &str, ancestor: &str) -> bool {
        let mut cursor = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.nodes.get(&parent).and_then(|n| n.parent.clone());
        }
        false
    }

    fn matches(&self, locator: &Locator, scope: Scope<'_>, condition: WaitCondition) -> Vec<ElementHandle> {
        self.order
            .iter()
            .filter(|id| {
                let node = &self.nodes[*id];
                node.page == self.current
                    && node.attached
                    && node.element.query == locator.query
                    && (condition == WaitCondition::Present || !node.element.unclickable)
                    && match scope {
                        Scope::Page => true,
                        Scope::Within(handle) => self.is_within(id, handle.id()),
                    }
            })
            .map(|id| ElementHandle(id.clone()))
            .collect()
    }

    fn node(&self, element: &ElementHandle) -> DriverResult<&Node> {
        match self.nodes.get(element.id()) {
            Some(node) if node.attached => Ok(node),
            _ => Err(DriverError::StaleElement(element.id().to_string())),
        }
    }

    fn page_mut(&mut self) -> &mut PageScript {
        let current = self.current.clone();
        self.pages.entry(current).or_default()
    }
}

/// Cheap to clone; clones share the same scripted browser.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDriver {
    state: Rc<RefCell<FakeState>>,
}

impl FakeDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds an element to the page at `url`, optionally nested under `parent`.
    pub(crate) fn add(
        &self,
        url: &str,
        parent: Option<&ElementHandle>,
        element: FakeElement,
    ) -> ElementHandle {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = format!("e{}", state.next_id);
        let attached = !element.hidden;
        state.nodes.insert(
            id.clone(),
            Node {
                page: url.to_string(),
                parent: parent.map(|p| p.id().to_string()),
                element,
                attached,
                clicks: 0,
            },
        );
        state.order.push(id.clone());
        ElementHandle(id)
    }

    pub(crate) fn set_height(&self, url: &str, height: i64) {
        let mut state = self.state.borrow_mut();
        state.pages.entry(url.to_string()).or_default().height = height;
    }

    pub(crate) fn set_scroll_position(&self, url: &str, position: i64) {
        let mut state = self.state.borrow_mut();
        state.pages.entry(url.to_string()).or_default().scroll_position = position;
    }

    pub(crate) fn push_scroll_step(&self, url: &str, height: i64, reveals: Vec<ElementHandle>) {
        let mut state = self.state.borrow_mut();
        state
            .pages
            .entry(url.to_string())
            .or_default()
            .steps
            .push_back((height, reveals));
    }

    pub(crate) fn fail_navigation_to(&self, url: &str) {
        self.state.borrow_mut().failing_urls.push(url.to_string());
    }

    /// Listing every match of `name` fails with a command error.
    pub(crate) fn fail_find_all_of(&self, name: SelectorName) {
        self.state.borrow_mut().failing_queries.push(q(name));
    }

    /// Cancels `flag` when the driver navigates to `url`.
    pub(crate) fn interrupt_on(&self, url: &str, flag: CancelFlag) {
        self.state.borrow_mut().interrupt_on = Some((url.to_string(), flag));
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.state.borrow().navigations.clone()
    }

    pub(crate) fn scrolls(&self) -> usize {
        self.state.borrow().scrolls
    }

    pub(crate) fn clicks(&self) -> usize {
        self.state.borrow().clicks
    }

    pub(crate) fn typed(&self) -> Vec<(String, String)> {
        self.state.borrow().typed.clone()
    }

    pub(crate) fn is_attached(&self, element: &ElementHandle) -> bool {
        self.state
            .borrow()
            .nodes
            .get(element.id())
            .map(|n| n.attached)
            .unwrap_or(false)
    }

    pub(crate) fn has_quit(&self) -> bool {
        self.state.borrow().quit
    }
}

impl BrowserDriver for FakeDriver {
    fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        state.navigations.push(url.to_string());
        if let Some((target, flag)) = &state.interrupt_on {
            if target == url {
                flag.cancel();
            }
        }
        if state.failing_urls.iter().any(|u| u == url) {
            return Err(DriverError::Command(format!("navigation to {url} failed")));
        }
        state.current = url.to_string();
        Ok(())
    }

    fn find_all(&self, locator: &Locator, scope: Scope<'_>) -> DriverResult<Vec<ElementHandle>> {
        let state = self.state.borrow();
        if state.failing_queries.contains(&locator.query) {
            return Err(DriverError::Command("session deleted".to_string()));
        }
        Ok(state.matches(locator, scope, WaitCondition::Present))
    }

    fn wait_for(
        &self,
        locator: &Locator,
        scope: Scope<'_>,
        condition: WaitCondition,
        _timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>> {
        Ok(self
            .state
            .borrow()
            .matches(locator, scope, condition)
            .into_iter()
            .next())
    }

    fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let reveals = {
            let node = state
                .nodes
                .get_mut(element.id())
                .filter(|n| n.attached)
                .ok_or_else(|| DriverError::StaleElement(element.id().to_string()))?;
            if node.element.unclickable {
                return Err(DriverError::Command("element click intercepted".to_string()));
            }
            node.clicks += 1;
            let gone = node
                .element
                .clicks_until_gone
                .map(|limit| node.clicks >= limit)
                .unwrap_or(false);
            if gone {
                node.attached = false;
            }
            node.element.reveals.clone()
        };
        for handle in reveals {
            if let Some(node) = state.nodes.get_mut(handle.id()) {
                node.attached = true;
            }
        }
        state.clicks += 1;
        Ok(())
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        state.node(element)?;
        state.typed.push((element.id().to_string(), text.to_string()));
        Ok(())
    }

    fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let state = self.state.borrow();
        Ok(state.node(element)?.element.text.clone().unwrap_or_default())
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let state = self.state.borrow();
        Ok(state.node(element)?.element.attrs.get(name).cloned())
    }

    fn scroll_to_bottom(&self) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        state.scrolls += 1;
        let step = state.page_mut().steps.pop_front();
        if let Some((height, reveals)) = step {
            state.page_mut().height = height;
            for handle in reveals {
                if let Some(node) = state.nodes.get_mut(handle.id()) {
                    node.attached = true;
                }
            }
        }
        let page = state.page_mut();
        page.scroll_position = page.height;
        Ok(())
    }

    fn page_height(&self) -> DriverResult<i64> {
        Ok(self.state.borrow_mut().page_mut().height)
    }

    fn scroll_position(&self) -> DriverResult<i64> {
        Ok(self.state.borrow_mut().page_mut().scroll_position)
    }

    fn quit(&self) -> DriverResult<()> {
        self.state.borrow_mut().quit = true;
        Ok(())
    }
}
