//! Page sessions: navigate to a URL, then query the loaded document.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use paoh_storage::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::AdapterError;

/// Resource classes a session can refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
}

impl ResourceKind {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"],
            Self::Stylesheet => &["css"],
            Self::Font => &["woff", "woff2", "ttf", "otf", "eot"],
        }
    }

    /// Classify a URL by the extension of its path.
    pub fn of_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = file.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        [Self::Image, Self::Stylesheet, Self::Font]
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }
}

/// What the harvest needs from a browser-like collaborator.
#[async_trait]
pub trait PageSession: Send {
    /// Refuse to load resources of these kinds from now on.
    fn block_resources(&mut self, kinds: &[ResourceKind]);

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), AdapterError>;

    /// Whether an element matching `selector` is present within `timeout`.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool, AdapterError>;

    /// Visible text of the first element matching `selector`.
    fn query_selector_text(&self, selector: &str) -> Result<Option<String>, AdapterError>;

    /// `attr` of every element matching `selector`, in document order.
    fn query_selector_all_attr(&self, selector: &str, attr: &str) -> Result<Vec<String>, AdapterError>;

    fn body_text(&self) -> Result<String, AdapterError>;

    /// The document title (browser tab title).
    fn title(&self) -> Result<String, AdapterError>;
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead", "tr",
    "ul",
];

const CELL_ELEMENTS: &[&str] = &["td", "th"];

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn walk_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            walk_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        }
    }
    if block {
        out.push('\n');
    } else if CELL_ELEMENTS.contains(&name) {
        out.push(' ');
    }
}

/// Rendered text of an element: block elements start new lines, runs of spaces collapse, blank lines drop.
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    walk_text(element, &mut raw);
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Visible body text of an HTML document.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = parse_selector("body")
        .ok()
        .and_then(|sel| document.select(&sel).next());
    inner_text(body.unwrap_or_else(|| document.root_element()))
}

/// A fetched document, parsed on demand.
#[derive(Debug, Clone)]
struct LoadedDocument {
    url: String,
    html: String,
}

impl LoadedDocument {
    fn has_match(&self, selector: &str) -> Result<bool, AdapterError> {
        let sel = parse_selector(selector)?;
        Ok(Html::parse_document(&self.html).select(&sel).next().is_some())
    }

    fn first_text(&self, selector: &str) -> Result<Option<String>, AdapterError> {
        let sel = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        let text = document.select(&sel).next().map(inner_text);
        Ok(text.filter(|t| !t.is_empty()))
    }

    fn all_attrs(&self, selector: &str, attr: &str) -> Result<Vec<String>, AdapterError> {
        let sel = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&sel)
            .filter_map(|el| el.value().attr(attr))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect())
    }

    fn title(&self) -> Result<String, AdapterError> {
        let sel = parse_selector("title")?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default())
    }
}

fn loaded(current: &Option<LoadedDocument>) -> Result<&LoadedDocument, AdapterError> {
    current.as_ref().ok_or(AdapterError::NoDocument)
}

/// Plain HTTP session: fetches the document only, so subresources are never requested.
#[derive(Debug)]
pub struct HttpPageSession {
    fetcher: HttpFetcher,
    blocked: HashSet<ResourceKind>,
    current: Option<LoadedDocument>,
}

impl HttpPageSession {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            blocked: HashSet::new(),
            current: None,
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(|doc| doc.url.as_str())
    }
}

#[async_trait]
impl PageSession for HttpPageSession {
    fn block_resources(&mut self, kinds: &[ResourceKind]) {
        self.blocked.extend(kinds.iter().copied());
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), AdapterError> {
        if ResourceKind::of_url(url).is_some_and(|kind| self.blocked.contains(&kind)) {
            return Err(AdapterError::Blocked(url.to_string()));
        }
        self.current = None;
        let resp = self.fetcher.fetch_text(url, timeout).await?;
        debug!(url, final_url = %resp.final_url, "navigated");
        self.current = Some(LoadedDocument {
            url: resp.final_url,
            html: resp.body,
        });
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool, AdapterError> {
        // A fetched document is complete; nothing appears later.
        loaded(&self.current)?.has_match(selector)
    }

    fn query_selector_text(&self, selector: &str) -> Result<Option<String>, AdapterError> {
        loaded(&self.current)?.first_text(selector)
    }

    fn query_selector_all_attr(&self, selector: &str, attr: &str) -> Result<Vec<String>, AdapterError> {
        loaded(&self.current)?.all_attrs(selector, attr)
    }

    fn body_text(&self) -> Result<String, AdapterError> {
        Ok(visible_text(&loaded(&self.current)?.html))
    }

    fn title(&self) -> Result<String, AdapterError> {
        loaded(&self.current)?.title()
    }
}

/// Serves canned HTML by URL. Unknown URLs fail like a dead link would.
#[derive(Debug, Default)]
pub struct FixturePageSession {
    pages: HashMap<String, String>,
    blocked: HashSet<ResourceKind>,
    current: Option<LoadedDocument>,
    visited: Vec<String>,
}

impl FixturePageSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn insert_page(&mut self, url: impl Into<String>, html: impl Into<String>) {
        self.pages.insert(url.into(), html.into());
    }

    /// Every URL navigated to, in order.
    pub fn visited(&self) -> &[String] {
        &self.visited
    }
}

#[async_trait]
impl PageSession for FixturePageSession {
    fn block_resources(&mut self, kinds: &[ResourceKind]) {
        self.blocked.extend(kinds.iter().copied());
    }

    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), AdapterError> {
        self.visited.push(url.to_string());
        if ResourceKind::of_url(url).is_some_and(|kind| self.blocked.contains(&kind)) {
            return Err(AdapterError::Blocked(url.to_string()));
        }
        let html = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| AdapterError::Message(format!("no fixture page for {url}")))?;
        self.current = Some(LoadedDocument {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool, AdapterError> {
        loaded(&self.current)?.has_match(selector)
    }

    fn query_selector_text(&self, selector: &str) -> Result<Option<String>, AdapterError> {
        loaded(&self.current)?.first_text(selector)
    }

    fn query_selector_all_attr(&self, selector: &str, attr: &str) -> Result<Vec<String>, AdapterError> {
        loaded(&self.current)?.all_attrs(selector, attr)
    }

    fn body_text(&self) -> Result<String, AdapterError> {
        Ok(visible_text(&loaded(&self.current)?.html))
    }

    fn title(&self) -> Result<String, AdapterError> {
        loaded(&self.current)?.title()
    }
}
