//! Listing discovery on the index page.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use crate::session::PageSession;
use crate::{AdapterError, SourceAdapter};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("index page {url} could not be loaded: {source}")]
    Index {
        url: String,
        #[source]
        source: AdapterError,
    },
    #[error("no listing anchors matching {selector} appeared within {}s", .waited.as_secs())]
    NoAnchors { selector: String, waited: Duration },
    #[error("invalid base url {url}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub index_url: String,
    pub base_url: String,
    pub anchor_selector: String,
    pub id_marker: String,
    pub index_timeout: Duration,
    pub anchor_wait: Duration,
}

impl DiscoveryOptions {
    /// Options for `adapter` with its default endpoints and the usual waits.
    pub fn for_adapter(adapter: &dyn SourceAdapter) -> Self {
        Self {
            index_url: adapter.index_url().to_string(),
            base_url: adapter.base_url().to_string(),
            anchor_selector: adapter.listing_selector().to_string(),
            id_marker: adapter.listing_id_marker().to_string(),
            index_timeout: Duration::from_secs(60),
            anchor_wait: Duration::from_secs(10),
        }
    }
}

/// Resolve raw hrefs against `base`, keep those carrying `id_marker`, drop repeats. First occurrence wins.
pub fn qualify_listing_links<'a>(
    hrefs: impl IntoIterator<Item = &'a str>,
    base: &Url,
    id_marker: &str,
) -> Vec<String> {
    let mut seen = HashSet::new();
    hrefs
        .into_iter()
        .filter(|href| href.contains(id_marker))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Load the index page and return the qualified listing URLs in page order.
#[instrument(skip_all, fields(index_url = %options.index_url))]
pub async fn discover_listings(
    session: &mut dyn PageSession,
    options: &DiscoveryOptions,
) -> Result<Vec<String>, DiscoveryError> {
    let base = Url::parse(&options.base_url).map_err(|source| DiscoveryError::BaseUrl {
        url: options.base_url.clone(),
        source,
    })?;
    let index_error = |source| DiscoveryError::Index {
        url: options.index_url.clone(),
        source,
    };

    session
        .navigate(&options.index_url, options.index_timeout)
        .await
        .map_err(index_error)?;

    let appeared = session
        .wait_for_selector(&options.anchor_selector, options.anchor_wait)
        .await
        .map_err(index_error)?;
    if !appeared {
        return Err(DiscoveryError::NoAnchors {
            selector: options.anchor_selector.clone(),
            waited: options.anchor_wait,
        });
    }

    let hrefs = session
        .query_selector_all_attr(&options.anchor_selector, "href")
        .map_err(index_error)?;
    let links = qualify_listing_links(hrefs.iter().map(String::as_str), &base, &options.id_marker);
    info!(anchors = hrefs.len(), listings = links.len(), "discovered listings");
    Ok(links)
}
