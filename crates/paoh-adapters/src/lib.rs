//! Source adapter contract, page sessions and the field extractors for listing detail pages.

pub mod discovery;
pub mod extract;
pub mod fixtures;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use paoh_core::OpportunityDraft;
use paoh_storage::FetchError;
use thiserror::Error;

pub use discovery::{discover_listings, qualify_listing_links, DiscoveryError, DiscoveryOptions};
pub use extract::{extract_draft, DetailPage};
pub use fixtures::{load_fixture_bundle, FixtureBundle, FixturePage};
pub use session::{visible_text, FixturePageSession, HttpPageSession, PageSession, ResourceKind};

pub const CRATE_NAME: &str = "paoh-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid selector {selector}: {message}")]
    Selector { selector: String, message: String },
    #[error("navigation to {0} blocked by resource filter")]
    Blocked(String),
    #[error("no document loaded")]
    NoDocument,
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Page listing every open call.
    fn index_url(&self) -> &'static str;

    /// Base that relative listing links resolve against.
    fn base_url(&self) -> &'static str;

    fn listing_selector(&self) -> &'static str;

    fn listing_id_marker(&self) -> &'static str {
        "ID="
    }

    fn heading_selector(&self) -> &'static str;

    fn blocked_resources(&self) -> &'static [ResourceKind] {
        &[ResourceKind::Image, ResourceKind::Stylesheet, ResourceKind::Font]
    }

    async fn fetch_detail(
        &self,
        session: &mut dyn PageSession,
        url: &str,
        timeout: Duration,
    ) -> Result<DetailPage, AdapterError> {
        session.navigate(url, timeout).await?;
        Ok(DetailPage {
            url: url.to_string(),
            heading: session.query_selector_text(self.heading_selector())?,
            tab_title: session.title()?,
            body_text: session.body_text()?,
        })
    }

    fn parse_detail(&self, page: &DetailPage) -> OpportunityDraft {
        extract_draft(page)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CafeAdapter;

impl SourceAdapter for CafeAdapter {
    fn source_id(&self) -> &'static str {
        "cafe"
    }

    fn index_url(&self) -> &'static str {
        "https://artist.callforentry.org/festivals.php"
    }

    fn base_url(&self) -> &'static str {
        "https://artist.callforentry.org/"
    }

    fn listing_selector(&self) -> &'static str {
        "a[href*='festivals_unique_info.php']"
    }

    fn heading_selector(&self) -> &'static str {
        "div.fairname"
    }
}

pub fn cafe_adapter() -> impl SourceAdapter {
    CafeAdapter
}

pub fn adapter_for_source(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        "cafe" => Some(Box::new(CafeAdapter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    use paoh_core::{admit, AdmissionRejection};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct GoldenDraft {
        link: String,
        title: String,
        organization: String,
        organization_strategy: String,
        city: String,
        state: String,
        budget: String,
        entry_fee: String,
        deadline: String,
        keywords: String,
        project_type: String,
        admitted: bool,
    }

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn bundle_path() -> PathBuf {
        workspace_root().join("fixtures/cafe/sample/bundle.json")
    }

    fn snapshot_path() -> PathBuf {
        workspace_root().join("fixtures/cafe/sample/snapshot.json")
    }

    fn to_golden(draft: &OpportunityDraft) -> GoldenDraft {
        GoldenDraft {
            link: draft.link.clone(),
            title: draft.title.clone(),
            organization: draft.organization.clone(),
            organization_strategy: draft.organization_strategy.to_string(),
            city: draft.city.clone(),
            state: draft.state.clone(),
            budget: draft.budget.clone(),
            entry_fee: draft.entry_fee.clone(),
            deadline: draft.deadline.clone(),
            keywords: draft.keywords.clone(),
            project_type: draft.project_type.clone(),
            admitted: admit(draft.clone()).is_ok(),
        }
    }

    #[test]
    fn adapter_lookup_by_source_id() {
        assert_eq!(adapter_for_source("cafe").map(|a| a.source_id()), Some("cafe"));
        assert!(adapter_for_source("unknown").is_none());
    }

    #[tokio::test]
    async fn golden_json_snapshot_test_cafe() {
        let adapter = cafe_adapter();
        let bundle = load_fixture_bundle(bundle_path()).unwrap();
        let mut session = bundle.session();
        session.block_resources(adapter.blocked_resources());

        let options = DiscoveryOptions::for_adapter(&adapter);
        let links = discover_listings(&mut session, &options).await.unwrap();

        let mut actual = Vec::new();
        for link in &links {
            match adapter.fetch_detail(&mut session, link, Duration::from_secs(20)).await {
                Ok(page) => actual.push(to_golden(&adapter.parse_detail(&page))),
                Err(AdapterError::Message(_)) => continue,
                Err(other) => panic!("unexpected adapter error: {other}"),
            }
        }

        let text = fs::read_to_string(snapshot_path()).expect("read snapshot");
        let expected: Vec<GoldenDraft> = serde_json::from_str(&text).expect("parse snapshot");
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn low_budget_listing_is_rejected_by_admission() {
        let adapter = cafe_adapter();
        let bundle = load_fixture_bundle(bundle_path()).unwrap();
        let mut session = bundle.session();
        let page = adapter
            .fetch_detail(
                &mut session,
                "https://artist.callforentry.org/festivals_unique_info.php?ID=15003",
                Duration::from_secs(20),
            )
            .await
            .unwrap();
        let draft = adapter.parse_detail(&page);
        assert_eq!(
            admit(draft).unwrap_err(),
            AdmissionRejection::BelowThreshold { value: 2500 }
        );
    }
}
