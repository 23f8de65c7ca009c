//! Captured pages on disk, replayed through a [`FixturePageSession`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::session::FixturePageSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub source_id: String,
    pub index_url: String,
    pub base_url: String,
    pub pages: Vec<FixturePage>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePage {
    pub url: String,
    /// HTML file relative to the bundle.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub inline_html: Option<String>,
}

impl FixtureBundle {
    /// A session serving every hydrated page of the bundle.
    pub fn session(&self) -> FixturePageSession {
        let mut session = FixturePageSession::new();
        for page in &self.pages {
            if let Some(html) = &page.inline_html {
                session.insert_page(page.url.clone(), html.clone());
            }
        }
        session
    }
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    let path = path.as_ref();
    let mut bundle: FixtureBundle = read_json_file(path)?;
    hydrate_pages(path, &mut bundle)?;
    Ok(bundle)
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn hydrate_pages(bundle_path: &Path, bundle: &mut FixtureBundle) -> Result<()> {
    let dir = bundle_path.parent().unwrap_or_else(|| Path::new("."));
    for page in &mut bundle.pages {
        if page.inline_html.is_some() {
            continue;
        }
        let Some(rel_path) = &page.path else {
            continue;
        };
        let html_path = dir.join(rel_path);
        let html = fs::read_to_string(&html_path)
            .with_context(|| format!("reading fixture page {}", html_path.display()))?;
        page.inline_html = Some(html);
    }
    Ok(())
}
