//! Core domain model for PAOH: extracted drafts, admitted opportunities and the sheet row layout.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "paoh-core";

/// Display name written to the `SourceName` column.
pub const SOURCE_NAME: &str = "CaFÉ";
/// Prefix of the `CompositeId` column.
pub const SOURCE_TAG: &str = "CAFE";

pub const BUDGET_NOT_FOUND: &str = "N/A";
pub const MIN_ADMISSION_BUDGET: u64 = 3000;
pub const UNKNOWN_ORGANIZATION: &str = "Unknown Organization";
pub const DEADLINE_SEE_LINK: &str = "See Link";
pub const DEFAULT_PROJECT_TYPE: &str = "Public Art";
pub const UNTITLED: &str = "Untitled";
pub const STATUS_NEW: &str = "New";

/// Number of columns in a persisted row.
pub const ROW_WIDTH: usize = 17;
/// 1-based column of `Organization` (D).
pub const ORGANIZATION_COLUMN: usize = 4;
/// 1-based column of `ProjectType` (G).
pub const PROJECT_TYPE_COLUMN: usize = 7;
/// 0-based index of `SourceURL` (M), the reconciliation key.
pub const SOURCE_URL_INDEX: usize = 12;

/// Which organization heuristic produced the final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStrategy {
    KnownCorrection,
    ProsePattern,
    TitleColon,
    TabTitle,
    PresentedBy,
    SlugCleaned,
    Unknown,
}

impl OrganizationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KnownCorrection => "known-correction",
            Self::ProsePattern => "prose-pattern",
            Self::TitleColon => "title-colon",
            Self::TabTitle => "tab-title",
            Self::PresentedBy => "presented-by",
            Self::SlugCleaned => "slug-cleaned",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OrganizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything extracted from one detail page, before the admission filter runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub title: String,
    pub organization: String,
    pub organization_strategy: OrganizationStrategy,
    pub city: String,
    pub state: String,
    pub link: String,
    pub deadline: String,
    pub entry_fee: String,
    pub budget: String,
    pub eligibility: String,
    pub keywords: String,
    pub project_type: String,
    pub source_id: String,
}

/// Why a draft never became an [`Opportunity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AdmissionRejection {
    #[error("no budget found")]
    MissingBudget,
    #[error("budget {value} below minimum {}", MIN_ADMISSION_BUDGET)]
    BelowThreshold { value: u64 },
}

/// An admitted listing. Only [`admit`] builds one, so every instance has passed the budget gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Opportunity {
    title: String,
    organization: String,
    city: String,
    state: String,
    link: String,
    deadline: String,
    entry_fee: String,
    budget: String,
    budget_value: u64,
    eligibility: String,
    keywords: String,
    project_type: String,
    source_name: String,
    source_id: String,
}

impl Opportunity {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn deadline(&self) -> &str {
        &self.deadline
    }

    pub fn entry_fee(&self) -> &str {
        &self.entry_fee
    }

    pub fn budget(&self) -> &str {
        &self.budget
    }

    /// Largest amount found in the budget text.
    pub fn budget_value(&self) -> u64 {
        self.budget_value
    }

    pub fn eligibility(&self) -> &str {
        &self.eligibility
    }

    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    pub fn project_type(&self) -> &str {
        &self.project_type
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn composite_id(&self) -> String {
        format!("{SOURCE_TAG}_{}", self.source_id)
    }

    /// Render the 17-column sheet row, text fields whitespace-normalized.
    pub fn to_row(&self, discovered_on: NaiveDate) -> Vec<String> {
        let today = discovered_on.format("%Y-%m-%d").to_string();
        vec![
            clean_text(&self.deadline),
            today.clone(),
            clean_text(&self.title),
            clean_text(&self.organization),
            clean_text(&self.city),
            clean_text(&self.state),
            clean_text(&self.project_type),
            clean_text(&self.budget),
            clean_text(&self.entry_fee),
            clean_text(&self.eligibility),
            clean_text(&self.keywords),
            self.source_name.clone(),
            self.link.clone(),
            STATUS_NEW.to_string(),
            String::new(),
            self.composite_id(),
            today,
        ]
    }
}

/// Apply the budget gate and, if it passes, freeze the draft into an [`Opportunity`].
pub fn admit(draft: OpportunityDraft) -> Result<Opportunity, AdmissionRejection> {
    if draft.budget.trim().is_empty() || draft.budget.trim().eq_ignore_ascii_case(BUDGET_NOT_FOUND) {
        return Err(AdmissionRejection::MissingBudget);
    }
    let value = budget_numeric(&draft.budget);
    if value < MIN_ADMISSION_BUDGET {
        return Err(AdmissionRejection::BelowThreshold { value });
    }

    Ok(Opportunity {
        title: draft.title,
        organization: draft.organization,
        city: draft.city,
        state: draft.state,
        link: draft.link,
        deadline: draft.deadline,
        entry_fee: draft.entry_fee,
        budget: draft.budget,
        budget_value: value,
        eligibility: draft.eligibility,
        keywords: draft.keywords,
        project_type: draft.project_type,
        source_name: SOURCE_NAME.to_string(),
        source_id: draft.source_id,
    })
}

/// Comma-grouped amounts anywhere; ungrouped digit runs only right after `$`, so years never count.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?(\d{1,3}(?:,\d{3})+|\d+)|\b(\d{1,3}(?:,\d{3})+|\d{1,3})\b").expect("valid amount regex")
});

/// Largest currency-like amount in free text; `0` when none is found.
pub fn budget_numeric(text: &str) -> u64 {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(BUDGET_NOT_FOUND) {
        return 0;
    }
    AMOUNT_RE
        .captures_iter(trimmed)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

static CONTROL_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t]+").expect("valid control regex"));
static MULTI_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Collapse CR/LF/TAB runs and whitespace runs to one space, then trim.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = CONTROL_WS_RE.replace_all(text, " ");
    let text = MULTI_WS_RE.replace_all(&text, " ");
    text.trim().to_string()
}
