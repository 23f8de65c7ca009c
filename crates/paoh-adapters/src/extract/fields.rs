//! Single-or-fallback extractors over the visible body text of a detail page.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use paoh_core::{BUDGET_NOT_FOUND, DEADLINE_SEE_LINK};
use regex::Regex;

/// Art-medium and project-characteristic terms reported as keywords.
pub const KEYWORD_VOCABULARY: &[&str] = &[
    "mural", "sculpture", "installation", "interactive", "kinetic", "bronze", "mosaic", "glass",
    "steel", "monument", "memorial", "terrazzo", "lighting", "landscape", "community", "residency",
    "festival", "photography", "statue", "rfq", "rfp",
];

/// Words the "located in" phrase picks up that are never a city.
const CITY_STOP_WORDS: &[&str] = &["The", "This", "Smith", "Site"];

static STATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bState:\s*(.*?)(?:\s+Budget|\n|$)").expect("valid state regex")
});

static CITY_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCity:[ \t]*([A-Za-z .]+)").expect("valid city regex"));

static LOCATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:\blocated\s+(?:in|at))\s+([A-Z][a-z]+(?:\s[A-Z][a-z]+)*)")
        .expect("valid located regex")
});

static BUDGET_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*Budget[ \t]*:[ \t]*(?:\n[ \t]*)?([^\n]*)").expect("valid budget regex")
});

static BUDGET_JOINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bBudget[ \t]*:[ \t]*([^\n]*)").expect("valid joined budget regex")
});

static NO_FEE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bno entry fee\b").expect("valid no-fee regex"));

static FREE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bFree\b").expect("valid free regex"));

static FEE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Entry Fee[^\n]*?:?\s*(\$[\d.]+)").expect("valid fee regex")
});

static DEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Event Dates|Deadline)[^\n]*?:[ \t]*(?:\n[ \t]*)?([^\n]*)")
        .expect("valid deadline regex")
});

static ELIGIBILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Eligibility Criteria\s*\n\s*(.*?)(?:\n\s*(?:Print|View|Legal)|$)")
        .expect("valid eligibility regex")
});

pub fn extract_state(body: &str) -> String {
    STATE_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// City from its label, else "in <City>, <State>", else "located in/at <City>".
pub fn extract_city(body: &str, state: &str) -> String {
    if let Some(city) = CITY_LABEL_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|city| !city.is_empty())
    {
        return city.to_string();
    }

    if !state.is_empty() {
        let pattern = format!(r"\bin\s+([A-Z][a-z]+(?:\s[A-Z][a-z]+)?),?\s*{}", regex::escape(state));
        if let Some(city) = Regex::new(&pattern)
            .ok()
            .and_then(|re| re.captures(body))
            .and_then(|caps| caps.get(1))
        {
            return city.as_str().trim().to_string();
        }
    }

    LOCATED_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|city| {
            let first = city.split_whitespace().next().unwrap_or_default();
            !CITY_STOP_WORDS.contains(&first)
        })
        .map(str::to_string)
        .unwrap_or_default()
}

/// Raw budget text, or the `N/A` sentinel when no labeled budget exists.
pub fn extract_budget(body: &str) -> String {
    [&*BUDGET_LINE_RE, &*BUDGET_JOINED_RE]
        .iter()
        .find_map(|re| {
            re.captures(body)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .filter(|budget| !budget.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| BUDGET_NOT_FOUND.to_string())
}

pub fn extract_entry_fee(body: &str) -> String {
    if NO_FEE_RE.is_match(body) || FREE_RE.is_match(body) {
        return "$0".to_string();
    }
    FEE_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "0".to_string())
}

pub fn extract_deadline(body: &str) -> String {
    DEADLINE_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|deadline| !deadline.is_empty())
        .unwrap_or(DEADLINE_SEE_LINK)
        .to_string()
}

/// The block under "Eligibility Criteria", up to a Print/View/Legal line or the end of the page.
pub fn extract_eligibility(body: &str) -> String {
    ELIGIBILITY_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Vocabulary terms present anywhere in the body, sorted and comma-joined.
pub fn extract_keywords(body: &str) -> String {
    let lowered = body.to_lowercase();
    KEYWORD_VOCABULARY
        .iter()
        .filter(|term| lowered.contains(*term))
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Listing identifier: the query text after the last `ID=`, up to the next parameter.
pub fn source_id_from_link(link: &str) -> String {
    link.rsplit_once("ID=")
        .and_then(|(_, rest)| rest.split(['&', '#']).next())
        .unwrap_or_default()
        .to_string()
}
