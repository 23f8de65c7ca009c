//! Project type classification.

use std::sync::LazyLock;

use paoh_core::DEFAULT_PROJECT_TYPE;
use regex::Regex;

/// Medium labels and the terms that select them, in priority order.
pub const MEDIUM_VOCABULARY: &[(&str, &[&str])] = &[
    ("Mural", &["mural"]),
    ("Sculpture", &["sculpture", "statue"]),
    ("Residency", &["residency"]),
    ("Festival", &["festival"]),
    ("Installation", &["installation"]),
    ("Mosaic", &["mosaic"]),
    ("Glass", &["glass"]),
    ("Memorial", &["memorial", "monument"]),
    ("Photography", &["photography"]),
];

static RFQ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRFQ\b|request for qualifications").expect("valid rfq regex")
});

static RFP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRFP\b|request for proposals").expect("valid rfp regex")
});

/// ` (RFQ)` or ` (RFP)` when the title or keywords mark the request kind.
fn request_suffix(title: &str, keywords: &[&str]) -> &'static str {
    if RFQ_RE.is_match(title) || keywords.contains(&"rfq") {
        " (RFQ)"
    } else if RFP_RE.is_match(title) || keywords.contains(&"rfp") {
        " (RFP)"
    } else {
        ""
    }
}

fn medium_for(matches: impl Fn(&str) -> bool) -> Option<&'static str> {
    MEDIUM_VOCABULARY
        .iter()
        .find(|(_, terms)| terms.iter().any(|term| matches(term)))
        .map(|(label, _)| *label)
}

/// Title medium, then keyword medium, then a muralist mention, then the generic default.
pub fn classify_project_type(title: &str, keywords: &str, body: &str) -> String {
    let keyword_set: Vec<&str> = keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect();
    let suffix = request_suffix(title, &keyword_set);

    let title_lower = title.to_lowercase();
    if let Some(label) = medium_for(|term| title_lower.contains(term)) {
        return format!("{label}{suffix}");
    }
    if let Some(label) = medium_for(|term| keyword_set.contains(&term)) {
        return label.to_string();
    }
    if body.to_lowercase().contains("muralist") {
        return "Mural".to_string();
    }
    format!("{DEFAULT_PROJECT_TYPE}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_medium_wins_and_carries_request_suffix() {
        assert_eq!(classify_project_type("Riverside Mural RFQ", "", ""), "Mural (RFQ)");
        assert_eq!(
            classify_project_type("Gateway Statue: Request for Proposals", "", ""),
            "Sculpture (RFP)"
        );
        assert_eq!(classify_project_type("Memorial Plaza", "mural, rfq", ""), "Memorial (RFQ)");
    }

    #[test]
    fn keyword_medium_has_no_suffix() {
        assert_eq!(classify_project_type("Downtown Commission", "glass, rfq", ""), "Glass");
    }

    #[test]
    fn muralist_mention_then_default() {
        assert_eq!(classify_project_type("Artist Call", "", "Seeking a muralist"), "Mural");
        assert_eq!(classify_project_type("Artist Call", "community", ""), DEFAULT_PROJECT_TYPE);
        assert_eq!(classify_project_type("Artist Call RFQ", "", ""), "Public Art (RFQ)");
    }
}
