//! Turn one rendered detail page into an [`OpportunityDraft`].

pub mod fields;
pub mod organization;
pub mod project_type;

use paoh_core::{OpportunityDraft, UNTITLED};
use serde::{Deserialize, Serialize};

pub use fields::{
    extract_budget, extract_city, extract_deadline, extract_eligibility, extract_entry_fee,
    extract_keywords, extract_state, source_id_from_link, KEYWORD_VOCABULARY,
};
pub use organization::{resolve_organization, OrganizationSignals, KNOWN_CORRECTIONS, MAX_ORGANIZATION_LEN};
pub use project_type::classify_project_type;

/// What a session yields for one detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailPage {
    pub url: String,
    /// Text of the listing's heading element, if the page has one.
    pub heading: Option<String>,
    pub tab_title: String,
    pub body_text: String,
}

/// First non-empty line of the heading.
pub fn listing_title(heading: Option<&str>) -> String {
    heading
        .and_then(|h| h.lines().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or(UNTITLED)
        .to_string()
}

pub fn extract_draft(page: &DetailPage) -> OpportunityDraft {
    let body = page.body_text.as_str();
    let title = listing_title(page.heading.as_deref());

    let (organization, organization_strategy) =
        resolve_organization(&OrganizationSignals::new(body, &title, &page.tab_title));

    let state = extract_state(body);
    let city = extract_city(body, &state);
    let keywords = extract_keywords(body);
    let project_type = classify_project_type(&title, &keywords, body);

    OpportunityDraft {
        organization,
        organization_strategy,
        city,
        state,
        link: page.url.clone(),
        deadline: extract_deadline(body),
        entry_fee: extract_entry_fee(body),
        budget: extract_budget(body),
        eligibility: extract_eligibility(body),
        keywords,
        project_type,
        source_id: source_id_from_link(&page.url),
        title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paoh_core::OrganizationStrategy;

    #[test]
    fn title_is_first_heading_line() {
        assert_eq!(listing_title(Some("\n Riverside Mural \nCall for Artists")), "Riverside Mural");
        assert_eq!(listing_title(Some("  ")), UNTITLED);
        assert_eq!(listing_title(None), UNTITLED);
    }

    #[test]
    fn draft_combines_all_extractors() {
        let page = DetailPage {
            url: "https://artist.callforentry.org/festivals_unique_info.php?ID=15012".into(),
            heading: Some("Keller Gateway Mural RFQ".into()),
            tab_title: "Keller Gateway Mural RFQ - City of Keller - CaFÉ".into(),
            body_text: [
                "Keller Gateway Mural RFQ",
                "Contact Email: publicart@cityofkeller.com",
                "City: Keller",
                "State: Texas",
                "Budget: $45,000",
                "No Entry Fee",
                "Application Deadline: March 1, 2026",
                "Eligibility Criteria",
                "Open to artists residing in Texas.",
                "View Application",
            ]
            .join("\n"),
        };

        let draft = extract_draft(&page);
        assert_eq!(draft.title, "Keller Gateway Mural RFQ");
        assert_eq!(draft.organization, "City of Keller");
        assert_eq!(draft.organization_strategy, OrganizationStrategy::KnownCorrection);
        assert_eq!(draft.city, "Keller");
        assert_eq!(draft.state, "Texas");
        assert_eq!(draft.budget, "$45,000");
        assert_eq!(draft.entry_fee, "$0");
        assert_eq!(draft.deadline, "March 1, 2026");
        assert_eq!(draft.eligibility, "Open to artists residing in Texas.");
        assert_eq!(draft.keywords, "mural, rfq");
        assert_eq!(draft.project_type, "Mural (RFQ)");
        assert_eq!(draft.source_id, "15012");
    }
}
