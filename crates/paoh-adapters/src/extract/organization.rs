//! Organization name resolution: an ordered waterfall of heuristics, first accepted candidate wins.

use std::collections::HashMap;
use std::sync::LazyLock;

use paoh_core::{OrganizationStrategy, UNKNOWN_ORGANIZATION};
use regex::Regex;

/// Longest organization name accepted from any strategy.
pub const MAX_ORGANIZATION_LEN: usize = 60;

/// Hand-curated names for contact-email slugs whose literal form is misleading.
pub const KNOWN_CORRECTIONS: &[(&str, &str)] = &[
    ("slc", "Salt Lake City Arts Council"),
    ("gcac", "Greater Columbus Arts Council"),
    ("dca", "New Mexico Dept. of Cultural Affairs"),
    ("ssprd", "South Suburban Parks and Recreation"),
    ("arts", "Rhode Island State Council on the Arts"),
    ("akt-artful", "Florida State University (Art in State Buildings)"),
    ("artist must direct all", "City of Greenwood Village"),
    ("cityofkeller", "City of Keller"),
    ("ahhaa", "Ah Haa School for the Arts"),
    ("millcreekut", "Millcreek City"),
    ("ofallonmo", "City of O'Fallon"),
    ("swiftel", "Swiftel Center"),
    ("palmettobay-fl", "Village of Palmetto Bay"),
    ("alleganyarts", "Allegany Arts Council"),
    ("bluelinearts", "Blue Line Arts"),
    ("stagvillememorialproject", "The Stagville Memorial Project"),
    ("highdesertmuseum", "High Desert Museum"),
    ("artworkscincinnati", "ArtWorks Cincinnati"),
    ("msstate", "Mississippi State University"),
    ("sfsarch", "City of Wichita (SFS Architecture)"),
    ("landworksstudio", "City of Wichita (Landworks Studio)"),
    ("louisvilleco", "City of Louisville (CO)"),
    ("ocfl", "Orange County (FL)"),
    ("greenefellowship", "The Greene Fellowship"),
    ("city of denver", "Denver Arts & Venues"),
];

static CORRECTIONS: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| KNOWN_CORRECTIONS.iter().copied().collect());

/// Mail providers whose domain says nothing about the organizer.
const WEBMAIL_DOMAINS: &[&str] = &["gmail", "yahoo", "hotmail", "outlook", "aol", "icloud"];

/// First words that mark a prose match as the project rather than its organizer.
const GENERIC_SUBJECTS: &[&str] = &[
    "call", "project", "opportunity", "commission", "program", "competition", "rfq", "rfp",
    "selected", "selection", "artwork",
];

/// Brand tokens of the listing site that show up in tab titles.
const BRAND_TOKENS: &[&str] = &["café", "cafe", "callforentry"];

static EMAIL_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Contact Email:\s*.*?@([\w.\-]+)").expect("valid email regex")
});

static PROSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:The|This)\s+([A-Z][^\n]{1,80}?)\s+(?:invites|seeks|requests|is\s+accepting|announces)\b",
    )
    .expect("valid prose regex")
});

static APPOSITIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",|\s\(|\s[-–—]\s").expect("valid appositive regex"));

static CALL_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcall\b").expect("valid call regex"));

static TAB_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[-–—|]\s+").expect("valid separator regex"));

static PRESENTED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Presented by\s*[:\-]?\s*([A-Z][\w\s.,&]+)").expect("valid presented-by regex")
});

static CAMEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w)([A-Z])").expect("valid camel regex"));

/// Page signals the organization strategies read from.
#[derive(Debug, Clone)]
pub struct OrganizationSignals<'a> {
    pub body: &'a str,
    pub title: &'a str,
    pub tab_title: &'a str,
    pub email_slug: Option<String>,
}

impl<'a> OrganizationSignals<'a> {
    pub fn new(body: &'a str, title: &'a str, tab_title: &'a str) -> Self {
        Self {
            body,
            title,
            tab_title,
            email_slug: contact_email_slug(body),
        }
    }
}

/// First label of the contact-email domain, as written, unless it is a webmail provider.
pub fn contact_email_slug(body: &str) -> Option<String> {
    let domain = EMAIL_DOMAIN_RE.captures(body)?.get(1)?.as_str();
    let lowered = domain.to_lowercase();
    if WEBMAIL_DOMAINS.iter().any(|mail| lowered.contains(mail)) {
        return None;
    }
    domain
        .split('.')
        .next()
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
}

type Strategy = fn(&OrganizationSignals<'_>) -> Option<String>;

const WATERFALL: &[(OrganizationStrategy, Strategy)] = &[
    (OrganizationStrategy::KnownCorrection, known_correction),
    (OrganizationStrategy::ProsePattern, prose_pattern),
    (OrganizationStrategy::TitleColon, title_colon),
    (OrganizationStrategy::TabTitle, tab_title),
    (OrganizationStrategy::PresentedBy, presented_by),
    (OrganizationStrategy::SlugCleaned, slug_cleaned),
];

fn within_bound(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.chars().count() <= MAX_ORGANIZATION_LEN
}

/// Run the waterfall. A strategy whose candidate is empty or too long yields to the next one.
pub fn resolve_organization(signals: &OrganizationSignals<'_>) -> (String, OrganizationStrategy) {
    WATERFALL
        .iter()
        .find_map(|(kind, strategy)| {
            strategy(signals)
                .map(|candidate| candidate.trim().to_string())
                .filter(|candidate| within_bound(candidate))
                .map(|candidate| (candidate, *kind))
        })
        .unwrap_or_else(|| (UNKNOWN_ORGANIZATION.to_string(), OrganizationStrategy::Unknown))
}

fn known_correction(signals: &OrganizationSignals<'_>) -> Option<String> {
    let slug = signals.email_slug.as_deref()?;
    CORRECTIONS.get(slug.to_lowercase().as_str()).map(|name| name.to_string())
}

fn prose_pattern(signals: &OrganizationSignals<'_>) -> Option<String> {
    PROSE_RE.captures_iter(signals.body).find_map(|caps| {
        let raw = caps.get(1)?.as_str();
        let name = APPOSITIVE_RE.split(raw).next().unwrap_or(raw);
        let name = name.trim().trim_end_matches(['.', ';', ':']).trim();
        let first_word = name.split_whitespace().next()?.to_lowercase();
        if GENERIC_SUBJECTS.contains(&first_word.as_str()) || !within_bound(name) {
            return None;
        }
        Some(name.to_string())
    })
}

fn title_colon(signals: &OrganizationSignals<'_>) -> Option<String> {
    let (before, _) = signals.title.split_once(':')?;
    let candidate = before.trim();
    (!CALL_WORD_RE.is_match(candidate)).then(|| candidate.to_string())
}

fn tab_title(signals: &OrganizationSignals<'_>) -> Option<String> {
    let parts: Vec<&str> = TAB_SEPARATOR_RE.split(signals.tab_title.trim()).collect();
    if parts.len() < 3 {
        return None;
    }
    let candidate = parts[parts.len() - 2].trim();
    let lowered = candidate.to_lowercase();
    let rejected = BRAND_TOKENS.iter().any(|brand| lowered.contains(brand))
        || candidate.chars().count() < 3
        || lowered.contains("call for");
    (!rejected).then(|| candidate.to_string())
}

fn presented_by(signals: &OrganizationSignals<'_>) -> Option<String> {
    let caps = PRESENTED_BY_RE.captures(signals.body)?;
    let line = caps.get(1)?.as_str().lines().next()?;
    Some(line.trim().trim_end_matches([',', '.']).trim().to_string())
}

fn slug_cleaned(signals: &OrganizationSignals<'_>) -> Option<String> {
    let slug = signals.email_slug.as_deref()?;
    let spaced = CAMEL_RE.replace_all(slug, "$1 $2");
    Some(title_case(&spaced))
}

/// Uppercase each letter that follows a non-letter and lowercase the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut after_letter = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if after_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            after_letter = true;
        } else {
            out.push(ch);
            after_letter = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals<'a>(body: &'a str, title: &'a str, tab: &'a str) -> OrganizationSignals<'a> {
        OrganizationSignals::new(body, title, tab)
    }

    #[test]
    fn correction_table_is_complete_and_lowercase() {
        assert_eq!(KNOWN_CORRECTIONS.len(), 25);
        assert!(KNOWN_CORRECTIONS.iter().all(|(slug, _)| slug.to_lowercase() == *slug));
    }

    #[test]
    fn email_slug_skips_webmail() {
        assert_eq!(
            contact_email_slug("Contact Email: arts@SLC.gov").as_deref(),
            Some("SLC")
        );
        assert_eq!(contact_email_slug("Contact Email: jane@gmail.com"), None);
        assert_eq!(contact_email_slug("no contact here"), None);
    }

    #[test]
    fn known_correction_beats_presented_by() {
        let body = "Presented by Somebody Else\nContact Email: info@slc.gov";
        let (org, strategy) = resolve_organization(&signals(body, "Mural", ""));
        assert_eq!(org, "Salt Lake City Arts Council");
        assert_eq!(strategy, OrganizationStrategy::KnownCorrection);
    }

    #[test]
    fn prose_pattern_drops_trailing_appositive() {
        let body = "The City of Keller, Texas, invites artists to submit qualifications.";
        let (org, strategy) = resolve_organization(&signals(body, "Riverside Mural", ""));
        assert_eq!(org, "City of Keller");
        assert_eq!(strategy, OrganizationStrategy::ProsePattern);
    }

    #[test]
    fn prose_pattern_skips_generic_subjects() {
        let body = "The Project seeks a muralist.\nThe Blue Line Arts Foundation (BLA) is accepting proposals.";
        let (org, _) = resolve_organization(&signals(body, "", ""));
        assert_eq!(org, "Blue Line Arts Foundation");
    }

    #[test]
    fn title_colon_rejects_calls() {
        let (org, strategy) = resolve_organization(&signals("", "Millcreek Commons: Gateway Sculpture", ""));
        assert_eq!(org, "Millcreek Commons");
        assert_eq!(strategy, OrganizationStrategy::TitleColon);

        let (_, strategy) = resolve_organization(&signals("", "Call for Artists: Gateway", ""));
        assert_eq!(strategy, OrganizationStrategy::Unknown);
    }

    #[test]
    fn tab_title_takes_second_to_last_segment() {
        let (org, strategy) = resolve_organization(&signals(
            "",
            "Gateway Sculpture",
            "Gateway Sculpture - Winston-Salem Arts Council - CaFÉ",
        ));
        assert_eq!(org, "Winston-Salem Arts Council");
        assert_eq!(strategy, OrganizationStrategy::TabTitle);

        let (_, strategy) = resolve_organization(&signals("", "", "Gateway - Call for Artists - CaFÉ"));
        assert_eq!(strategy, OrganizationStrategy::Unknown);
        let (_, strategy) = resolve_organization(&signals("", "", "Gateway - CaFÉ"));
        assert_eq!(strategy, OrganizationStrategy::Unknown);
    }

    #[test]
    fn presented_by_reads_to_end_of_line() {
        let body = "Presented by: Ah Haa Arts Collective\nDeadline: May 1";
        let (org, strategy) = resolve_organization(&signals(body, "", ""));
        assert_eq!(org, "Ah Haa Arts Collective");
        assert_eq!(strategy, OrganizationStrategy::PresentedBy);
    }

    #[test]
    fn unmapped_slug_is_humanized() {
        let body = "Contact Email: admin@townofParker.org";
        let (org, strategy) = resolve_organization(&signals(body, "", ""));
        assert_eq!(org, "Townof Parker");
        assert_eq!(strategy, OrganizationStrategy::SlugCleaned);
        assert_eq!(title_case("city of keller"), "City Of Keller");
        assert_eq!(title_case("palmetto-bay"), "Palmetto-Bay");
    }

    #[test]
    fn overlong_candidate_falls_through() {
        let long = format!("Presented by {}", "Long Name ".repeat(8));
        let (org, strategy) = resolve_organization(&signals(&long, "", ""));
        assert_eq!(org, UNKNOWN_ORGANIZATION);
        assert_eq!(strategy, OrganizationStrategy::Unknown);
    }
}
