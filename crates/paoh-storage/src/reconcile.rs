//! Merge admitted opportunities into the persisted sheet.
//!
//! Known links get their organization and project-type cells rewritten in place; unknown links are
//! appended in a single batch and reported back as newly inserted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use paoh_core::{clean_text, Opportunity, ORGANIZATION_COLUMN, PROJECT_TYPE_COLUMN, SOURCE_URL_INDEX};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::sheets::{SpreadsheetService, StoreError, Worksheet};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Rows whose source URL was mapped before merging.
    pub existing_rows: usize,
    /// Records appended by this merge, in input order.
    pub inserted: Vec<Opportunity>,
    pub corrected: usize,
    pub failed_corrections: usize,
    /// Incoming records repeating a link already seen earlier in the same batch.
    pub repeated_in_batch: usize,
}

/// Map each stored source URL to its 1-based row number. Later duplicates win.
pub fn build_row_index(values: &[Vec<String>]) -> HashMap<String, usize> {
    values
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let url = row.get(SOURCE_URL_INDEX)?;
            url.contains("http").then(|| (url.clone(), idx + 1))
        })
        .collect()
}

pub struct ReconciliationStore {
    service: Arc<dyn SpreadsheetService>,
    spreadsheet: String,
    worksheet: String,
}

impl ReconciliationStore {
    pub fn new(
        service: Arc<dyn SpreadsheetService>,
        spreadsheet: impl Into<String>,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            service,
            spreadsheet: spreadsheet.into(),
            worksheet: worksheet.into(),
        }
    }

    /// Merge and return what was newly inserted. Store failures are logged and yield an empty report.
    pub async fn merge(&self, records: &[Opportunity], discovered_on: NaiveDate) -> MergeReport {
        match self.try_merge(records, discovered_on).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "reconciliation aborted");
                MergeReport::default()
            }
        }
    }

    #[instrument(skip_all, fields(records = records.len(), worksheet = %self.worksheet))]
    pub async fn try_merge(
        &self,
        records: &[Opportunity],
        discovered_on: NaiveDate,
    ) -> Result<MergeReport, StoreError> {
        let worksheet = self
            .service
            .open_worksheet(&self.spreadsheet, &self.worksheet)
            .await?;

        let row_index = match worksheet.get_all_values().await {
            Ok(values) => build_row_index(&values),
            Err(err) => {
                warn!(error = %err, "could not read existing rows; treating every record as new");
                HashMap::new()
            }
        };

        let mut report = MergeReport {
            existing_rows: row_index.len(),
            ..MergeReport::default()
        };
        info!(existing_rows = report.existing_rows, "loaded existing rows");

        let mut seen = HashSet::new();
        let mut rows_to_add = Vec::new();

        for record in records {
            if !seen.insert(record.link()) {
                report.repeated_in_batch += 1;
                continue;
            }

            match row_index.get(record.link()) {
                Some(&row) => match correct_row(worksheet.as_ref(), row, record).await {
                    Ok(()) => report.corrected += 1,
                    Err(err) => {
                        warn!(row, link = record.link(), error = %err, "correction failed");
                        report.failed_corrections += 1;
                    }
                },
                None => {
                    rows_to_add.push(record.to_row(discovered_on));
                    report.inserted.push(record.clone());
                }
            }
        }

        if rows_to_add.is_empty() {
            info!(corrected = report.corrected, "no new rows; existing rows refreshed");
        } else {
            worksheet.append_rows(&rows_to_add).await?;
            info!(appended = rows_to_add.len(), corrected = report.corrected, "appended new rows");
        }

        Ok(report)
    }
}

/// Rewrite the organization and project-type cells of a stored row; nothing else is touched.
async fn correct_row(worksheet: &dyn Worksheet, row: usize, record: &Opportunity) -> Result<(), StoreError> {
    worksheet
        .update_cell(row, ORGANIZATION_COLUMN, &clean_text(record.organization()))
        .await?;
    worksheet
        .update_cell(row, PROJECT_TYPE_COLUMN, &clean_text(record.project_type()))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySpreadsheet, RoundTrips};
    use paoh_core::{admit, OpportunityDraft, OrganizationStrategy};

    const BOOK: &str = "book";
    const SHEET: &str = "Opportunities";

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()
    }

    fn link(id: u32) -> String {
        format!("https://artist.callforentry.org/festivals_unique_info.php?ID={id}")
    }

    fn opportunity(id: u32, organization: &str, budget: &str) -> Opportunity {
        admit(OpportunityDraft {
            title: format!("Listing {id}"),
            organization: organization.to_string(),
            organization_strategy: OrganizationStrategy::KnownCorrection,
            city: "Salt Lake City".into(),
            state: "Utah".into(),
            link: link(id),
            deadline: "May 1, 2026".into(),
            entry_fee: "$0".into(),
            budget: budget.into(),
            eligibility: String::new(),
            keywords: "mural".into(),
            project_type: "Mural (RFQ)".into(),
            source_id: id.to_string(),
        })
        .unwrap()
    }

    fn stored_row(id: u32, organization: &str, budget: &str) -> Vec<String> {
        let mut row = vec![String::new(); 17];
        row[0] = "April 1, 2026".into();
        row[3] = organization.into();
        row[6] = "Public Art".into();
        row[7] = budget.into();
        row[12] = link(id);
        row[15] = format!("CAFE_{id}");
        row
    }

    fn header() -> Vec<String> {
        let mut row = vec![String::new(); 17];
        row[12] = "Source URL".into();
        row
    }

    fn store(sheet: &MemorySpreadsheet) -> ReconciliationStore {
        ReconciliationStore::new(Arc::new(sheet.clone()), BOOK, SHEET)
    }

    #[test]
    fn row_index_skips_rows_without_urls() {
        let values = vec![header(), stored_row(7, "Slc", "$9,000"), vec!["short".into()]];
        let index = build_row_index(&values);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&link(7)), Some(&2));
    }

    #[tokio::test]
    async fn known_link_rewrites_only_organization_and_project_type() {
        let original = stored_row(7, "Slc", "$9,000");
        let sheet = MemorySpreadsheet::with_rows(BOOK, SHEET, vec![header(), original.clone()]);

        let incoming = opportunity(7, "Salt Lake City Arts Council", "$12,000");
        let report = store(&sheet).merge(&[incoming], day()).await;

        assert!(report.inserted.is_empty());
        assert_eq!(report.corrected, 1);

        let rows = sheet.rows().await;
        assert_eq!(rows.len(), 2);
        let updated = &rows[1];
        assert_eq!(updated[3], "Salt Lake City Arts Council");
        assert_eq!(updated[6], "Mural (RFQ)");
        for (idx, cell) in updated.iter().enumerate() {
            if idx != 3 && idx != 6 {
                assert_eq!(cell, &original[idx], "column {idx} must be untouched");
            }
        }
        assert_eq!(updated[7], "$9,000");
        assert_eq!(sheet.round_trips().await.appends, 0);
    }

    #[tokio::test]
    async fn unknown_links_are_appended_once_and_reported() {
        let sheet = MemorySpreadsheet::with_rows(BOOK, SHEET, vec![header(), stored_row(7, "Slc", "$9,000")]);
        let records = vec![
            opportunity(8, "Blue Line Arts", "$5,000"),
            opportunity(7, "Salt Lake City Arts Council", "$9,000"),
            opportunity(9, "High Desert Museum", "$40,000"),
        ];

        let report = store(&sheet).merge(&records, day()).await;

        let inserted: Vec<String> = report.inserted.iter().map(|o| o.link().to_string()).collect();
        assert_eq!(inserted, vec![link(8), link(9)]);
        let trips = sheet.round_trips().await;
        assert_eq!(trips.appends, 1);
        assert_eq!(trips.reads, 1);

        let rows = sheet.rows().await;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2][12], link(8));
        assert_eq!(rows[2][1], "2026-04-06");
        assert_eq!(rows[3][15], "CAFE_9");
    }

    #[tokio::test]
    async fn second_merge_of_same_batch_appends_nothing() {
        let sheet = MemorySpreadsheet::with_rows(BOOK, SHEET, vec![header()]);
        let records = vec![
            opportunity(1, "Blue Line Arts", "$5,000"),
            opportunity(2, "Millcreek City", "$25,000"),
        ];

        let first = store(&sheet).merge(&records, day()).await;
        assert_eq!(first.inserted.len(), 2);
        let second = store(&sheet).merge(&records, day()).await;
        assert!(second.inserted.is_empty());
        assert_eq!(second.corrected, 2);
        assert_eq!(sheet.rows().await.len(), 3);
        assert_eq!(sheet.round_trips().await.appends, 1);
    }

    #[tokio::test]
    async fn repeated_link_in_batch_is_appended_once() {
        let sheet = MemorySpreadsheet::new(BOOK, SHEET);
        let records = vec![
            opportunity(3, "Swiftel Center", "$8,000"),
            opportunity(3, "Swiftel Center", "$8,000"),
        ];
        let report = store(&sheet).merge(&records, day()).await;
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.repeated_in_batch, 1);
        assert_eq!(sheet.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn open_failure_yields_empty_result_and_no_writes() {
        let sheet = MemorySpreadsheet::unreachable(BOOK, SHEET);
        let report = store(&sheet)
            .merge(&[opportunity(4, "Ocfl", "$6,000")], day())
            .await;
        assert!(report.inserted.is_empty());
        assert_eq!(sheet.round_trips().await, RoundTrips::default());
    }

    #[tokio::test]
    async fn read_failure_degrades_to_all_new() {
        let sheet = MemorySpreadsheet::unreadable(BOOK, SHEET, vec![header(), stored_row(5, "Old", "$4,000")]);
        let report = store(&sheet)
            .merge(&[opportunity(5, "Orange County (FL)", "$6,000")], day())
            .await;
        assert_eq!(report.existing_rows, 0);
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(sheet.rows().await.len(), 3);
    }
}
