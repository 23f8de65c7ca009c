//! In-memory worksheet for tests and offline runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::sheets::{SpreadsheetService, StoreError, Worksheet};

/// Calls made against the worksheet, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundTrips {
    pub reads: usize,
    pub appends: usize,
    pub updates: usize,
}

#[derive(Debug, Default)]
struct SheetState {
    rows: Vec<Vec<String>>,
    trips: RoundTrips,
}

#[derive(Debug)]
struct Shared {
    spreadsheet: String,
    worksheet: String,
    fail_open: bool,
    fail_reads: bool,
    state: Mutex<SheetState>,
}

/// One spreadsheet holding one named worksheet.
#[derive(Debug, Clone)]
pub struct MemorySpreadsheet {
    shared: Arc<Shared>,
}

impl MemorySpreadsheet {
    pub fn new(spreadsheet: impl Into<String>, worksheet: impl Into<String>) -> Self {
        Self::with_rows(spreadsheet, worksheet, Vec::new())
    }

    pub fn with_rows(
        spreadsheet: impl Into<String>,
        worksheet: impl Into<String>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self::build(spreadsheet.into(), worksheet.into(), rows, false, false)
    }

    /// A spreadsheet whose `open_worksheet` always fails.
    pub fn unreachable(spreadsheet: impl Into<String>, worksheet: impl Into<String>) -> Self {
        Self::build(spreadsheet.into(), worksheet.into(), Vec::new(), true, false)
    }

    /// A spreadsheet that opens but whose reads always fail.
    pub fn unreadable(
        spreadsheet: impl Into<String>,
        worksheet: impl Into<String>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self::build(spreadsheet.into(), worksheet.into(), rows, false, true)
    }

    fn build(
        spreadsheet: String,
        worksheet: String,
        rows: Vec<Vec<String>>,
        fail_open: bool,
        fail_reads: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                spreadsheet,
                worksheet,
                fail_open,
                fail_reads,
                state: Mutex::new(SheetState {
                    rows,
                    trips: RoundTrips::default(),
                }),
            }),
        }
    }

    pub async fn rows(&self) -> Vec<Vec<String>> {
        self.shared.state.lock().await.rows.clone()
    }

    pub async fn round_trips(&self) -> RoundTrips {
        self.shared.state.lock().await.trips
    }
}

#[async_trait]
impl SpreadsheetService for MemorySpreadsheet {
    async fn open_worksheet(
        &self,
        spreadsheet: &str,
        worksheet: &str,
    ) -> Result<Box<dyn Worksheet>, StoreError> {
        let reason = if self.shared.fail_open {
            Some("spreadsheet unreachable")
        } else if spreadsheet != self.shared.spreadsheet {
            Some("spreadsheet not found")
        } else if worksheet != self.shared.worksheet {
            Some("worksheet not found")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(StoreError::Open {
                spreadsheet: spreadsheet.to_string(),
                worksheet: worksheet.to_string(),
                message: reason.to_string(),
            });
        }
        Ok(Box::new(MemoryWorksheet {
            shared: Arc::clone(&self.shared),
        }))
    }
}

#[derive(Debug)]
struct MemoryWorksheet {
    shared: Arc<Shared>,
}

#[async_trait]
impl Worksheet for MemoryWorksheet {
    fn title(&self) -> &str {
        &self.shared.worksheet
    }

    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let mut state = self.shared.state.lock().await;
        state.trips.reads += 1;
        if self.shared.fail_reads {
            return Err(StoreError::Message("read refused".to_string()));
        }
        Ok(state.rows.clone())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), StoreError> {
        let mut state = self.shared.state.lock().await;
        state.trips.appends += 1;
        state.rows.extend(rows.iter().cloned());
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        let mut state = self.shared.state.lock().await;
        state.trips.updates += 1;
        let rows = state.rows.len();
        if row == 0 || col == 0 || row > rows {
            return Err(StoreError::RowOutOfRange { row, rows });
        }
        let cells = &mut state.rows[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_checks_names() {
        let sheet = MemorySpreadsheet::new("book", "Opportunities");
        assert!(sheet.open_worksheet("book", "Opportunities").await.is_ok());
        assert!(sheet.open_worksheet("book", "Other").await.is_err());
        assert!(sheet.open_worksheet("other", "Opportunities").await.is_err());
    }

    #[tokio::test]
    async fn update_cell_pads_short_rows_and_counts_trips() {
        let sheet = MemorySpreadsheet::with_rows("book", "Opportunities", vec![vec!["a".into()]]);
        let ws = sheet.open_worksheet("book", "Opportunities").await.unwrap();
        ws.update_cell(1, 3, "c").await.unwrap();
        assert!(ws.update_cell(2, 1, "x").await.is_err());

        assert_eq!(sheet.rows().await, vec![vec!["a".to_string(), String::new(), "c".to_string()]]);
        assert_eq!(sheet.round_trips().await.updates, 2);
    }
}
