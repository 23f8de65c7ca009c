//! Per-run report files under `<reports_dir>/<run_id>/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use paoh_notify::DeliveryOutcome;
use paoh_storage::MergeReport;
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::{HarvestReport, ListingOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub harvest: &'a HarvestReport,
    pub merge: Option<&'a MergeReport>,
    pub delivery: Option<&'a DeliveryOutcome>,
}

pub async fn write_run_report(reports_root: &Path, report: &RunReport<'_>) -> Result<PathBuf> {
    let dir = reports_root.join(report.run_id.to_string());
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let json = serde_json::to_vec_pretty(report).context("serializing run report")?;
    fs::write(dir.join("run_report.json"), json)
        .await
        .context("writing run_report.json")?;

    fs::write(dir.join("harvest_brief.md"), harvest_brief(report))
        .await
        .context("writing harvest_brief.md")?;

    Ok(dir)
}

fn delivery_line(delivery: Option<&DeliveryOutcome>) -> String {
    match delivery {
        None => "not attempted".to_string(),
        Some(DeliveryOutcome::Sent { recipients, previewed }) => {
            format!("sent to {recipients} recipient(s), {previewed} previewed")
        }
        Some(DeliveryOutcome::Skipped { reason }) => format!("skipped ({reason:?})"),
        Some(DeliveryOutcome::Failed { error }) => format!("failed: {error}"),
    }
}

pub fn harvest_brief(report: &RunReport<'_>) -> String {
    let harvest = report.harvest;
    let inserted = report.merge.map(|m| m.inserted.as_slice()).unwrap_or_default();
    let corrected = report.merge.map(|m| m.corrected).unwrap_or_default();

    let new_items = if inserted.is_empty() {
        "- none".to_string()
    } else {
        inserted
            .iter()
            .map(|o| format!("- [{}]({}) | {} | {}", o.title(), o.link(), o.organization(), o.budget()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let failures = harvest
        .entries
        .iter()
        .filter_map(|entry| match &entry.outcome {
            ListingOutcome::Failed(error) => Some(format!("- {}: {}", entry.link, error)),
            _ => None,
        })
        .collect::<Vec<_>>();
    let failures = if failures.is_empty() {
        "- none".to_string()
    } else {
        failures.join("\n")
    };

    format!(
        "# PAOH Harvest Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Discovered listings: {}\n- Accepted: {}\n- Rejected: {}\n- Failed: {}\n- Inserted: {}\n- Corrected: {}\n- Notification: {}\n\n## New Opportunities\n{}\n\n## Failed Listings\n{}\n",
        report.run_id,
        report.started_at,
        report.finished_at,
        harvest.discovered,
        harvest.accepted_count(),
        harvest.rejected_count(),
        harvest.failed_count(),
        inserted.len(),
        corrected,
        delivery_line(report.delivery),
        new_items,
        failures,
    )
}
