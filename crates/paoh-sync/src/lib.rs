//! Harvest orchestration: discovery, extraction, admission, reconciliation and the digest, once per run.

pub mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use paoh_adapters::{
    adapter_for_source, discover_listings, load_fixture_bundle, DiscoveryError, DiscoveryOptions,
    FixtureBundle, HttpPageSession, PageSession, SourceAdapter,
};
use paoh_core::{admit, AdmissionRejection, Opportunity};
use paoh_notify::{DeliveryOutcome, DigestConfig, HttpMailRelay, MailRelay, NotificationDigest, SenderCredentials};
use paoh_storage::{
    GoogleSheetsService, HttpClientConfig, HttpFetcher, MergeReport, ReconciliationStore, DEFAULT_SHEETS_API_BASE,
};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub use report::{harvest_brief, write_run_report, RunReport};

pub const CRATE_NAME: &str = "paoh-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source_id: String,
    pub email_sender: Option<String>,
    pub email_password: Option<String>,
    pub email_receivers: Vec<String>,
    pub sheet_id: String,
    pub worksheet: String,
    pub sheets_token: Option<String>,
    pub sheets_api_base: String,
    pub mail_relay_url: Option<String>,
    pub user_agent: String,
    pub index_url: Option<String>,
    pub base_url: Option<String>,
    pub index_timeout_secs: u64,
    pub detail_timeout_secs: u64,
    pub anchor_wait_secs: u64,
    pub reports_dir: PathBuf,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    /// Zone the digest subject is dated in.
    pub digest_timezone: Tz,
    /// Replay a captured fixture bundle instead of fetching live pages.
    pub fixture_bundle: Option<PathBuf>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secs = |key: &str, default: u64| get(key).and_then(|v| v.parse().ok()).unwrap_or(default);

        Self {
            source_id: get("PAOH_SOURCE").unwrap_or_else(|| "cafe".to_string()),
            email_sender: get("EMAIL_SENDER"),
            email_password: get("EMAIL_PASSWORD"),
            email_receivers: get("EMAIL_RECEIVER")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            sheet_id: get("SHEET_ID").unwrap_or_default(),
            worksheet: get("PAOH_WORKSHEET").unwrap_or_else(|| "Opportunities".to_string()),
            sheets_token: get("GOOGLE_SHEETS_TOKEN"),
            sheets_api_base: get("SHEETS_API_BASE").unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            mail_relay_url: get("MAIL_RELAY_URL"),
            user_agent: get("PAOH_USER_AGENT")
                .unwrap_or_else(|| "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string()),
            index_url: get("PAOH_INDEX_URL"),
            base_url: get("PAOH_BASE_URL"),
            index_timeout_secs: secs("PAOH_INDEX_TIMEOUT_SECS", 60),
            detail_timeout_secs: secs("PAOH_DETAIL_TIMEOUT_SECS", 20),
            anchor_wait_secs: secs("PAOH_ANCHOR_WAIT_SECS", 10),
            reports_dir: get("PAOH_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            scheduler_enabled: get("PAOH_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: get("PAOH_SYNC_CRON").unwrap_or_else(|| "0 0 13 * * Mon".to_string()),
            digest_timezone: get("PAOH_DIGEST_TZ")
                .and_then(|v| v.parse::<Tz>().ok())
                .unwrap_or(chrono_tz::America::New_York),
            fixture_bundle: get("PAOH_FIXTURE_BUNDLE").map(PathBuf::from),
        }
    }

    /// Discovery options for `adapter`, with configured endpoint overrides applied.
    pub fn discovery_options(&self, adapter: &dyn SourceAdapter) -> DiscoveryOptions {
        let mut options = DiscoveryOptions::for_adapter(adapter);
        if let Some(index_url) = &self.index_url {
            options.index_url = index_url.clone();
        }
        if let Some(base_url) = &self.base_url {
            options.base_url = base_url.clone();
        }
        options.index_timeout = Duration::from_secs(self.index_timeout_secs);
        options.anchor_wait = Duration::from_secs(self.anchor_wait_secs);
        options
    }

    pub fn digest_config(&self) -> DigestConfig {
        let sender = match (&self.email_sender, &self.email_password) {
            (Some(address), Some(password)) => Some(SenderCredentials {
                address: address.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        DigestConfig {
            sender,
            recipients: self.email_receivers.clone(),
            sheet_id: self.sheet_id.clone(),
        }
    }
}

/// What became of one discovered listing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ListingOutcome {
    Accepted(Opportunity),
    Rejected(AdmissionRejection),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestEntry {
    pub link: String,
    pub outcome: ListingOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub discovered: usize,
    pub entries: Vec<HarvestEntry>,
}

impl HarvestReport {
    /// Admitted records in discovery order.
    pub fn accepted(&self) -> Vec<Opportunity> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                ListingOutcome::Accepted(opportunity) => Some(opportunity.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.count(|o| matches!(o, ListingOutcome::Accepted(_)))
    }

    pub fn rejected_count(&self) -> usize {
        self.count(|o| matches!(o, ListingOutcome::Rejected(_)))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, ListingOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&ListingOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    DiscoveryFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub discovered: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub inserted: usize,
    pub corrected: usize,
    pub delivery: Option<DeliveryOutcome>,
    pub reports_dir: Option<String>,
}

/// One harvest run end to end. Listings are processed strictly one after another on a single session.
pub struct HarvestPipeline {
    config: SyncConfig,
    adapter: Box<dyn SourceAdapter>,
    store: ReconciliationStore,
    digest: NotificationDigest,
    http: HttpFetcher,
    fixtures: Option<FixtureBundle>,
}

impl HarvestPipeline {
    pub fn new(
        config: SyncConfig,
        adapter: Box<dyn SourceAdapter>,
        store: ReconciliationStore,
        digest: NotificationDigest,
        http: HttpFetcher,
    ) -> Self {
        Self {
            config,
            adapter,
            store,
            digest,
            http,
            fixtures: None,
        }
    }

    /// Wire the live collaborators described by `config`.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let adapter = adapter_for_source(&config.source_id)
            .with_context(|| format!("no adapter registered for {}", config.source_id))?;
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.index_timeout_secs.max(config.detail_timeout_secs)),
            user_agent: Some(config.user_agent.clone()),
        })?;

        let sheets = GoogleSheetsService::new(
            http.client().clone(),
            config.sheets_api_base.clone(),
            config.sheets_token.clone(),
        );
        let store = ReconciliationStore::new(Arc::new(sheets), config.sheet_id.clone(), config.worksheet.clone());

        let relay: Option<Arc<dyn MailRelay>> = match (&config.mail_relay_url, &config.email_sender, &config.email_password) {
            (Some(url), Some(sender), Some(password)) => Some(Arc::new(HttpMailRelay::new(
                http.client().clone(),
                url.clone(),
                sender.clone(),
                password.clone(),
            ))),
            _ => None,
        };
        let digest = NotificationDigest::new(config.digest_config(), relay);

        let fixtures = config
            .fixture_bundle
            .as_ref()
            .map(load_fixture_bundle)
            .transpose()
            .context("loading fixture bundle")?;

        let mut pipeline = Self::new(config, adapter, store, digest, http);
        pipeline.fixtures = fixtures;
        Ok(pipeline)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A fresh session: the fixture replay when configured, otherwise plain HTTP.
    pub fn open_session(&self) -> Box<dyn PageSession> {
        match &self.fixtures {
            Some(bundle) => Box::new(bundle.session()),
            None => Box::new(HttpPageSession::new(self.http.clone())),
        }
    }

    pub fn adapter(&self) -> &dyn SourceAdapter {
        self.adapter.as_ref()
    }

    /// Discover listings and run every one through extraction and admission.
    #[instrument(skip_all, fields(source = self.adapter.source_id()))]
    pub async fn harvest(&self, session: &mut dyn PageSession) -> Result<HarvestReport, DiscoveryError> {
        session.block_resources(self.adapter.blocked_resources());
        let options = self.config.discovery_options(self.adapter.as_ref());
        let links = discover_listings(session, &options).await?;
        info!(listings = links.len(), "found listing links");

        let detail_timeout = Duration::from_secs(self.config.detail_timeout_secs);
        let mut report = HarvestReport {
            discovered: links.len(),
            entries: Vec::with_capacity(links.len()),
        };
        for (idx, link) in links.iter().enumerate() {
            let outcome = self.process_listing(session, link, detail_timeout).await;
            match &outcome {
                ListingOutcome::Accepted(opportunity) => info!(
                    listing = idx + 1,
                    organization = opportunity.organization(),
                    budget = opportunity.budget_value(),
                    "accepted listing"
                ),
                ListingOutcome::Rejected(rejection) => {
                    debug!(listing = idx + 1, link = %link, %rejection, "listing not admitted")
                }
                ListingOutcome::Failed(err) => {
                    warn!(listing = idx + 1, link = %link, error = %err, "listing skipped")
                }
            }
            report.entries.push(HarvestEntry {
                link: link.clone(),
                outcome,
            });
        }
        Ok(report)
    }

    async fn process_listing(
        &self,
        session: &mut dyn PageSession,
        link: &str,
        timeout: Duration,
    ) -> ListingOutcome {
        let page = match self.adapter.fetch_detail(session, link, timeout).await {
            Ok(page) => page,
            Err(err) => return ListingOutcome::Failed(err.to_string()),
        };
        let draft = self.adapter.parse_detail(&page);
        debug!(link, strategy = %draft.organization_strategy, organization = %draft.organization, "extracted draft");
        match admit(draft) {
            Ok(opportunity) => ListingOutcome::Accepted(opportunity),
            Err(rejection) => ListingOutcome::Rejected(rejection),
        }
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let mut session = self.open_session();
        self.run_once_with(session.as_mut()).await
    }

    /// Harvest, merge the admitted records, then notify about the newly inserted ones.
    #[instrument(skip_all)]
    pub async fn run_once_with(&self, session: &mut dyn PageSession) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "harvest run started");

        let harvest = match self.harvest(session).await {
            Ok(harvest) => harvest,
            Err(err) => {
                error!(%run_id, error = %err, "discovery failed; run aborted");
                return Ok(SyncRunSummary {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    status: RunStatus::DiscoveryFailed,
                    discovered: 0,
                    accepted: 0,
                    rejected: 0,
                    failed: 0,
                    inserted: 0,
                    corrected: 0,
                    delivery: None,
                    reports_dir: None,
                });
            }
        };

        let accepted = harvest.accepted();
        let today = Local::now().date_naive();
        let digest_day = date_in_zone(Utc::now(), self.config.digest_timezone);
        let (merge, delivery) = if accepted.is_empty() {
            info!("no admitted listings; nothing to merge");
            (None, None)
        } else {
            let merge = self.store.merge(&accepted, today).await;
            let delivery = self.digest.send(&merge.inserted, digest_day).await;
            (Some(merge), Some(delivery))
        };

        let finished_at = Utc::now();
        let run_report = RunReport {
            run_id,
            started_at,
            finished_at,
            harvest: &harvest,
            merge: merge.as_ref(),
            delivery: delivery.as_ref(),
        };
        let reports_dir = match write_run_report(&self.config.reports_dir, &run_report).await {
            Ok(dir) => Some(dir.display().to_string()),
            Err(err) => {
                error!(%run_id, error = %format!("{err:#}"), "run report not written");
                None
            }
        };

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at,
            status: RunStatus::Completed,
            discovered: harvest.discovered,
            accepted: harvest.accepted_count(),
            rejected: harvest.rejected_count(),
            failed: harvest.failed_count(),
            inserted: merge.as_ref().map(|m: &MergeReport| m.inserted.len()).unwrap_or_default(),
            corrected: merge.as_ref().map(|m| m.corrected).unwrap_or_default(),
            delivery,
            reports_dir,
        };
        info!(
            %run_id,
            accepted = summary.accepted,
            inserted = summary.inserted,
            corrected = summary.corrected,
            "harvest run finished"
        );
        Ok(summary)
    }
}

/// Calendar date of `now` in `zone`.
pub fn date_in_zone(now: DateTime<Utc>, zone: Tz) -> NaiveDate {
    now.with_timezone(&zone).date_naive()
}

/// Scheduler running the pipeline on `sync_cron`, or `None` when scheduling is disabled.
pub async fn maybe_build_scheduler(pipeline: Arc<HarvestPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config().scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = pipeline.config().sync_cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            match pipeline.run_once().await {
                Ok(summary) => info!(run_id = %summary.run_id, status = ?summary.status, "scheduled harvest finished"),
                Err(err) => error!(error = %err, "scheduled harvest failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    let pipeline = HarvestPipeline::from_config(SyncConfig::from_env())?;
    pipeline.run_once().await
}
