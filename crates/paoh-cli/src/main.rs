use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paoh_core::admit;
use paoh_sync::{maybe_build_scheduler, HarvestPipeline, SyncConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "paoh-cli")]
#[command(about = "Public art opportunity harvester")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one harvest: discover, extract, merge into the sheet, mail the digest.
    Harvest,
    /// Extract a single detail page and print the draft with its admission verdict.
    Extract {
        url: String,
    },
    /// Run harvests on the configured cron schedule until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Harvest) {
        Commands::Harvest => {
            let summary = paoh_sync::run_sync_once_from_env().await?;
            println!(
                "harvest complete: run_id={} status={:?} discovered={} accepted={} inserted={} corrected={} reports={}",
                summary.run_id,
                summary.status,
                summary.discovered,
                summary.accepted,
                summary.inserted,
                summary.corrected,
                summary.reports_dir.as_deref().unwrap_or("-"),
            );
        }
        Commands::Extract { url } => {
            let pipeline = HarvestPipeline::from_config(SyncConfig::from_env())?;
            let adapter = pipeline.adapter();
            let mut session = pipeline.open_session();
            session.block_resources(adapter.blocked_resources());

            let timeout = Duration::from_secs(pipeline.config().detail_timeout_secs);
            let page = adapter
                .fetch_detail(session.as_mut(), &url, timeout)
                .await
                .with_context(|| format!("fetching {url}"))?;
            let draft = adapter.parse_detail(&page);
            let verdict = match admit(draft.clone()) {
                Ok(opportunity) => serde_json::json!({ "admitted": true, "opportunity": opportunity }),
                Err(rejection) => serde_json::json!({ "admitted": false, "rejection": rejection }),
            };
            let out = serde_json::json!({ "draft": draft, "verdict": verdict });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Schedule => {
            let mut config = SyncConfig::from_env();
            config.scheduler_enabled = true;
            let cron = config.sync_cron.clone();
            let pipeline = Arc::new(HarvestPipeline::from_config(config)?);

            let Some(mut sched) = maybe_build_scheduler(pipeline).await? else {
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            info!(%cron, "scheduler started; waiting for ctrl-c");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
            info!("scheduler stopped");
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
