use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tdk_sync::SyncOrchestrator;
use tdk_tracker::{TrackerApi, TrackerClient};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tdk")]
#[command(about = "TrafficDesk CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Remote → local synchronization
    Sync {
        #[command(subcommand)]
        cmd: SyncCmd,
    },

    /// Flow-level operations against the tracker
    Flow {
        #[command(subcommand)]
        cmd: FlowCmd,
    },

    /// Flow-offer lifecycle operations
    Offer {
        #[command(subcommand)]
        cmd: OfferCmd,
    },

    /// Campaign provisioning
    Campaign {
        #[command(subcommand)]
        cmd: CampaignCmd,
    },

    /// Tracker connectivity utilities
    Tracker {
        #[command(subcommand)]
        cmd: TrackerCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum SyncCmd {
    /// Pull all campaigns; locals absent upstream are soft-marked deleted.
    Campaigns,

    /// Pull the streams of one campaign and merge each flow's offer set.
    Streams {
        /// Campaign tracker id
        #[arg(long)]
        campaign: i64,
    },

    /// Refresh the offer cache.
    Offers,
}

#[derive(Subcommand)]
enum FlowCmd {
    /// Push the flow's active allocation to its tracker stream.
    Push {
        /// Local flow id
        #[arg(long)]
        flow: i64,
    },

    /// Compare the local allocation with the tracker's.
    Diff {
        /// Local flow id
        #[arg(long)]
        flow: i64,
    },

    /// Discard local edits and reload the campaign's streams from the tracker.
    Cancel {
        /// Local flow id
        #[arg(long)]
        flow: i64,
    },
}

#[derive(Subcommand)]
enum OfferCmd {
    /// Attach a cached offer to a flow and rebalance.
    Add {
        /// Local flow id
        #[arg(long)]
        flow: i64,

        /// Offer tracker id
        #[arg(long)]
        offer: i64,
    },

    /// Disable a flow offer (share 0) and rebalance the survivors.
    Remove {
        /// Flow offer id
        #[arg(long)]
        id: i64,
    },

    /// Bring a disabled flow offer back and rebalance.
    Restore {
        /// Flow offer id
        #[arg(long)]
        id: i64,
    },

    /// Flip a flow offer's pin flag.
    Pin {
        /// Flow offer id
        #[arg(long)]
        id: i64,
    },

    /// Set a flow offer's share manually (pins unless --no-pin).
    SetShare {
        /// Flow offer id
        #[arg(long)]
        id: i64,

        /// Requested share percentage (0..=100)
        #[arg(long)]
        share: i32,

        /// Leave the row unpinned; the value is then subject to rebalancing.
        #[arg(long, default_value_t = false)]
        no_pin: bool,
    },

    /// Search the offer cache by name substring.
    Search {
        #[arg(long)]
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum CampaignCmd {
    /// Create a campaign on the tracker with the conventional two streams.
    Create {
        /// Campaign display name
        #[arg(long)]
        name: String,

        /// Comma-separated geo codes for the redirect stream (e.g. US,GB,DE)
        #[arg(long)]
        geo: String,

        /// Offer tracker id receiving 100% of the offers stream
        #[arg(long)]
        offer: i64,
    },
}

#[derive(Subcommand)]
enum TrackerCmd {
    /// Probe the configured API key.
    ValidateKey,

    /// Build a tracker report from a JSON params string.
    Report {
        /// Report params as JSON (passed to the tracker verbatim)
        #[arg(long)]
        params: String,
    },
}

async fn orchestrator() -> Result<SyncOrchestrator<TrackerClient>> {
    let pool = tdk_db::connect_from_env().await?;
    let cfg = tdk_config::TrackerConfig::from_env()?;
    let client = TrackerClient::new(&cfg)?;
    Ok(SyncOrchestrator::new(pool, client))
}

fn print_outcome(outcome: &tdk_lifecycle::LifecycleOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time .env bootstrap; real deployments set the environment directly.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tdk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tdk_db::status(&pool).await?;
                    println!("db_ok={} has_campaigns_table={}", s.ok, s.has_campaigns_table);
                }
                DbCmd::Migrate => {
                    tdk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Sync { cmd } => {
            let sync = orchestrator().await?;
            match cmd {
                SyncCmd::Campaigns => {
                    let n = sync.sync_campaigns().await?;
                    println!("campaigns_synced={n}");
                }
                SyncCmd::Streams { campaign } => {
                    let n = sync.sync_streams(campaign).await?;
                    println!("streams_synced={n} campaign={campaign}");
                }
                SyncCmd::Offers => {
                    let n = sync.sync_offers().await?;
                    println!("offers_synced={n}");
                }
            }
        }

        Commands::Flow { cmd } => {
            let sync = orchestrator().await?;
            match cmd {
                FlowCmd::Push { flow } => {
                    sync.push_stream_offers(flow).await?;
                    println!("pushed=true flow={flow}");
                }
                FlowCmd::Diff { flow } => {
                    let diff = sync.compare_with_tracker(flow).await?;
                    println!("{}", serde_json::to_string_pretty(&diff)?);
                }
                FlowCmd::Cancel { flow } => {
                    let n = sync.cancel_changes(flow).await?;
                    println!("cancelled=true flow={flow} streams_resynced={n}");
                }
            }
        }

        Commands::Offer { cmd } => match cmd {
            OfferCmd::Add { flow, offer } => {
                let pool = tdk_db::connect_from_env().await?;
                let cfg = tdk_config::share_config_from_env()?;
                let outcome = tdk_lifecycle::add_offer(&pool, flow, offer, &cfg).await?;
                print_outcome(&outcome)?;
            }
            OfferCmd::Remove { id } => {
                let pool = tdk_db::connect_from_env().await?;
                let cfg = tdk_config::share_config_from_env()?;
                let outcome = tdk_lifecycle::remove_offer(&pool, id, &cfg).await?;
                print_outcome(&outcome)?;
            }
            OfferCmd::Restore { id } => {
                let pool = tdk_db::connect_from_env().await?;
                let cfg = tdk_config::share_config_from_env()?;
                let outcome = tdk_lifecycle::restore_offer(&pool, id, &cfg).await?;
                print_outcome(&outcome)?;
            }
            OfferCmd::Pin { id } => {
                let pool = tdk_db::connect_from_env().await?;
                let cfg = tdk_config::share_config_from_env()?;
                let outcome = tdk_lifecycle::toggle_pin(&pool, id, &cfg).await?;
                print_outcome(&outcome)?;
            }
            OfferCmd::SetShare { id, share, no_pin } => {
                let pool = tdk_db::connect_from_env().await?;
                let cfg = tdk_config::share_config_from_env()?;
                let pin = if no_pin { Some(false) } else { None };
                let outcome = tdk_lifecycle::update_share(&pool, id, share, pin, &cfg).await?;
                print_outcome(&outcome)?;
            }
            OfferCmd::Search { query, limit } => {
                // Sub-two-character queries would match most of the cache;
                // answer them with an empty result before any store lookup.
                let query = query.trim();
                if query.chars().count() < 2 {
                    return Ok(());
                }
                let pool = tdk_db::connect_from_env().await?;
                let mut conn = pool.acquire().await?;
                let offers = tdk_db::offers_autocomplete(&mut conn, query, limit).await?;
                for o in offers {
                    println!("tracker_id={} name={}", o.tracker_id, o.name);
                }
            }
        },

        Commands::Campaign { cmd } => match cmd {
            CampaignCmd::Create { name, geo, offer } => {
                let sync = orchestrator().await?;
                let geo_codes: Vec<String> = geo.split(',').map(|s| s.to_string()).collect();
                let local_id = sync
                    .create_campaign_with_streams(&name, &geo_codes, offer)
                    .await?;
                println!("campaign_created=true local_id={local_id}");
            }
        },

        Commands::Tracker { cmd } => match cmd {
            TrackerCmd::ValidateKey => {
                let cfg = tdk_config::TrackerConfig::from_env()?;
                let client = TrackerClient::new(&cfg)?;
                let ok = client.validate_api_key().await?;
                println!("api_key_valid={ok}");
            }
            TrackerCmd::Report { params } => {
                let params: Value =
                    serde_json::from_str(&params).context("--params must be valid JSON")?;
                let cfg = tdk_config::TrackerConfig::from_env()?;
                let client = TrackerClient::new(&cfg)?;
                let report = client.build_report(&params).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        },
    }

    Ok(())
}
