//! Vigil CLI
//!
//! Concurrent threat-intelligence collection across upstream providers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use vigil_core::validators;
use vigil_net::{MemoryCache, NetConfig, RateLimiter, Transport};
use vigil_runtime::{MemoryRepository, Orchestrator};
use vigil_sources::{standard_adapters, SourceKeys};

/// Static per-provider quotas registered up front; server feedback can
/// tighten or relax them at runtime.
const PROVIDER_QUOTAS: &[(&str, u32)] = &[
    ("otx", 60),
    ("xfe", 30),
    ("virustotal", 4),
    ("misp", 60),
    ("threatfox", 60),
    ("abuseipdb", 60),
    ("shodan", 60),
];

#[derive(Parser)]
#[command(name = "vigil")]
#[command(author, version, about = "Vigil: concurrent threat-intelligence collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Args)]
struct KeyArgs {
    /// AlienVault OTX API key
    #[arg(long, env = "VIGIL_OTX_KEY")]
    otx_key: Option<String>,

    /// IBM X-Force Exchange credentials (base64 key:password)
    #[arg(long, env = "VIGIL_XFE_KEY")]
    xfe_key: Option<String>,

    /// VirusTotal API key
    #[arg(long, env = "VIGIL_VIRUSTOTAL_KEY")]
    virustotal_key: Option<String>,

    /// MISP auth key
    #[arg(long, env = "VIGIL_MISP_KEY")]
    misp_key: Option<String>,

    /// AbuseIPDB API key
    #[arg(long, env = "VIGIL_ABUSEIPDB_KEY")]
    abuseipdb_key: Option<String>,

    /// Shodan API key
    #[arg(long, env = "VIGIL_SHODAN_KEY")]
    shodan_key: Option<String>,
}

impl KeyArgs {
    fn into_keys(self) -> SourceKeys {
        SourceKeys {
            otx: self.otx_key,
            xfe: self.xfe_key,
            virustotal: self.virustotal_key,
            misp: self.misp_key,
            abuseipdb: self.abuseipdb_key,
            shodan: self.shodan_key,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Collect indicators from every configured provider
    Collect {
        /// Only collect indicators modified since this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Per-provider deadline in seconds
        #[arg(long, default_value = "120")]
        timeout: u64,

        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Look up a single indicator against one provider
    Search {
        /// Provider identity (see `vigil sources`)
        source: String,

        /// The indicator value to look up
        query: String,

        /// Lookup deadline in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,

        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Classify a raw indicator value
    Check {
        /// The value to classify
        value: String,
    },

    /// List the registered provider identities
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Collect {
            since,
            timeout,
            keys,
        } => {
            let since = since.map(|raw| parse_since(&raw)).transpose()?;
            run_collect(keys.into_keys(), since, timeout).await?;
        }
        Commands::Search {
            source,
            query,
            timeout,
            keys,
        } => {
            run_search(keys.into_keys(), &source, &query, timeout).await?;
        }
        Commands::Check { value } => {
            check_value(&value);
        }
        Commands::Sources => {
            let (orchestrator, _) = build_orchestrator(SourceKeys::default(), 60);
            for source in orchestrator.sources() {
                println!("{source}");
            }
        }
    }

    Ok(())
}

fn build_orchestrator(keys: SourceKeys, timeout_secs: u64) -> (Orchestrator, Arc<MemoryRepository>) {
    let config = NetConfig::from_env();
    let limiter = Arc::new(RateLimiter::from_config(&config));
    for (source, per_minute) in PROVIDER_QUOTAS {
        limiter.register(source, *per_minute, None);
    }

    let transport = Arc::new(Transport::new(
        config,
        limiter,
        Arc::new(MemoryCache::new()),
    ));
    let repository = Arc::new(MemoryRepository::new());

    let mut orchestrator = Orchestrator::new(
        repository.clone(),
        Duration::from_secs(timeout_secs),
    );
    orchestrator.register_all(standard_adapters(&transport, &keys));
    (orchestrator, repository)
}

async fn run_collect(keys: SourceKeys, since: Option<DateTime<Utc>>, timeout: u64) -> Result<()> {
    let (orchestrator, repository) = build_orchestrator(keys, timeout);

    println!("📡 Collecting from {} providers...", orchestrator.sources().len());
    let inserted = orchestrator.collect_since(since).await;

    println!("✅ Sweep complete: {inserted} new indicators ({} total)", repository.len());
    Ok(())
}

async fn run_search(keys: SourceKeys, source: &str, query: &str, timeout: u64) -> Result<()> {
    let (orchestrator, _) = build_orchestrator(keys, timeout);

    let results = orchestrator.search(source, query).await?;
    if results.is_empty() {
        println!("No results from {source} for {query}");
    } else {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

fn check_value(value: &str) {
    match validators::identify(value) {
        Some(kind) => {
            println!("kind: {kind}");
            println!("normalized: {}", validators::normalize(&kind, value));
        }
        None => println!("unrecognized indicator value"),
    }
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("cannot parse timestamp: {raw}"))?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("cannot parse timestamp: {raw}"))?;
    Ok(Utc.from_utc_datetime(&naive))
}
