// src/main.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use surface_rs_scanner::alerting::{AlertHandler, LogAttackPathSink};
use surface_rs_scanner::config::AppConfig;
use surface_rs_scanner::core::orchestrator::Orchestrator;
use surface_rs_scanner::core::scanner::discovery::DiscoveryEngine;
use surface_rs_scanner::core::scanner::dns_scanner;
use surface_rs_scanner::core::scanner::{Discover, ScanToolkit};
use surface_rs_scanner::jobs::{JobQueue, Scheduler, Worker};
use surface_rs_scanner::logging;
use surface_rs_scanner::storage::{MemoryRepository, Repository};

#[derive(Parser, Debug)]
#[command(name = "surface-rs-scanner", about = "External attack surface scanner", version)]
struct Cli {
    /// path to the JSON config file (falls back to SURFACE_CONFIG, then surface.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// mirror logs to stderr
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue a scan for each registered domain and wait for the results
    Scan {
        #[arg(required = true)]
        domains: Vec<String>,
    },
    /// Run the job worker and the periodic scheduler until Ctrl-C
    Daemon,
    /// Check the ownership TXT record of a domain
    Verify {
        domain: String,
        /// expected token; defaults to the one in the config seed
        token: Option<String>,
    },
    /// Print the assets discovered for a domain without probing them
    Discover { domain: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_path = logging::initialize_logging(cli.log_stderr)?;

    let config = AppConfig::load(cli.config.as_deref())?;
    info!(log = %log_path.display(), "Configuration loaded.");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, shutting down.");
                shutdown.cancel();
            }
        });
    }

    match cli.cmd {
        Command::Scan { domains } => scan(&config, &domains, shutdown).await,
        Command::Daemon => daemon(&config, shutdown).await,
        Command::Verify { domain, token } => {
            verify(&AppConfig::resolve_path(cli.config.as_deref()), &domain, token).await
        }
        Command::Discover { domain } => discover(&config, &domain).await,
    }
}

/// Reduces user input such as `https://example.com/path` to its host name.
fn normalize_target(raw_input: &str) -> String {
    let input_with_scheme = if !raw_input.starts_with("http://") && !raw_input.starts_with("https://") {
        format!("https://{}", raw_input)
    } else {
        raw_input.to_string()
    };
    Url::parse(&input_with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| raw_input.to_string())
        .to_lowercase()
}

async fn build_pipeline(config: &AppConfig) -> Result<(Arc<MemoryRepository>, Arc<Orchestrator>)> {
    let repo = Arc::new(MemoryRepository::from_seed(&config.seed).await);
    let toolkit = ScanToolkit::from_config(config)?;
    let orchestrator = Orchestrator::new(
        repo.clone(),
        toolkit,
        Arc::new(AlertHandler::new(&config.alerting)?),
        Arc::new(LogAttackPathSink),
    )
    .with_delta_key(config.delta_key);
    Ok((repo, Arc::new(orchestrator)))
}

async fn scan(config: &AppConfig, domains: &[String], shutdown: CancellationToken) -> Result<()> {
    let (repo, orchestrator) = build_pipeline(config).await?;
    let queue = Arc::new(JobQueue::new(&config.queue));

    let mut job_ids = Vec::new();
    for raw in domains {
        let name = normalize_target(raw);
        let Some(domain) = repo.domain_by_name(&name).await? else {
            warn!(domain = %name, "Domain is not registered, skipping.");
            continue;
        };
        if !domain.verified {
            warn!(domain = %name, "Domain ownership is not verified, skipping.");
            continue;
        }
        job_ids.push(queue.enqueue(&domain.root_domain, domain.id));
    }
    if job_ids.is_empty() {
        return Err(eyre!("no registered and verified domain to scan"));
    }

    let worker = Worker::new(queue.clone(), orchestrator);
    let worker_shutdown = shutdown.child_token();
    let handle = {
        let worker_shutdown = worker_shutdown.clone();
        tokio::spawn(async move { worker.run(worker_shutdown).await })
    };

    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = poll.tick() => {
                let done = job_ids
                    .iter()
                    .all(|id| queue.get_job(*id).is_none_or(|job| job.status.is_finished()));
                if done {
                    break;
                }
            }
        }
    }
    worker_shutdown.cancel();
    handle.await?;

    let jobs: Vec<_> = job_ids.iter().filter_map(|id| queue.get_job(*id)).collect();
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

async fn daemon(config: &AppConfig, shutdown: CancellationToken) -> Result<()> {
    let (_repo, orchestrator) = build_pipeline(config).await?;
    let queue = Arc::new(JobQueue::new(&config.queue));
    let worker = Worker::new(queue, orchestrator.clone());

    let worker_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    if config.scheduler.enabled {
        let scheduler = Scheduler::new(orchestrator, &config.scheduler);
        scheduler.run(shutdown.clone()).await;
    } else {
        info!("Scheduler disabled.");
        shutdown.cancelled().await;
    }

    worker_task.await?;
    Ok(())
}

/// Checks the ownership TXT record. On success the domain is flagged
/// verified in the seed of the config file, which is where the store is
/// loaded from at startup.
async fn verify(config_path: &Path, raw: &str, token: Option<String>) -> Result<()> {
    let name = normalize_target(raw);
    let mut file_config = AppConfig::read_file(config_path)?;

    let token = match token.or_else(|| file_config.seed.verification_token(&name).map(String::from)) {
        Some(token) => token,
        None => return Err(eyre!("no token given and '{name}' has none in the config seed")),
    };

    let resolver = dns_scanner::build_resolver();
    if !dns_scanner::verify_domain(&resolver, &name, &token).await? {
        println!("{name}: TXT record {}{token} not found", dns_scanner::VERIFICATION_PREFIX);
        return Ok(());
    }

    if file_config.seed.mark_verified(&name) {
        file_config.save(config_path)?;
        info!(domain = %name, path = %config_path.display(), "Domain ownership verified and recorded.");
        println!("{name}: verified, recorded in {}", config_path.display());
    } else {
        println!("{name}: verified (not in the config seed, nothing recorded)");
    }
    Ok(())
}

async fn discover(config: &AppConfig, raw: &str) -> Result<()> {
    let name = normalize_target(raw);
    let engine = DiscoveryEngine::new(config.discovery.clone(), config.probe.cert_policy)?;
    let assets = engine.discover(&name).await?;
    println!("{}", serde_json::to_string_pretty(&assets)?);
    Ok(())
}
