// # provisiond - Domain Provisioning Daemon
//
// Thin integration layer: all provisioning logic lives in provision-core,
// all HTTP plumbing in provision-http.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Constructing the job store and service clients once
// 4. Running the job intake, the worker pool and the sweeper until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Intake
// - `PROVISION_LISTEN_ADDR`: Address of the HTTP job intake (default 127.0.0.1:8080)
//
// ### Job Store
// - `PROVISION_STORE_TYPE`: file (default) or memory
// - `PROVISION_STORE_PATH`: Path to the job file (for file store)
// - `PROVISION_VISIBILITY_TIMEOUT_SECS`: Lease length of a dequeued job
//
// ### Workers
// - `PROVISION_WORKERS`: Number of concurrent workers
// - `PROVISION_MAX_ATTEMPTS`: Attempt budget given to each submitted job
// - `PROVISION_BASE_DELAY_MS`: First retry delay
// - `PROVISION_SETTLE_DELAY_SECS`: Wait before verification reads
// - `PROVISION_CALL_TIMEOUT_SECS`: Bound on every external call
// - `PROVISION_DOMAIN_LOCK_TTL_SECS`: Purchase lock lifetime, longer than the call timeout
// - `PROVISION_NAME_SERVERS`: Comma-separated name servers for NS records
//
// ### Housekeeping
// - `PROVISION_RETENTION_SECS`: Age after which terminal jobs are removed
// - `PROVISION_SWEEP_INTERVAL_SECS`: How often the sweeper runs
//
// ### External Services
// - `PROVISION_REGISTRAR_URL` / `PROVISION_REGISTRAR_TOKEN`
// - `PROVISION_DNS_URL` / `PROVISION_DNS_TOKEN`
// - `PROVISION_TRIGGER_URL` / `PROVISION_TRIGGER_TOKEN`
//
// ## Example
//
// ```bash
// export PROVISION_STORE_PATH=/var/lib/provision/jobs.json
// export PROVISION_REGISTRAR_URL=https://registrar.internal
// export PROVISION_REGISTRAR_TOKEN=...
// export PROVISION_DNS_URL=https://dns.internal
// export PROVISION_DNS_TOKEN=...
// export PROVISION_TRIGGER_URL=https://build.internal/hooks/domain
// export PROVISION_NAME_SERVERS=ns1.example.net,ns2.example.net
//
// provisiond
//
// curl -X POST localhost:8080/v1/jobs -H 'content-type: application/json' \
//   -d '{"domain":"example.com","serverIp":"203.0.113.5","projectId":"project-1"}'
// ```

mod intake;

use anyhow::Result;
use provision_core::config::{EndpointConfig, ProvisionConfig, StoreConfig};
use provision_core::traits::JobStore;
use provision_core::{
    FileJobStore, JobSubmitter, MemoryJobStore, ProvisioningWorker, RetryPolicy, Sweeper,
    WorkerEvent, WorkerPool, WorkerSettings,
};
use provision_http::HttpClients;
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ProvisionExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ProvisionExitCode> for ExitCode {
    fn from(code: ProvisionExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    provision: ProvisionConfig,
    listen_addr: SocketAddr,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (the environment in production)
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut provision = ProvisionConfig::default();

        let store_type = lookup("PROVISION_STORE_TYPE").unwrap_or_else(|| "file".to_string());
        provision.store = match store_type.as_str() {
            "file" => StoreConfig::File {
                path: lookup("PROVISION_STORE_PATH").unwrap_or_default(),
            },
            "memory" => StoreConfig::Memory,
            other => anyhow::bail!(
                "PROVISION_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        };

        provision.queue.visibility_timeout_secs = parse_var(
            &lookup,
            "PROVISION_VISIBILITY_TIMEOUT_SECS",
            provision.queue.visibility_timeout_secs,
        )?;
        provision.worker.concurrency =
            parse_var(&lookup, "PROVISION_WORKERS", provision.worker.concurrency)?;
        provision.retry.max_attempts = parse_var(
            &lookup,
            "PROVISION_MAX_ATTEMPTS",
            provision.retry.max_attempts,
        )?;
        provision.retry.base_delay_ms = parse_var(
            &lookup,
            "PROVISION_BASE_DELAY_MS",
            provision.retry.base_delay_ms,
        )?;
        provision.worker.settle_delay_secs = parse_var(
            &lookup,
            "PROVISION_SETTLE_DELAY_SECS",
            provision.worker.settle_delay_secs,
        )?;
        provision.worker.call_timeout_secs = parse_var(
            &lookup,
            "PROVISION_CALL_TIMEOUT_SECS",
            provision.worker.call_timeout_secs,
        )?;
        provision.worker.domain_lock_ttl_secs = parse_var(
            &lookup,
            "PROVISION_DOMAIN_LOCK_TTL_SECS",
            provision.worker.domain_lock_ttl_secs,
        )?;
        if let Some(name_servers) = lookup("PROVISION_NAME_SERVERS") {
            provision.worker.name_servers = name_servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        provision.sweeper.retention_secs = parse_var(
            &lookup,
            "PROVISION_RETENTION_SECS",
            provision.sweeper.retention_secs,
        )?;
        provision.sweeper.interval_secs = parse_var(
            &lookup,
            "PROVISION_SWEEP_INTERVAL_SECS",
            provision.sweeper.interval_secs,
        )?;

        provision.registrar = endpoint(&lookup, "PROVISION_REGISTRAR");
        provision.dns = endpoint(&lookup, "PROVISION_DNS");
        provision.trigger = endpoint(&lookup, "PROVISION_TRIGGER");

        Ok(Self {
            provision,
            listen_addr: parse_var(
                &lookup,
                "PROVISION_LISTEN_ADDR",
                SocketAddr::from(([127, 0, 0, 1], 8080)),
            )?,
            log_level: lookup("PROVISION_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if let StoreConfig::File { path } = &self.provision.store
            && path.is_empty()
        {
            anyhow::bail!(
                "PROVISION_STORE_PATH is required when PROVISION_STORE_TYPE=file. \
                Set it via: export PROVISION_STORE_PATH=/var/lib/provision/jobs.json"
            );
        }

        for (name, endpoint) in [
            ("PROVISION_REGISTRAR_URL", &self.provision.registrar),
            ("PROVISION_DNS_URL", &self.provision.dns),
            ("PROVISION_TRIGGER_URL", &self.provision.trigger),
        ] {
            if !endpoint.is_configured() {
                anyhow::bail!("{} is required", name);
            }
            if endpoint.base_url.starts_with("http://") {
                eprintln!(
                    "WARNING: {} uses HTTP (not HTTPS). Tokens are sent in clear text.",
                    name
                );
            }
        }

        if self.provision.worker.name_servers.is_empty() {
            anyhow::bail!(
                "PROVISION_NAME_SERVERS must contain at least one name server. \
                Set it via: export PROVISION_NAME_SERVERS=ns1.example.net,ns2.example.net"
            );
        }

        self.provision
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PROVISION_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Longest a graceful shutdown may take
    ///
    /// Workers finish their current delivery, which may be a full
    /// verification pass.
    fn drain_timeout(&self) -> Duration {
        let worker = &self.provision.worker;
        let rounds = u64::from(worker.verify_rounds);
        Duration::from_secs(
            worker.settle_delay_secs * rounds + worker.call_timeout_secs * (rounds + 3) + 5,
        )
    }
}

/// Parse an optional numeric variable, keeping `default` when it is unset
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} '{}' is not valid: {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Read `<PREFIX>_URL` and `<PREFIX>_TOKEN`
fn endpoint(lookup: &impl Fn(&str) -> Option<String>, prefix: &str) -> EndpointConfig {
    let mut endpoint =
        EndpointConfig::new(lookup(&format!("{}_URL", prefix)).unwrap_or_default());
    endpoint.api_token = lookup(&format!("{}_TOKEN", prefix));
    endpoint
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ProvisionExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ProvisionExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ProvisionExitCode::ConfigError.into();
    }

    info!("Starting provisiond daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ProvisionExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            ProvisionExitCode::RuntimeError
        } else {
            ProvisionExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let drain_timeout = config.drain_timeout();
    let listen_addr = config.listen_addr;
    let provision = config.provision;

    let store: Arc<dyn JobStore> = match &provision.store {
        StoreConfig::File { path } => {
            info!("Using file job store at {}", path);
            Arc::new(
                FileJobStore::with_visibility_timeout(path, provision.queue.visibility_timeout())
                    .await?,
            )
        }
        StoreConfig::Memory => {
            warn!("Using in-memory job store: jobs are lost on restart");
            Arc::new(MemoryJobStore::with_visibility_timeout(
                provision.queue.visibility_timeout(),
            ))
        }
    };

    let clients = HttpClients::from_config(&provision)?;
    debug!("Service clients: {:?}", clients);

    let (worker, mut events) = ProvisioningWorker::new(
        store.clone(),
        clients.registrar,
        clients.dns,
        clients.trigger,
        RetryPolicy::from_config(&provision.retry),
        WorkerSettings::from_config(&provision),
    );

    let event_log = tokio::spawn(async move {
        let (mut completed, mut failed) = (0usize, 0usize);
        while let Some(event) = events.recv().await {
            match &event {
                WorkerEvent::JobCompleted { .. } => completed += 1,
                WorkerEvent::JobFailed { .. } => failed += 1,
                _ => {}
            }
            debug!("Worker event: {:?}", event);
        }
        (completed, failed)
    });

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind intake on {}: {}", listen_addr, e))?;
    let submitter = Arc::new(JobSubmitter::new(
        store.clone(),
        provision.retry.max_attempts,
    ));

    let pool = WorkerPool::start(Arc::new(worker), provision.worker.concurrency);
    let sweeper = Sweeper::from_config(store.clone(), &provision.sweeper);
    let sweeper_shutdown = pool.subscribe_shutdown();
    let sweeper_task = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let mut intake_shutdown = pool.subscribe_shutdown();
    let intake_task = tokio::spawn(async move {
        axum::serve(listener, intake::router(submitter))
            .with_graceful_shutdown(async move {
                let _ = intake_shutdown.recv().await;
            })
            .await
    });

    info!(
        "Daemon initialized: {} worker(s), {} store, intake on {}",
        pool.size(),
        provision.store.type_name(),
        listen_addr
    );

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    let drained = tokio::time::timeout(drain_timeout, async {
        pool.shutdown().await;
        if let Err(e) = sweeper_task.await {
            warn!("Sweeper task ended abnormally: {}", e);
        }
        match intake_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Intake server failed: {}", e),
            Err(e) => warn!("Intake task ended abnormally: {}", e),
        }
    })
    .await;

    if drained.is_err() {
        // In-flight deliveries are redelivered once their lease expires
        anyhow::bail!("Shutdown timeout after {:?}", drain_timeout);
    }

    match event_log.await {
        Ok((completed, failed)) => {
            info!("Jobs finished this run: {} completed, {} failed", completed, failed)
        }
        Err(e) => warn!("Event log task ended abnormally: {}", e),
    }

    store.flush().await?;
    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
