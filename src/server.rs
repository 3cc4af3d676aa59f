//!
//! ferry server
//! ------------
//! Startup wiring and the accept loop. `run` reads the environment
//! configuration, constructs the chosen storage backend and metrics sink,
//! and serves on the configured port; `serve` is the reusable core over a
//! pre-bound listener (tests drive it on an ephemeral port).
//!
//! All cross-session state lives in one explicitly constructed
//! [`ServerContext`] handed to every worker: the injected backend, the
//! connection registry, the metrics sink and the cooperative shutdown flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::{BackendConfig, Config};
use crate::metrics::MetricsSink;
use crate::registry::Registry;
use crate::session::TransferSession;
use crate::storage::{LocalStore, S3Store, StorageBackend};

/// Accept-side poll interval so the shutdown flag is observed promptly.
const ACCEPT_POLL: Duration = Duration::from_secs(1);

pub struct ServerContext {
    pub backend: Arc<dyn StorageBackend>,
    pub registry: Arc<Registry>,
    pub metrics: MetricsSink,
    shutdown: AtomicBool,
}

impl ServerContext {
    pub fn new(backend: Arc<dyn StorageBackend>, metrics: MetricsSink) -> Arc<Self> {
        Arc::new(Self {
            backend,
            registry: Registry::new(metrics.clone()),
            metrics,
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!(target: "ferry::server", "shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Build everything from the environment and serve until ctrl-c.
pub async fn run() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    let (backend, metrics): (Arc<dyn StorageBackend>, MetricsSink) = match &cfg.backend {
        BackendConfig::Local { data_dir } => {
            let store = LocalStore::new(data_dir)
                .with_context(|| format!("failed to open data dir {}", data_dir.display()))?;
            (Arc::new(store), MetricsSink::disabled())
        }
        BackendConfig::S3 { bucket, region, endpoint, staging_dir } => {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region.clone()));
            }
            let sdk_config = loader.load().await;
            let store = S3Store::new(&sdk_config, bucket, endpoint.as_deref(), staging_dir)
                .with_context(|| format!("failed to initialize S3 backend for bucket {}", bucket))?;
            let metrics = MetricsSink::cloudwatch(&sdk_config, cfg.metrics_namespace.clone());
            (Arc::new(store), metrics)
        }
    };

    let ctx = ServerContext::new(backend, metrics);
    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(target: "ferry::server", "listening on {} [{}]", addr, cfg.mode());

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.request_shutdown();
            }
        });
    }

    serve(listener, ctx).await
}

/// Accept loop: register each connection, spawn its session worker, and on
/// shutdown stop accepting, force-close everything registered and drain.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    let mut workers: JoinSet<()> = JoinSet::new();
    loop {
        if ctx.is_shutdown() {
            break;
        }
        while workers.try_join_next().is_some() {}
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                error!(target: "ferry::server", "accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(Ok((stream, peer))) => {
                let guard = ctx.registry.register(peer);
                let id = guard.id();
                let session_ctx = ctx.clone();
                let abort = workers.spawn(async move {
                    let _guard = guard;
                    TransferSession::new(stream, peer, session_ctx).run().await;
                });
                ctx.registry.arm(id, abort);
            }
        }
    }

    info!(
        target: "ferry::server",
        "stopped accepting; closing {} live session(s)",
        ctx.registry.count()
    );
    ctx.registry.close_all();
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                warn!(target: "ferry::server", "session worker failed: {}", e);
            }
        }
    }
    Ok(())
}
