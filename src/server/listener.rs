use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::GatewayError;
use crate::http::connection::Connection;
use crate::proxy::instance::InstanceManager;
use crate::proxy::pipeline::Pipeline;
use crate::proxy::resolver::{DomainResolver, SuffixDomainResolver};
use crate::stats::{StatsCounter, StatsReporter, StatsSnapshot};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    reporter_task: JoinHandle<()>,
}

/// Accepts client connections and runs each one through the pipeline.
pub struct GatewayServer {
    pipeline: Arc<Pipeline>,
    stats: Arc<StatsCounter>,
    reporter: StatsReporter,
    running: Option<Running>,
}

impl GatewayServer {
    pub fn new(config: &Config, manager: Arc<dyn InstanceManager>) -> Self {
        Self::with_domain_resolver(config, manager, Arc::new(SuffixDomainResolver))
    }

    pub fn with_domain_resolver(
        config: &Config,
        manager: Arc<dyn InstanceManager>,
        domains: Arc<dyn DomainResolver>,
    ) -> Self {
        let stats = Arc::new(StatsCounter::new());
        let pipeline = Pipeline::from_config(config, manager, domains, stats.clone());
        let reporter = StatsReporter::new(stats.clone(), config.stats.interval());

        Self {
            pipeline: Arc::new(pipeline),
            stats,
            reporter,
            running: None,
        }
    }

    pub fn stats(&self) -> Arc<StatsCounter> {
        self.stats.clone()
    }

    /// Receives one [`StatsSnapshot`] per sampling interval.
    pub fn subscribe_stats(&self) -> broadcast::Receiver<StatsSnapshot> {
        self.reporter.subscribe()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Binds `addr` and starts accepting connections in the background.
    pub async fn listen(&mut self, addr: &str) -> Result<SocketAddr, GatewayError> {
        if let Some(running) = &self.running {
            return Err(GatewayError::AlreadyListening(running.local_addr));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        info!("Listening on {}", local_addr);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let reporter_task = self.reporter.spawn(shutdown_rx.clone());
        let accept_task = tokio::spawn(accept_loop(listener, self.pipeline.clone(), shutdown_rx));

        self.running = Some(Running {
            local_addr,
            shutdown,
            accept_task,
            reporter_task,
        });

        Ok(local_addr)
    }

    /// Stops accepting connections and stops the stats reporter.
    ///
    /// Connections already accepted keep running until their exchange ends.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.accept_task.await {
            tracing::warn!(error = %e, "Accept loop ended abnormally");
        }
        if let Err(e) = running.reporter_task.await {
            tracing::warn!(error = %e, "Stats reporter ended abnormally");
        }

        info!("Stopped listening on {}", running.local_addr);
    }
}

async fn accept_loop(listener: TcpListener, pipeline: Arc<Pipeline>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            res = listener.accept() => {
                let (socket, peer) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                tracing::debug!("Accepted connection from {}", peer);

                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let mut conn = Connection::new(socket, peer, pipeline);
                    if let Err(e) = conn.run().await {
                        tracing::debug!("Connection error from {}: {}", peer, e);
                    }
                });
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
