//! Liveness and readiness of supervised services
//!
//! Liveness is a non-blocking exit-status poll of the child process.
//! Readiness is a TCP connect against the address the service is expected to
//! listen on, repeated until it succeeds or a deadline passes.

use crate::dependency::manager::ServiceAddress;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Liveness of a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessHealth {
    Running,
    /// Exited on its own; `None` when killed by a signal
    Exited(Option<i32>),
    Unknown,
}

impl ProcessHealth {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessHealth::Running)
    }
}

/// Answers whether a service accepts connections yet
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self, address: &ServiceAddress) -> bool;
}

/// Readiness by plain TCP connect
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn is_ready(&self, address: &ServiceAddress) -> bool {
        let target = (address.host.as_str(), address.port);
        match timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(%address, error = %e, "Readiness probe refused");
                false
            }
            Err(_) => {
                debug!(
                    %address,
                    timeout_ms = self.connect_timeout.as_millis(),
                    "Readiness probe timed out"
                );
                false
            }
        }
    }
}

/// Poll `probe` every `interval` until ready. Returns the time waited, or
/// `None` once `deadline` has elapsed without success.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    address: &ServiceAddress,
    interval: Duration,
    deadline: Duration,
) -> Option<Duration> {
    info!(
        %address,
        timeout_secs = deadline.as_secs(),
        "Waiting for service to accept connections"
    );

    let start_time = Instant::now();
    loop {
        if probe.is_ready(address).await {
            let elapsed = start_time.elapsed();
            info!(%address, elapsed_ms = elapsed.as_millis(), "Service is ready");
            return Some(elapsed);
        }

        if start_time.elapsed() + interval > deadline {
            warn!(%address, timeout_ms = deadline.as_millis(), "Service never became ready");
            return None;
        }

        tokio::time::sleep(interval).await;
    }
}
