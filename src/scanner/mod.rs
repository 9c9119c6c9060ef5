pub mod results;
pub mod tcp;

use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{debug, trace, warn};

use crate::cancel::CancelListener;
use crate::validation::{PortRange, Target};
pub use results::{PortState, ProbeResult, ScanReport, StateCounts};
pub use tcp::TcpConnectProber;

pub const DEFAULT_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_CONCURRENCY: usize = 200;
pub const DEFAULT_GRACE_MS: u64 = 1000;

/// Classifies a single port. Implementations own whatever socket they open
/// and must release it before returning.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: IpAddr, port: u16, limit: Duration) -> ProbeResult;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfig {
    /// Upper bound on a single connect attempt.
    pub timeout: Duration,
    /// Maximum number of outstanding probes.
    pub concurrency: usize,
    /// How long in-flight probes may keep running after cancellation.
    pub grace: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            concurrency: DEFAULT_CONCURRENCY,
            grace: Duration::from_millis(DEFAULT_GRACE_MS),
        }
    }
}

pub struct Scanner {
    config: ScanConfig,
    prober: Arc<dyn Prober>,
    progress: ProgressBar,
    open_ports: Option<mpsc::UnboundedSender<u16>>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_prober(config, Arc::new(TcpConnectProber))
    }

    pub fn with_prober(config: ScanConfig, prober: Arc<dyn Prober>) -> Self {
        Self {
            config,
            prober,
            progress: ProgressBar::hidden(),
            open_ports: None,
        }
    }

    /// Send every open port to `tx` as soon as it is classified.
    pub fn with_open_port_sink(mut self, tx: mpsc::UnboundedSender<u16>) -> Self {
        self.open_ports = Some(tx);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Probe every port in `range` on `address`.
    ///
    /// At most `concurrency` probes are in flight at once. Cancellation stops
    /// dispatch, gives running probes `grace` to finish, and abandons the
    /// rest. Whatever was classified by then is returned, sorted by port.
    pub async fn scan(
        &self,
        target: &Target,
        address: IpAddr,
        range: PortRange,
        mut cancel: CancelListener,
    ) -> ScanReport {
        let started_at = Local::now();
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let collected: Arc<Mutex<Vec<ProbeResult>>> =
            Arc::new(Mutex::new(Vec::with_capacity(range.len())));
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        debug!(%address, %range, concurrency, timeout_ms = self.config.timeout.as_millis() as u64, "scan started");

        for port in range.ports() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let prober = Arc::clone(&self.prober);
            let collected = Arc::clone(&collected);
            let pb = self.progress.clone();
            let open_ports = self.open_ports.clone();
            let limit = self.config.timeout;

            tasks.spawn(async move {
                let result = prober.probe(address, port, limit).await;
                drop(permit);

                trace!(port, state = %result.state, "classified");
                if result.state == PortState::Open {
                    if let Some(tx) = &open_ports {
                        let _ = tx.send(port);
                    }
                }
                pb.inc(1);
                lock(&collected).push(result);
            });

            // keep only running probes in the set
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "probe task failed");
                }
            }
        }

        while !cancelled {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => cancelled = true,
                joined = tasks.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => warn!(error = %e, "probe task failed"),
                    None => break,
                },
            }
        }

        if cancelled && !tasks.is_empty() {
            let in_flight = tasks.len();
            let drained = timeout(self.config.grace, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                debug!(in_flight, remaining = tasks.len(), "abandoning probes after grace period");
                tasks.abort_all();
            }
        }

        let mut results = std::mem::take(&mut *lock(&collected));
        results.sort_by_key(|r| r.port);

        // A failed task leaves a gap but is not an interruption.
        let interrupted = cancelled && results.len() < range.len();
        if interrupted {
            self.progress.abandon_with_message("scan interrupted");
        } else {
            self.progress.finish_with_message("scan complete");
        }

        debug!(classified = results.len(), total = range.len(), interrupted, "scan finished");

        ScanReport {
            target: target.clone(),
            resolved_address: address,
            range,
            started_at,
            finished_at: Local::now(),
            interrupted,
            results,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("⟦{spinner:.bright_magenta}⟧ [{elapsed_precise}] ⟨{bar:40.bright_green/bright_black}⟩ {pos}/{len} ports scanned ({eta})")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    pb
}
