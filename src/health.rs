//! AI backend health monitor
//!
//! Owns the probe loop: an immediate check on spawn, then a periodic timer,
//! with bounded retries per check. Consumers read availability through a
//! watch channel; nothing else writes `ServiceStatus`.
//!
//! Concurrency rule: at most one probe is in flight per monitor, and a
//! forced check supersedes it — a superseded probe's result is discarded,
//! never applied.

use crate::backend::HealthProbe;
use crate::error::AssistantError;
use crate::models::{ServiceState, ServiceStatus};
use crate::retry::{AttemptError, RetryError, RetryPolicy, RetryScheduler};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub service_name: String,
    /// Periodic probe interval while the consuming surface is visible.
    pub interval: Duration,
    /// Retry discipline for a single check.
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            service_name: "ai-backend".to_string(),
            interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

enum Command {
    ForceCheck,
    SetVisible(bool),
}

type ProbeOutcome = Result<crate::backend::ProbeReport, RetryError<AssistantError>>;

/// Handle to the monitor task. Constructed and injected explicitly;
/// cloning shares the same underlying task.
#[derive(Clone)]
pub struct HealthMonitor {
    status_rx: watch::Receiver<ServiceStatus>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    /// Start the monitor task. Probes immediately, then on `interval`.
    pub fn spawn(probe: Arc<dyn HealthProbe>, config: MonitorConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(ServiceStatus::checking(&config.service_name));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let task = MonitorTask {
            probe,
            scheduler: RetryScheduler::new(config.retry.clone()),
            status_tx,
            config,
            visible: true,
            generation: 0,
            probe_cancel: CancellationToken::new(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(task.run(cmd_rx));

        Self {
            status_rx,
            cmd_tx,
            shutdown,
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> ServiceStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch channel for status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    /// Cancel any in-flight probe and start a fresh one now.
    pub fn force_check(&self) {
        // A send failure means the task is stopped; nothing to check.
        let _ = self.cmd_tx.send(Command::ForceCheck);
    }

    /// Pause periodic probing while the consuming surface is hidden;
    /// resuming triggers an immediate forced check.
    pub fn set_visible(&self, visible: bool) {
        let _ = self.cmd_tx.send(Command::SetVisible(visible));
    }

    /// Shut the monitor down. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

struct MonitorTask {
    probe: Arc<dyn HealthProbe>,
    scheduler: RetryScheduler,
    status_tx: watch::Sender<ServiceStatus>,
    config: MonitorConfig,
    visible: bool,
    /// Monotone probe counter; only the newest generation's result applies.
    generation: u64,
    probe_cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl MonitorTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<(u64, ProbeOutcome)>();

        // Immediate probe on construction.
        self.start_probe(&results_tx);

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.probe_cancel.cancel();
                    debug!(service = %self.config.service_name, "health monitor stopped");
                    return;
                }
                _ = ticker.tick(), if self.visible => {
                    self.start_probe(&results_tx);
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::ForceCheck) => self.start_probe(&results_tx),
                    Some(Command::SetVisible(visible)) => {
                        if visible == self.visible {
                            continue;
                        }
                        self.visible = visible;
                        if visible {
                            // Freshness on resume: probe right away.
                            self.start_probe(&results_tx);
                        } else {
                            self.probe_cancel.cancel();
                        }
                    }
                    // Every handle is gone; nobody can read the status or
                    // stop us explicitly, so shut the loop down.
                    None => {
                        self.probe_cancel.cancel();
                        debug!(service = %self.config.service_name, "all monitor handles dropped");
                        return;
                    }
                },
                Some((generation, outcome)) = results_rx.recv() => {
                    self.apply(generation, outcome);
                }
            }
        }
    }

    /// Supersede any in-flight probe and launch a new one.
    fn start_probe(&mut self, results_tx: &mpsc::UnboundedSender<(u64, ProbeOutcome)>) {
        self.probe_cancel.cancel();
        self.probe_cancel = CancellationToken::new();
        self.generation += 1;

        self.status_tx.send_modify(|status| {
            status.state = ServiceState::Checking;
        });

        let generation = self.generation;
        let token = self.probe_cancel.clone();
        let probe = self.probe.clone();
        let scheduler = self.scheduler.clone();
        let results_tx = results_tx.clone();

        tokio::spawn(async move {
            let run = scheduler.run(&token, |attempt| {
                let probe = probe.clone();
                async move {
                    debug!(attempt, "issuing health probe");
                    probe.probe().await.map_err(|e| {
                        if e.is_retryable() {
                            AttemptError::Transient(e)
                        } else {
                            AttemptError::Fatal(e)
                        }
                    })
                }
            });

            tokio::select! {
                outcome = run => {
                    let _ = results_tx.send((generation, outcome));
                }
                _ = token.cancelled() => {
                    let _ = results_tx.send((generation, Err(RetryError::Cancelled)));
                }
            }
        });
    }

    fn apply(&mut self, generation: u64, outcome: ProbeOutcome) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "discarding stale probe result");
            return;
        }

        let service = self.config.service_name.clone();
        match outcome {
            Ok(report) => {
                info!(service = %service, status = %report.status, "backend online");
                self.status_tx.send_replace(ServiceStatus {
                    state: ServiceState::Online,
                    service,
                    models: report.models,
                    last_checked: Some(Utc::now()),
                    error: None,
                });
            }
            Err(RetryError::Cancelled) => {
                // Superseded or paused; the replacing probe owns the status.
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(service = %service, attempts, error = %last, "backend offline");
                self.status_tx.send_modify(|status| {
                    status.state = ServiceState::Offline;
                    status.last_checked = Some(Utc::now());
                    status.error = Some(last.to_string());
                });
            }
            Err(RetryError::Fatal(e)) => {
                warn!(service = %service, error = %e, "backend check failed fatally");
                self.status_tx.send_modify(|status| {
                    status.state = ServiceState::Error;
                    status.last_checked = Some(Utc::now());
                    status.error = Some(e.to_string());
                });
            }
        }
    }
}
