//! Fleet Scheduler
//!
//! Two independent interval loops:
//! - classification sweep over every non-recovered net
//! - drift sweep over every suspected or confirmed net
//!
//! Each sweep fans out one task per net, bounded by a semaphore, and
//! collects a `NetOutcome` per net over an mpsc channel. A failing net is
//! recorded and never stops the rest of the sweep. A loop never overlaps
//! itself: ticks that fire while a sweep is still running are dropped.
//!
//! On cancellation, queued nets are abandoned immediately and in-flight nets
//! get `shutdown_grace` to finish before their tasks are aborted.

mod report;

pub use report::{NetOutcome, NetResult, SweepKind, SweepReport};

use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::JobsConfig;
use crate::error::CoreError;
use crate::service::GhostNetService;
use crate::types::Net;

pub struct FleetScheduler {
    service: Arc<GhostNetService>,
    jobs: JobsConfig,
    cancel: CancellationToken,
}

impl FleetScheduler {
    /// `cancel` should be the token the service's orchestrator was built
    /// with, so a shutdown also interrupts oracle backoff.
    pub fn new(service: Arc<GhostNetService>, jobs: JobsConfig, cancel: CancellationToken) -> Self {
        Self { service, jobs, cancel }
    }

    /// Drive both sweep loops until cancelled.
    pub async fn run(&self) {
        info!(
            classification_interval_ms = self.jobs.batch_processing_interval_ms,
            drift_interval_ms = self.jobs.drift_prediction_interval_ms,
            max_parallelism = self.jobs.max_parallelism,
            "Fleet scheduler started"
        );

        tokio::join!(
            self.sweep_loop(SweepKind::Classification, self.jobs.classification_interval()),
            self.sweep_loop(SweepKind::Drift, self.jobs.drift_interval()),
        );

        info!("Fleet scheduler stopped");
    }

    async fn sweep_loop(&self, kind: SweepKind, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let result = match kind {
                SweepKind::Classification => self.classification_sweep().await,
                SweepKind::Drift => self.drift_sweep().await,
            };
            if let Err(e) = result {
                error!(sweep = %kind, error = %e, "Sweep could not start");
            }
        }
    }

    /// Classify every net that is not recovered.
    pub async fn classification_sweep(&self) -> Result<SweepReport, CoreError> {
        let nets = self.eligible(|net| !net.status.is_terminal()).await?;
        let report = self
            .fan_out(SweepKind::Classification, nets, |service, net_id| async move {
                NetResult::from_classification(service.run_classification(&net_id).await)
            })
            .await;

        info!(
            nets = report.outcomes.len(),
            transitioned = report.transitioned(),
            skipped = report.skipped(),
            degraded = report.degraded(),
            failed = report.failed(),
            abandoned = report.abandoned(),
            "Classification sweep complete"
        );
        Ok(report)
    }

    /// Forecast drift for every suspected or confirmed net.
    pub async fn drift_sweep(&self) -> Result<SweepReport, CoreError> {
        let nets = self.eligible(|net| net.status.is_anomalous()).await?;
        let report = self
            .fan_out(SweepKind::Drift, nets, |service, net_id| async move {
                NetResult::from_drift(service.run_drift_forecast(&net_id).await)
            })
            .await;

        info!(
            nets = report.outcomes.len(),
            forecasted = report.forecasted(),
            degraded = report.degraded(),
            failed = report.failed(),
            abandoned = report.abandoned(),
            "Drift sweep complete"
        );
        Ok(report)
    }

    async fn eligible(&self, keep: impl Fn(&Net) -> bool) -> Result<Vec<String>, CoreError> {
        Ok(self
            .service
            .list_nets()
            .await?
            .into_iter()
            .filter(|net| keep(net))
            .map(|net| net.net_id)
            .collect())
    }

    async fn fan_out<F, Fut>(&self, kind: SweepKind, net_ids: Vec<String>, work: F) -> SweepReport
    where
        F: Fn(Arc<GhostNetService>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NetResult> + Send + 'static,
    {
        let started_at = Utc::now();
        let work = Arc::new(work);
        let semaphore = Arc::new(Semaphore::new(self.jobs.max_parallelism.max(1)));
        let (tx, mut rx) = mpsc::channel::<NetOutcome>(net_ids.len().max(1));
        let mut tasks = JoinSet::new();

        for net_id in &net_ids {
            let net_id = net_id.clone();
            let semaphore = Arc::clone(&semaphore);
            let service = Arc::clone(&self.service);
            let work = Arc::clone(&work);
            let cancel = self.cancel.clone();
            let tx = tx.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    permit = semaphore.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else { return };

                let result = work(service, net_id.clone()).await;
                debug!(sweep = %kind, net_id = %net_id, ?result, "Net processed");
                if let NetResult::Failed { reason } = &result {
                    warn!(sweep = %kind, net_id = %net_id, error = %reason, "Net failed, continuing sweep");
                }
                let _ = tx.send(NetOutcome { net_id, result }).await;
            });
        }
        drop(tx);

        let grace = self.jobs.shutdown_grace();
        let cancel = self.cancel.clone();
        let deadline = async move {
            cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        };
        tokio::pin!(deadline);

        let mut aborted = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Err(e)) if e.is_panic() => {
                        error!(sweep = %kind, error = %e, "Net task panicked");
                    }
                    Some(_) => {}
                },
                () = &mut deadline, if !aborted => {
                    warn!(sweep = %kind, remaining = tasks.len(), "Shutdown grace period elapsed, abandoning in-flight nets");
                    tasks.abort_all();
                    aborted = true;
                }
            }
        }

        let mut outcomes = Vec::with_capacity(net_ids.len());
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        let reported: HashSet<String> = outcomes.iter().map(|o| o.net_id.clone()).collect();
        outcomes.extend(
            net_ids
                .into_iter()
                .filter(|id| !reported.contains(id))
                .map(|net_id| NetOutcome { net_id, result: NetResult::Abandoned }),
        );
        outcomes.sort_by(|a, b| a.net_id.cmp(&b.net_id));

        SweepReport {
            kind,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            cancelled: self.cancel.is_cancelled(),
        }
    }
}
