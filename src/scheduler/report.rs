//! Per-net results and sweep summaries

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::drift::{DriftError, DriftOutcome};
use crate::error::CoreError;
use crate::lifecycle::TransitionOutcome;
use crate::oracle::ClassificationError;
use crate::service::ClassificationOutcome;
use crate::types::NetStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    Classification,
    Drift,
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classification => "classification",
            Self::Drift => "drift",
        })
    }
}

/// What happened to one net during a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NetResult {
    Transitioned { from: NetStatus, to: NetStatus },
    Unchanged,
    /// Lost a status race (usually to a recovery)
    Discarded { actual: NetStatus },
    InsufficientData { found: usize },
    Forecasted { horizons: usize },
    Skipped { status: NetStatus },
    /// Oracle retries exhausted; no fresh information this cycle
    Degraded { reason: String },
    Failed { reason: String },
    /// Never started, or cut off at the end of the shutdown grace period
    Abandoned,
}

impl NetResult {
    pub fn from_classification(result: Result<ClassificationOutcome, CoreError>) -> Self {
        match result {
            Ok(ClassificationOutcome::Skipped { status }) => Self::Skipped { status },
            Ok(ClassificationOutcome::InsufficientData { found, .. }) => Self::InsufficientData { found },
            Ok(ClassificationOutcome::Classified { transition, .. }) => match transition {
                TransitionOutcome::Transitioned(t) => Self::Transitioned { from: t.previous, to: t.new },
                TransitionOutcome::Unchanged(_) => Self::Unchanged,
                TransitionOutcome::Discarded { actual, .. } => Self::Discarded { actual },
            },
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_drift(result: Result<DriftOutcome, CoreError>) -> Self {
        match result {
            Ok(DriftOutcome::Forecasted { horizons, .. }) => Self::Forecasted { horizons: horizons.len() },
            Ok(DriftOutcome::Skipped { status }) => Self::Skipped { status },
            Err(e) => Self::from_error(&e),
        }
    }

    fn from_error(e: &CoreError) -> Self {
        match e {
            CoreError::Classification(ClassificationError::Cancelled)
            | CoreError::Drift(DriftError::Oracle(ClassificationError::Cancelled)) => Self::Abandoned,
            e if e.is_degraded() => Self::Degraded { reason: e.to_string() },
            e => Self::Failed { reason: e.to_string() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetOutcome {
    pub net_id: String,
    #[serde(flatten)]
    pub result: NetResult,
}

/// Summary of one sweep over the fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub kind: SweepKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<NetOutcome>,
    /// Sweep was cut short by cancellation
    pub cancelled: bool,
}

impl SweepReport {
    pub fn empty(kind: SweepKind) -> Self {
        let now = Utc::now();
        Self {
            kind,
            started_at: now,
            finished_at: now,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn outcome(&self, net_id: &str) -> Option<&NetResult> {
        self.outcomes.iter().find(|o| o.net_id == net_id).map(|o| &o.result)
    }

    fn count(&self, pred: impl Fn(&NetResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }

    pub fn transitioned(&self) -> usize {
        self.count(|r| matches!(r, NetResult::Transitioned { .. }))
    }

    pub fn forecasted(&self) -> usize {
        self.count(|r| matches!(r, NetResult::Forecasted { .. }))
    }

    pub fn degraded(&self) -> usize {
        self.count(|r| matches!(r, NetResult::Degraded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, NetResult::Failed { .. }))
    }

    pub fn abandoned(&self) -> usize {
        self.count(|r| matches!(r, NetResult::Abandoned))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, NetResult::Skipped { .. } | NetResult::InsufficientData { .. }))
    }
}
