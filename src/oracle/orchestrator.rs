//! Classification Orchestrator
//!
//! Wraps the oracle with the retry policy and guarantees at most one
//! outstanding classification per net: a second caller for a net that is
//! already being classified joins the outstanding call and receives the
//! same result instead of issuing its own.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{call_with_retry, ClassificationError, OracleError, OracleRequest, PredictionOracle, RetryPolicy};
use crate::config::OracleConfig;
use crate::features::FeatureVector;
use crate::types::Prediction;

type InFlight = Shared<BoxFuture<'static, Result<Prediction, ClassificationError>>>;

pub struct ClassificationOrchestrator {
    oracle: Arc<dyn PredictionOracle>,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
    in_flight: DashMap<String, InFlight>,
}

impl ClassificationOrchestrator {
    pub fn new(oracle: Arc<dyn PredictionOracle>, config: &OracleConfig, cancel: CancellationToken) -> Self {
        Self::with_policy(oracle, RetryPolicy::from_config(config), config.timeout(), cancel)
    }

    pub fn with_policy(
        oracle: Arc<dyn PredictionOracle>,
        policy: RetryPolicy,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            oracle,
            policy,
            timeout,
            cancel,
            in_flight: DashMap::new(),
        }
    }

    pub fn oracle(&self) -> &Arc<dyn PredictionOracle> {
        &self.oracle
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Nets with a classification currently outstanding
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Classify one feature vector.
    ///
    /// The returned `Prediction` is not yet persisted.
    pub async fn classify(&self, features: FeatureVector) -> Result<Prediction, ClassificationError> {
        let net_id = features.net_id.clone();

        let call = match self.in_flight.entry(net_id.clone()) {
            Entry::Occupied(existing) => {
                debug!(net_id = %net_id, "Joining outstanding classification");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let call = self.start_call(features);
                slot.insert(call.clone());
                call
            }
        };

        // Released on drop so an aborted caller cannot leave a stale slot
        let _slot = SlotGuard {
            in_flight: &self.in_flight,
            net_id,
            call: call.clone(),
        };
        call.await
    }

    fn start_call(&self, features: FeatureVector) -> InFlight {
        let oracle = Arc::clone(&self.oracle);
        let policy = self.policy.clone();
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let request = OracleRequest::from(features);

        async move {
            let response = call_with_retry(&policy, timeout, &cancel, &request.net_id, || {
                oracle.predict(&request)
            })
            .await?;

            if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
                return Err(ClassificationError::Rejected(OracleError::InvalidResponse(format!(
                    "confidence {} outside [0, 1]",
                    response.confidence
                ))));
            }

            let mut prediction = Prediction::new(request.net_id.as_str(), response.confidence, response.label);
            prediction.horizon_forecasts = response.horizon_forecasts;
            debug!(
                net_id = %prediction.net_id,
                confidence = prediction.confidence,
                label = %prediction.label,
                "Oracle classification received"
            );
            Ok(prediction)
        }
        .boxed()
        .shared()
    }
}

/// Frees the in-flight slot for a net, but only if it still holds `call`.
struct SlotGuard<'a> {
    in_flight: &'a DashMap<String, InFlight>,
    net_id: String,
    call: InFlight,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.net_id, |_, current| current.ptr_eq(&self.call));
    }
}
