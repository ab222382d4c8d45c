//! In-memory telemetry store for tests and minimal deployments
//!
//! Thread-safe via `RwLock`. Not durable: data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{CasOutcome, StoreError, TelemetryStore};
use crate::types::{
    Alert, AppendOutcome, HorizonForecast, Net, NetStatus, Ping, PingSource, Prediction,
    RecoveryRecord,
};

/// Per-net ping log keyed by `Ping::dedup_key`, which also gives
/// timestamp order.
type PingLog = BTreeMap<(i64, PingSource), Ping>;

/// In-memory store
#[derive(Default)]
pub struct InMemoryStore {
    nets: RwLock<HashMap<String, Net>>,
    pings: RwLock<HashMap<String, PingLog>>,
    predictions: RwLock<Vec<Prediction>>,
    alerts: RwLock<Vec<Alert>>,
    recoveries: RwLock<HashMap<String, RecoveryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total predictions ever saved (all nets)
    pub fn prediction_count(&self) -> usize {
        self.predictions.read().map(|p| p.len()).unwrap_or(0)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|e| StoreError::Storage(e.to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|e| StoreError::Storage(e.to_string()))
}

#[async_trait]
impl TelemetryStore for InMemoryStore {
    async fn append_ping(&self, ping: &Ping) -> Result<AppendOutcome, StoreError> {
        {
            let mut pings = write(&self.pings)?;
            let log = pings.entry(ping.net_id.clone()).or_default();
            let key = ping.dedup_key();
            if log.contains_key(&key) {
                return Ok(AppendOutcome::Duplicate);
            }
            log.insert(key, ping.clone());
        }

        let mut nets = write(&self.nets)?;
        if let Some(net) = nets.get_mut(&ping.net_id) {
            if net.last_ping_at.map_or(true, |last| ping.timestamp > last) {
                net.last_known_location = Some(ping.location());
                net.last_ping_at = Some(ping.timestamp);
                net.updated_at = Utc::now();
            }
        }
        Ok(AppendOutcome::Appended)
    }

    async fn pings_in_window(
        &self,
        net_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Ping>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let pings = read(&self.pings)?;
        Ok(pings
            .get(net_id)
            .map(|log| {
                // Lora and Satellite are the smallest and largest sources
                let range = (from.timestamp_millis(), PingSource::Lora)
                    ..=(to.timestamp_millis(), PingSource::Satellite);
                log.range(range)
                    .map(|(_, p)| p)
                    .filter(|p| p.timestamp >= from && p.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent_pings(&self, net_id: &str, limit: usize) -> Result<Vec<Ping>, StoreError> {
        let pings = read(&self.pings)?;
        let mut recent: Vec<Ping> = pings
            .get(net_id)
            .map(|log| log.values().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        recent.reverse();
        Ok(recent)
    }

    async fn insert_net(&self, net: &Net) -> Result<(), StoreError> {
        let mut nets = write(&self.nets)?;
        if nets.contains_key(&net.net_id) {
            return Err(StoreError::AlreadyExists { kind: "net", id: net.net_id.clone() });
        }
        nets.insert(net.net_id.clone(), net.clone());
        Ok(())
    }

    async fn get_net(&self, net_id: &str) -> Result<Option<Net>, StoreError> {
        Ok(read(&self.nets)?.get(net_id).cloned())
    }

    async fn get_net_by_qr_code(&self, qr_code_id: &str) -> Result<Option<Net>, StoreError> {
        Ok(read(&self.nets)?
            .values()
            .find(|n| n.qr_code_id == qr_code_id)
            .cloned())
    }

    async fn list_nets(&self) -> Result<Vec<Net>, StoreError> {
        let mut nets: Vec<Net> = read(&self.nets)?.values().cloned().collect();
        nets.sort_by(|a, b| a.net_id.cmp(&b.net_id));
        Ok(nets)
    }

    async fn set_net_status(
        &self,
        net_id: &str,
        expected: NetStatus,
        new: NetStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut nets = write(&self.nets)?;
        let net = nets
            .get_mut(net_id)
            .ok_or_else(|| StoreError::net_not_found(net_id))?;
        if net.status != expected {
            return Ok(CasOutcome::Conflict { actual: net.status });
        }
        net.status = new;
        net.updated_at = Utc::now();
        Ok(CasOutcome::Applied)
    }

    async fn set_net_owner(&self, net_id: &str, owner_id: &str) -> Result<Net, StoreError> {
        let mut nets = write(&self.nets)?;
        let net = nets
            .get_mut(net_id)
            .ok_or_else(|| StoreError::net_not_found(net_id))?;
        net.owner_id = owner_id.to_string();
        net.updated_at = Utc::now();
        Ok(net.clone())
    }

    async fn save_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        {
            let mut predictions = write(&self.predictions)?;
            match predictions.iter_mut().find(|p| p.prediction_id == prediction.prediction_id) {
                Some(existing) => *existing = prediction.clone(),
                None => predictions.push(prediction.clone()),
            }
        }

        let mut nets = write(&self.nets)?;
        if let Some(net) = nets.get_mut(&prediction.net_id) {
            net.last_prediction_id = Some(prediction.prediction_id.clone());
            net.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn latest_prediction(&self, net_id: &str) -> Result<Option<Prediction>, StoreError> {
        Ok(read(&self.predictions)?
            .iter()
            .filter(|p| p.net_id == net_id)
            .max_by_key(|p| p.timestamp)
            .cloned())
    }

    async fn attach_forecasts(
        &self,
        prediction_id: &str,
        forecasts: &[HorizonForecast],
    ) -> Result<(), StoreError> {
        let mut predictions = write(&self.predictions)?;
        let prediction = predictions
            .iter_mut()
            .find(|p| p.prediction_id == prediction_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "prediction",
                id: prediction_id.to_string(),
            })?;
        prediction.horizon_forecasts = forecasts.to_vec();
        Ok(())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut alerts = write(&self.alerts)?;
        match alerts.iter_mut().find(|a| a.alert_id == alert.alert_id) {
            Some(existing) => *existing = alert.clone(),
            None => alerts.push(alert.clone()),
        }
        Ok(())
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(read(&self.alerts)?
            .iter()
            .find(|a| a.alert_id == alert_id)
            .cloned())
    }

    async fn open_alert(&self, net_id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(read(&self.alerts)?
            .iter()
            .rev()
            .find(|a| a.net_id == net_id && a.is_open())
            .cloned())
    }

    async fn alerts_for_net(&self, net_id: &str) -> Result<Vec<Alert>, StoreError> {
        Ok(read(&self.alerts)?
            .iter()
            .filter(|a| a.net_id == net_id)
            .cloned()
            .collect())
    }

    async fn save_recovery(&self, record: &RecoveryRecord) -> Result<(), StoreError> {
        write(&self.recoveries)?.insert(record.net_id.clone(), record.clone());
        Ok(())
    }

    async fn recovery_for_net(&self, net_id: &str) -> Result<Option<RecoveryRecord>, StoreError> {
        Ok(read(&self.recoveries)?.get(net_id).cloned())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
