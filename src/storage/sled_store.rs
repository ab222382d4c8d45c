//! Sled-backed telemetry store
//!
//! One tree per entity:
//!
//! | tree          | key                                   | value              |
//! |---------------|---------------------------------------|--------------------|
//! | `nets`        | net id                                | JSON `Net`         |
//! | `qr_index`    | QR code id                            | net id             |
//! | `pings`       | net id, 0x00, ts (u64 BE), source tag | JSON `Ping`        |
//! | `predictions` | prediction id                         | JSON `Prediction`  |
//! | `pred_index`  | net id, 0x00, ts (u64 BE), pred id    | prediction id      |
//! | `alerts`      | alert id                              | JSON `Alert`       |
//! | `open_alerts` | net id                                | alert id           |
//! | `recoveries`  | net id                                | JSON `RecoveryRecord` |
//!
//! Timestamps are encoded so that big-endian byte order equals time order,
//! which lets window reads use `range` directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{CasOutcome, StoreError, TelemetryStore};
use crate::types::{
    Alert, AppendOutcome, HorizonForecast, Net, NetStatus, Ping, PingSource, Prediction,
    RecoveryRecord,
};

/// Durable store on an embedded sled database
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
    nets: sled::Tree,
    qr_index: sled::Tree,
    pings: sled::Tree,
    predictions: sled::Tree,
    pred_index: sled::Tree,
    alerts: sled::Tree,
    open_alerts: sled::Tree,
    recoveries: sled::Tree,
}

impl SledStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let store = Self {
            nets: db.open_tree("nets")?,
            qr_index: db.open_tree("qr_index")?,
            pings: db.open_tree("pings")?,
            predictions: db.open_tree("predictions")?,
            pred_index: db.open_tree("pred_index")?,
            alerts: db.open_tree("alerts")?,
            open_alerts: db.open_tree("open_alerts")?,
            recoveries: db.open_tree("recoveries")?,
            db: Arc::new(db),
        };
        info!(path = %path_ref.display(), nets = store.nets.len(), "Telemetry store opened");
        Ok(store)
    }

    /// Flush dirty buffers to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Read-modify-write a net record with optimistic concurrency.
    ///
    /// `update` returns `false` to leave the record untouched. Retries when
    /// another writer changed the record between read and swap.
    fn update_net<F>(&self, net_id: &str, mut update: F) -> Result<Option<Net>, StoreError>
    where
        F: FnMut(&mut Net) -> bool,
    {
        loop {
            let Some(current) = self.nets.get(net_id)? else {
                return Ok(None);
            };
            let mut net: Net = serde_json::from_slice(&current)?;
            if !update(&mut net) {
                return Ok(Some(net));
            }
            let encoded = serde_json::to_vec(&net)?;
            match self
                .nets
                .compare_and_swap(net_id, Some(current), Some(encoded))?
            {
                Ok(()) => return Ok(Some(net)),
                Err(_) => debug!(net_id = net_id, "Concurrent net update, retrying"),
            }
        }
    }
}

/// Map an epoch offset to bytes whose lexical order matches numeric order
fn order_key(epoch: i64) -> [u8; 8] {
    // flip the sign bit so negative offsets sort before positive ones
    ((epoch as u64) ^ (1 << 63)).to_be_bytes()
}

const fn source_tag(source: PingSource) -> u8 {
    match source {
        PingSource::Lora => 0,
        PingSource::Gsm => 1,
        PingSource::Satellite => 2,
    }
}

fn net_prefix(net_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(net_id.len() + 1);
    key.extend_from_slice(net_id.as_bytes());
    key.push(0);
    key
}

/// `net_id \0 millis source`, the same identity as `Ping::dedup_key`
fn ping_key(net_id: &str, millis: i64, tag: u8) -> Vec<u8> {
    let mut key = net_prefix(net_id);
    key.extend_from_slice(&order_key(millis));
    key.push(tag);
    key
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl TelemetryStore for SledStore {
    async fn append_ping(&self, ping: &Ping) -> Result<AppendOutcome, StoreError> {
        let (millis, source) = ping.dedup_key();
        let key = ping_key(&ping.net_id, millis, source_tag(source));
        let value = serde_json::to_vec(ping)?;

        // insert-if-absent; an existing key means a duplicate ping
        if self
            .pings
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
            .is_err()
        {
            return Ok(AppendOutcome::Duplicate);
        }

        self.update_net(&ping.net_id, |net| {
            if net.last_ping_at.map_or(true, |last| ping.timestamp > last) {
                net.last_known_location = Some(ping.location());
                net.last_ping_at = Some(ping.timestamp);
                net.updated_at = Utc::now();
                true
            } else {
                false
            }
        })?;
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
        let start = ping_key(net_id, from.timestamp_millis(), 0);
        let end = ping_key(net_id, to.timestamp_millis(), u8::MAX);
        let mut pings = Vec::new();
        for item in self.pings.range(start..=end) {
            let (_, value) = item?;
            let ping: Ping = decode(&value)?;
            if ping.timestamp >= from && ping.timestamp <= to {
                pings.push(ping);
            }
        }
        Ok(pings)
    }

    async fn recent_pings(&self, net_id: &str, limit: usize) -> Result<Vec<Ping>, StoreError> {
        let mut recent = self
            .pings
            .scan_prefix(net_prefix(net_id))
            .rev()
            .take(limit)
            .map(|item| {
                let (_, value) = item?;
                decode::<Ping>(&value)
            })
            .collect::<Result<Vec<_>, _>>()?;
        recent.reverse();
        Ok(recent)
    }

    async fn insert_net(&self, net: &Net) -> Result<(), StoreError> {
        let value = serde_json::to_vec(net)?;
        if self
            .nets
            .compare_and_swap(net.net_id.as_bytes(), None as Option<&[u8]>, Some(value))?
            .is_err()
        {
            return Err(StoreError::AlreadyExists { kind: "net", id: net.net_id.clone() });
        }
        self.qr_index
            .insert(net.qr_code_id.as_bytes(), net.net_id.as_bytes())?;
        Ok(())
    }

    async fn get_net(&self, net_id: &str) -> Result<Option<Net>, StoreError> {
        self.nets.get(net_id)?.map(|v| decode(&v)).transpose()
    }

    async fn get_net_by_qr_code(&self, qr_code_id: &str) -> Result<Option<Net>, StoreError> {
        match self.qr_index.get(qr_code_id)? {
            Some(net_id) => self.nets.get(net_id)?.map(|v| decode(&v)).transpose(),
            None => Ok(None),
        }
    }

    async fn list_nets(&self) -> Result<Vec<Net>, StoreError> {
        self.nets
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    async fn set_net_status(
        &self,
        net_id: &str,
        expected: NetStatus,
        new: NetStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut conflict = None;
        let updated = self.update_net(net_id, |net| {
            if net.status == expected {
                conflict = None;
                net.status = new;
                net.updated_at = Utc::now();
                true
            } else {
                conflict = Some(net.status);
                false
            }
        })?;

        match (updated, conflict) {
            (None, _) => Err(StoreError::net_not_found(net_id)),
            (Some(_), Some(actual)) => Ok(CasOutcome::Conflict { actual }),
            (Some(_), None) => Ok(CasOutcome::Applied),
        }
    }

    async fn set_net_owner(&self, net_id: &str, owner_id: &str) -> Result<Net, StoreError> {
        self.update_net(net_id, |net| {
            net.owner_id = owner_id.to_string();
            net.updated_at = Utc::now();
            true
        })?
        .ok_or_else(|| StoreError::net_not_found(net_id))
    }

    async fn save_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        let value = serde_json::to_vec(prediction)?;
        self.predictions
            .insert(prediction.prediction_id.as_bytes(), value)?;

        let mut index_key = net_prefix(&prediction.net_id);
        index_key.extend_from_slice(&order_key(prediction.timestamp.timestamp_micros()));
        index_key.extend_from_slice(prediction.prediction_id.as_bytes());
        self.pred_index
            .insert(index_key, prediction.prediction_id.as_bytes())?;

        self.update_net(&prediction.net_id, |net| {
            net.last_prediction_id = Some(prediction.prediction_id.clone());
            net.updated_at = Utc::now();
            true
        })?;
        Ok(())
    }

    async fn latest_prediction(&self, net_id: &str) -> Result<Option<Prediction>, StoreError> {
        let Some(entry) = self.pred_index.scan_prefix(net_prefix(net_id)).next_back() else {
            return Ok(None);
        };
        let (_, prediction_id) = entry?;
        self.predictions
            .get(prediction_id)?
            .map(|v| decode(&v))
            .transpose()
    }

    async fn attach_forecasts(
        &self,
        prediction_id: &str,
        forecasts: &[HorizonForecast],
    ) -> Result<(), StoreError> {
        let current = self
            .predictions
            .get(prediction_id)?
            .ok_or_else(|| StoreError::NotFound {
                kind: "prediction",
                id: prediction_id.to_string(),
            })?;
        let mut prediction: Prediction = decode(&current)?;
        prediction.horizon_forecasts = forecasts.to_vec();
        self.predictions
            .insert(prediction_id.as_bytes(), serde_json::to_vec(&prediction)?)?;
        Ok(())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts
            .insert(alert.alert_id.as_bytes(), serde_json::to_vec(alert)?)?;

        if alert.is_open() {
            self.open_alerts
                .insert(alert.net_id.as_bytes(), alert.alert_id.as_bytes())?;
        } else {
            // only clear the index if it still points at this alert
            let _ = self.open_alerts.compare_and_swap(
                alert.net_id.as_bytes(),
                Some(alert.alert_id.as_bytes()),
                None as Option<&[u8]>,
            )?;
        }
        Ok(())
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        self.alerts.get(alert_id)?.map(|v| decode(&v)).transpose()
    }

    async fn open_alert(&self, net_id: &str) -> Result<Option<Alert>, StoreError> {
        let Some(alert_id) = self.open_alerts.get(net_id)? else {
            return Ok(None);
        };
        let alert: Option<Alert> = self.alerts.get(alert_id)?.map(|v| decode(&v)).transpose()?;
        Ok(alert.filter(Alert::is_open))
    }

    async fn alerts_for_net(&self, net_id: &str) -> Result<Vec<Alert>, StoreError> {
        let mut alerts = self
            .alerts
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode::<Alert>(&value)
            })
            .filter(|a| a.as_ref().map_or(true, |a| a.net_id == net_id))
            .collect::<Result<Vec<_>, _>>()?;
        alerts.sort_by_key(|a| a.triggered_at);
        Ok(alerts)
    }

    async fn save_recovery(&self, record: &RecoveryRecord) -> Result<(), StoreError> {
        self.recoveries
            .insert(record.net_id.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    async fn recovery_for_net(&self, net_id: &str) -> Result<Option<RecoveryRecord>, StoreError> {
        self.recoveries.get(net_id)?.map(|v| decode(&v)).transpose()
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
