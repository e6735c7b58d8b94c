use crate::error::{AppError, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::PoisonError;
use tokio::sync::{watch, Mutex};
use tokio::time::{Duration, Instant};

struct StoredEntry {
    value: Value,
    expires_at: Instant,
}

/// A leader failure as broadcast to its followers. The variant is preserved
/// so followers surface the same error category as the leader.
#[derive(Debug, Clone)]
enum FlightFailure {
    Decode(String),
    RemoteQuery(String),
    InvariantViolation(String),
    Configuration(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<&AppError> for FlightFailure {
    fn from(error: &AppError) -> Self {
        match error {
            AppError::Decode(msg) => FlightFailure::Decode(msg.clone()),
            AppError::RemoteQuery(msg) => FlightFailure::RemoteQuery(msg.clone()),
            AppError::InvariantViolation(msg) => FlightFailure::InvariantViolation(msg.clone()),
            AppError::Configuration(msg) => FlightFailure::Configuration(msg.clone()),
            AppError::NotFound(msg) => FlightFailure::NotFound(msg.clone()),
            AppError::BadRequest(msg) => FlightFailure::BadRequest(msg.clone()),
            AppError::Database(e) => FlightFailure::Internal(e.to_string()),
            AppError::Internal(msg) => FlightFailure::Internal(msg.clone()),
        }
    }
}

impl From<FlightFailure> for AppError {
    fn from(failure: FlightFailure) -> Self {
        match failure {
            FlightFailure::Decode(msg) => AppError::Decode(msg),
            FlightFailure::RemoteQuery(msg) => AppError::RemoteQuery(msg),
            FlightFailure::InvariantViolation(msg) => AppError::InvariantViolation(msg),
            FlightFailure::Configuration(msg) => AppError::Configuration(msg),
            FlightFailure::NotFound(msg) => AppError::NotFound(msg),
            FlightFailure::BadRequest(msg) => AppError::BadRequest(msg),
            FlightFailure::Internal(msg) => AppError::Internal(msg),
        }
    }
}

type FlightResult = std::result::Result<Value, FlightFailure>;

enum Role {
    Leader(watch::Sender<Option<FlightResult>>),
    Follower(watch::Receiver<Option<FlightResult>>),
}

/// In-process TTL cache with single-flight semantics: at most one computation
/// runs per key at any time, and every concurrent caller for that key
/// observes the same value or the same failure. Failures are never stored.
pub struct Cache {
    entries: Mutex<HashMap<String, StoredEntry>>,
    inflight: std::sync::Mutex<HashMap<String, watch::Receiver<Option<FlightResult>>>>,
}

/// Unregisters the leader's inflight entry on drop, so a leader future that
/// is cancelled mid-compute never leaves a dead channel behind.
struct InflightGuard<'a> {
    cache: &'a Cache,
    key: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.cache
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inflight: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Return the live entry for `key`, or run `compute` (once across all
    /// concurrent callers) and store its result for `ttl`. A follower whose
    /// leader disappears without an answer goes back to contend for the key.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // Consumed only on the leader path, which always returns.
        let mut compute = Some(compute);

        loop {
            if let Some(raw) = self.peek_raw(key).await {
                return from_raw(key, raw);
            }

            let role = {
                let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
                match inflight.get(key) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let Some(compute) = compute.take() else {
                        return Err(AppError::Internal(format!(
                            "single-flight leader for {key} ran twice"
                        )));
                    };
                    let _guard = InflightGuard { cache: self, key };

                    // A previous leader may have stored between our miss and
                    // the registration above.
                    if let Some(raw) = self.peek_raw(key).await {
                        let _ = tx.send(Some(Ok(raw.clone())));
                        return from_raw(key, raw);
                    }

                    return match compute().await {
                        Ok(value) => match serde_json::to_value(&value) {
                            Ok(raw) => {
                                self.store(key, raw.clone(), ttl).await;
                                let _ = tx.send(Some(Ok(raw)));
                                Ok(value)
                            }
                            Err(e) => {
                                let error = AppError::Internal(format!(
                                    "cache serialization failed for {key}: {e}"
                                ));
                                let _ = tx.send(Some(Err(FlightFailure::from(&error))));
                                Err(error)
                            }
                        },
                        Err(e) => {
                            // Not stored: the next call retries the computation.
                            let _ = tx.send(Some(Err(FlightFailure::from(&e))));
                            Err(e)
                        }
                    };
                }
                Role::Follower(mut rx) => {
                    let outcome = loop {
                        if let Some(result) = rx.borrow_and_update().clone() {
                            break Some(result);
                        }
                        if rx.changed().await.is_err() {
                            break None;
                        }
                    };
                    match outcome {
                        Some(Ok(raw)) => return from_raw(key, raw),
                        Some(Err(failure)) => return Err(failure.into()),
                        // Leader dropped without an answer; contend again.
                        None => continue,
                    }
                }
            }
        }
    }

    /// Unconditional overwrite.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_value(value).map_err(|e| {
            AppError::Internal(format!("cache serialization failed for {key}: {e}"))
        })?;
        self.store(key, raw, ttl).await;
        Ok(())
    }

    /// Read without ever triggering a computation. Used to tell a cold start
    /// (absent) from a warm one.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.peek_raw(key).await?;
        serde_json::from_value(raw).ok()
    }

    async fn peek_raw(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn store(&self, key: &str, value: Value, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn from_raw<T: DeserializeOwned>(key: &str, raw: Value) -> Result<T> {
    serde_json::from_value(raw)
        .map_err(|e| AppError::Internal(format!("cache deserialization failed for {key}: {e}")))
}
