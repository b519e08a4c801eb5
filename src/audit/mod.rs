//! Append-only audit trail for privileged mutations.
//!
//! Handlers go through [`AuditRecorder::commit`], which runs the mutation first
//! and records only once it has succeeded. A failed audit write is logged and
//! counted but never turns a successful mutation into an error response.

use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::database::{AuditStore, StoreError};
use crate::error::AppError;

/// What a handler knows about the action it just completed.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecordInput {
    pub user_id: String,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
}

impl AuditRecordInput {
    pub fn new(
        user_id: impl Into<String>,
        user_email: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: user_email.into(),
            action: action.into(),
            resource: resource.into(),
            resource_id: resource_id.into(),
            details: None,
            ip_address: None,
        }
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    // user_email may be blank: credentials are not required to carry one.
    fn validate(&self) -> Result<(), AuditError> {
        let required = [
            ("userId", &self.user_id),
            ("action", &self.action),
            ("resource", &self.resource),
            ("resourceId", &self.resource_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AuditError::Invalid(field));
            }
        }
        Ok(())
    }

    /// Stamp the entry with a fresh id and the current server time.
    pub fn into_record(self) -> Result<AuditRecord, AuditError> {
        self.validate()?;
        Ok(AuditRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            user_email: self.user_email,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            details: self.details.unwrap_or_else(|| Value::Object(Default::default())),
            ip_address: self.ip_address,
            timestamp: Utc::now(),
        })
    }
}

/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: String,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit entry missing required field: {0}")]
    Invalid(&'static str),

    #[error("audit write failed: {0}")]
    WriteFailed(#[from] StoreError),

    #[error("audit write did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("audit write task aborted: {0}")]
    Aborted(String),
}

/// Operator-facing counters for audit writes that did not land, or had not
/// landed when the request stopped waiting.
#[derive(Debug, Default)]
pub struct AuditHealth {
    failures: AtomicU64,
    timeouts: AtomicU64,
    last_failure_unix_ms: AtomicI64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditHealthSnapshot {
    pub write_failures: u64,
    /// Writes still running when the timeout elapsed. They may land later;
    /// if they fail they are also counted in `write_failures`.
    pub write_timeouts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl AuditHealth {
    fn note_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure_unix_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn note_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AuditHealthSnapshot {
        let last = self.last_failure_unix_ms.load(Ordering::Relaxed);
        AuditHealthSnapshot {
            write_failures: self.failures.load(Ordering::Relaxed),
            write_timeouts: self.timeouts.load(Ordering::Relaxed),
            last_failure_at: (last > 0)
                .then(|| Utc.timestamp_millis_opt(last).single())
                .flatten(),
        }
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    write_timeout: Duration,
    health: Arc<AuditHealth>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
            health: Arc::new(AuditHealth::default()),
        }
    }

    pub fn health(&self) -> AuditHealthSnapshot {
        self.health.snapshot()
    }

    /// Append one record. The append runs on its own task so a dropped request
    /// cannot cancel it; this call waits for it up to the write timeout.
    ///
    /// Failed writes are counted when they fail, even after the timeout has
    /// elapsed. A timeout on its own is counted separately.
    pub async fn record(&self, input: AuditRecordInput) -> Result<AuditRecord, AuditError> {
        let record = input.into_record().map_err(|e| {
            self.health.note_failure();
            e
        })?;

        let store = self.store.clone();
        let health = self.health.clone();
        let pending = record.clone();
        let write = tokio::spawn(async move {
            let result = store.append(&pending).await;
            if let Err(e) = &result {
                health.note_failure();
                tracing::error!(
                    target: "audit",
                    id = %pending.id,
                    user_id = %pending.user_id,
                    action = %pending.action,
                    resource = %pending.resource,
                    resource_id = %pending.resource_id,
                    error = %e,
                    "audit write failed"
                );
            }
            result
        });

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!(
                    target: "audit",
                    id = %record.id,
                    action = %record.action,
                    resource = %record.resource,
                    resource_id = %record.resource_id,
                    "audit record written"
                );
                Ok(record)
            }
            Ok(Ok(Err(e))) => Err(AuditError::WriteFailed(e)),
            Ok(Err(join_error)) => {
                self.health.note_failure();
                Err(AuditError::Aborted(join_error.to_string()))
            }
            Err(_) => {
                self.health.note_timeout();
                Err(AuditError::TimedOut(self.write_timeout))
            }
        }
    }

    /// Record after a mutation has been applied. Failures are logged and
    /// counted, never returned.
    pub async fn record_after(&self, input: AuditRecordInput) -> Option<AuditRecord> {
        let (user_id, action, resource, resource_id) = (
            input.user_id.clone(),
            input.action.clone(),
            input.resource.clone(),
            input.resource_id.clone(),
        );

        match self.record(input).await {
            Ok(record) => Some(record),
            // Already logged by the write task.
            Err(AuditError::WriteFailed(_)) => None,
            Err(AuditError::TimedOut(after)) => {
                tracing::warn!(
                    target: "audit",
                    %user_id,
                    %action,
                    %resource,
                    %resource_id,
                    ?after,
                    "audit write still pending after timeout, continuing in background"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    target: "audit",
                    %user_id,
                    %action,
                    %resource,
                    %resource_id,
                    error = %e,
                    "audit write failed after successful mutation"
                );
                None
            }
        }
    }

    /// Apply `mutation`, then audit it. Nothing is recorded when the mutation
    /// fails, and the mutation's result is returned whatever the audit outcome.
    pub async fn commit<T, E, Fut, D>(&self, mutation: Fut, describe: D) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, E>>,
        AppError: From<E>,
        D: FnOnce(&T) -> AuditRecordInput,
    {
        let value = mutation.await?;
        self.record_after(describe(&value)).await;
        Ok(value)
    }
}
