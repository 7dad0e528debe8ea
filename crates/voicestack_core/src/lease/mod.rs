//! Leased locks visible across worker processes.
//!
//! A lease is a named lock record with an expiry. The holder renews it while
//! working and deletes it when done; a holder that dies simply stops renewing
//! and the next acquirer breaks the expired record.
//!
//! - [`LeaseStore`]: backing store (shared directory or in-memory)
//! - [`ResourceLock`]: bounded-wait acquisition returning an RAII [`LeaseGuard`]

mod file;
mod lock;
mod memory;

pub use file::FileLeaseStore;
pub use lock::{LeaseGuard, LockEvent, LockObserver, LockOptions, ResourceLock};
pub use memory::MemoryLeaseStore;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from lease operations.
#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Timed out after {waited:?} waiting for lock '{name}' (held by {holder})")]
    AcquireTimeout {
        name: String,
        waited: Duration,
        holder: String,
    },

    #[error("Lease '{name}' is not held by '{holder}'")]
    NotHeld { name: String, holder: String },

    #[error("Lease I/O failed during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt lease record {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl LeaseError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type LeaseResult<T> = Result<T, LeaseError>;

/// A granted lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub name: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn new(name: &str, holder: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Push the expiry out to `ttl` from now.
    pub fn extended(&self, ttl: Duration) -> Self {
        Self {
            expires_at: expiry_after(Utc::now(), ttl),
            ..self.clone()
        }
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Backing store for leases.
///
/// Implementations must make `try_acquire` atomic across every process that
/// shares the store.
pub trait LeaseStore: Send + Sync {
    /// Take the lease if it is free or expired.
    ///
    /// Returns `None` while another holder owns an unexpired lease. A holder
    /// that already owns the lease gets it back with a fresh expiry.
    fn try_acquire(&self, name: &str, holder: &str, ttl: Duration)
        -> LeaseResult<Option<LeaseRecord>>;

    /// Extend a lease owned by `holder`.
    fn renew(&self, name: &str, holder: &str, ttl: Duration) -> LeaseResult<LeaseRecord>;

    /// Drop a lease owned by `holder`. Returns false when it was not held.
    fn release(&self, name: &str, holder: &str) -> LeaseResult<bool>;

    /// Current record, expired or not.
    fn current(&self, name: &str) -> LeaseResult<Option<LeaseRecord>>;
}

/// Holder identity for this process: `<label>@<host>:<pid>`.
pub fn holder_id(label: &str) -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    format!("{}@{}:{}", label, host, std::process::id())
}
