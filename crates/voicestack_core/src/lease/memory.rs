//! In-process lease store.
//!
//! Only excludes holders sharing the same instance; used by tests and by
//! single-process deployments.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use super::{LeaseError, LeaseRecord, LeaseResult, LeaseStore};

#[derive(Default)]
pub struct MemoryLeaseStore {
    leases: Mutex<HashMap<String, LeaseRecord>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaseStore for MemoryLeaseStore {
    fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> LeaseResult<Option<LeaseRecord>> {
        let mut leases = self.leases.lock();
        let granted = match leases.get(name) {
            Some(current) if current.holder == holder => current.extended(ttl),
            Some(current) if !current.is_expired(Utc::now()) => return Ok(None),
            _ => LeaseRecord::new(name, holder, ttl),
        };
        leases.insert(name.to_string(), granted.clone());
        Ok(Some(granted))
    }

    fn renew(&self, name: &str, holder: &str, ttl: Duration) -> LeaseResult<LeaseRecord> {
        let mut leases = self.leases.lock();
        match leases.get_mut(name) {
            Some(current) if current.holder == holder => {
                *current = current.extended(ttl);
                Ok(current.clone())
            }
            _ => Err(LeaseError::NotHeld {
                name: name.to_string(),
                holder: holder.to_string(),
            }),
        }
    }

    fn release(&self, name: &str, holder: &str) -> LeaseResult<bool> {
        let mut leases = self.leases.lock();
        if leases.get(name).is_some_and(|r| r.holder == holder) {
            leases.remove(name);
            return Ok(true);
        }
        Ok(false)
    }

    fn current(&self, name: &str) -> LeaseResult<Option<LeaseRecord>> {
        Ok(self.leases.lock().get(name).cloned())
    }
}
