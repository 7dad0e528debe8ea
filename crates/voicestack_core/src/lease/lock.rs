//! Named resource lock with bounded-wait acquisition.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{LeaseError, LeaseRecord, LeaseResult, LeaseStore};
use crate::config::PipelineSettings;

/// Acquisition and lease timing.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Longest time `acquire` waits before failing.
    pub acquire_timeout: Duration,
    /// Lease length; an unrenewed lease expires after this.
    pub lease_duration: Duration,
    /// Delay between acquisition attempts.
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(300),
            lease_duration: Duration::from_secs(1800),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&PipelineSettings> for LockOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            acquire_timeout: settings.lock_timeout(),
            lease_duration: settings.lock_lease(),
            poll_interval: settings.lock_poll(),
        }
    }
}

/// Lock lifecycle notifications.
///
/// `Acquired` is emitted after the lease is granted and `Released` before
/// it is given back, so observed intervals lie inside the real hold time.
#[derive(Debug, Clone)]
pub enum LockEvent {
    Waiting {
        name: String,
        holder: String,
        current_holder: Option<String>,
    },
    Acquired {
        name: String,
        holder: String,
        at: Instant,
        waited: Duration,
    },
    Renewed {
        name: String,
        holder: String,
    },
    Released {
        name: String,
        holder: String,
        at: Instant,
        held: Duration,
    },
}

pub type LockObserver = Arc<dyn Fn(&LockEvent) + Send + Sync>;

/// A single named lock over a [`LeaseStore`].
#[derive(Clone)]
pub struct ResourceLock {
    store: Arc<dyn LeaseStore>,
    name: String,
    options: LockOptions,
    observer: Option<LockObserver>,
}

impl ResourceLock {
    pub fn new(store: Arc<dyn LeaseStore>, name: impl Into<String>, options: LockOptions) -> Self {
        Self {
            store,
            name: name.into(),
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: LockObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Wait up to the acquire timeout for the lease.
    pub fn acquire(&self, holder: &str) -> LeaseResult<LeaseGuard> {
        let started = Instant::now();
        let mut announced = false;

        loop {
            if let Some(record) =
                self.store
                    .try_acquire(&self.name, holder, self.options.lease_duration)?
            {
                let at = Instant::now();
                tracing::debug!(lock = %self.name, holder, waited_ms = started.elapsed().as_millis() as u64, "Lock acquired");
                self.emit(LockEvent::Acquired {
                    name: self.name.clone(),
                    holder: holder.to_string(),
                    at,
                    waited: started.elapsed(),
                });
                return Ok(LeaseGuard {
                    lock: self.clone(),
                    record,
                    acquired: at,
                    released: false,
                });
            }

            let waited = started.elapsed();
            if waited >= self.options.acquire_timeout {
                let current = self
                    .store
                    .current(&self.name)
                    .ok()
                    .flatten()
                    .map(|r| r.holder)
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(LeaseError::AcquireTimeout {
                    name: self.name.clone(),
                    waited,
                    holder: current,
                });
            }

            if !announced {
                announced = true;
                let current_holder = self.store.current(&self.name).ok().flatten().map(|r| r.holder);
                tracing::info!(lock = %self.name, holder, current = ?current_holder, "Waiting for lock");
                self.emit(LockEvent::Waiting {
                    name: self.name.clone(),
                    holder: holder.to_string(),
                    current_holder,
                });
            }

            let remaining = self.options.acquire_timeout.saturating_sub(waited);
            thread::sleep(self.options.poll_interval.min(remaining).max(Duration::from_millis(1)));
        }
    }

    fn emit(&self, event: LockEvent) {
        if let Some(ref observer) = self.observer {
            observer(&event);
        }
    }
}

/// Held lease. Released on drop.
pub struct LeaseGuard {
    lock: ResourceLock,
    record: LeaseRecord,
    acquired: Instant,
    released: bool,
}

impl LeaseGuard {
    pub fn holder(&self) -> &str {
        &self.record.holder
    }

    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    /// Extend the lease by another full lease duration.
    pub fn renew(&mut self) -> LeaseResult<()> {
        self.record = self.lock.store.renew(
            &self.lock.name,
            &self.record.holder,
            self.lock.options.lease_duration,
        )?;
        self.lock.emit(LockEvent::Renewed {
            name: self.lock.name.clone(),
            holder: self.record.holder.clone(),
        });
        Ok(())
    }

    /// Release now, reporting store errors.
    pub fn release(mut self) -> LeaseResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> LeaseResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let at = Instant::now();
        self.lock.emit(LockEvent::Released {
            name: self.lock.name.clone(),
            holder: self.record.holder.clone(),
            at,
            held: at.duration_since(self.acquired),
        });
        let was_held = self.lock.store.release(&self.lock.name, &self.record.holder)?;
        if !was_held {
            tracing::warn!(lock = %self.lock.name, holder = %self.record.holder, "Lease had already expired or been taken over");
        }
        Ok(())
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!(lock = %self.lock.name, "Failed to release lease: {}", e);
        }
    }
}
