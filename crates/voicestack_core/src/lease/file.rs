//! Lease records stored as files in a shared directory.
//!
//! `<dir>/<name>.lease` holds the JSON record. Every read-modify-write of a
//! record runs under an exclusive OS lock on `<dir>/<name>.guard`, so workers
//! in any process inspect and change a record one at a time. The OS drops
//! the guard when its process dies. Records are replaced by rename, so
//! unguarded readers never see a partial write.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::{LeaseError, LeaseRecord, LeaseResult, LeaseStore};

pub struct FileLeaseStore {
    dir: PathBuf,
}

impl FileLeaseStore {
    pub fn new(dir: impl Into<PathBuf>) -> LeaseResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| LeaseError::io("create lease dir", e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lease", Self::file_stem(name)))
    }

    fn guard_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.guard", Self::file_stem(name)))
    }

    /// Run `f` on the record path while holding the lease's guard.
    fn guarded<T>(&self, name: &str, f: impl FnOnce(&Path) -> LeaseResult<T>) -> LeaseResult<T> {
        let guard = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.guard_path(name))
            .map_err(|e| LeaseError::io("open lease guard", e))?;
        guard
            .lock()
            .map_err(|e| LeaseError::io("lock lease guard", e))?;

        let result = f(&self.record_path(name));

        // Closing the handle would release it too
        if let Err(e) = guard.unlock() {
            tracing::warn!(lease = name, "Could not unlock lease guard: {}", e);
        }
        result
    }

    fn read_record(&self, path: &Path) -> LeaseResult<Option<LeaseRecord>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LeaseError::io("read lease", e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| LeaseError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Write `record` to a temp file and rename it over `path`.
    fn write_record(&self, path: &Path, record: &LeaseRecord) -> LeaseResult<()> {
        let temp = path.with_extension(format!("lease.{}.tmp", Uuid::new_v4().simple()));
        let json = serde_json::to_string_pretty(record).map_err(|e| LeaseError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        {
            let mut file = File::create(&temp).map_err(|e| LeaseError::io("write lease", e))?;
            file.write_all(json.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| LeaseError::io("write lease", e))?;
        }
        fs::rename(&temp, path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            LeaseError::io("replace lease", e)
        })
    }
}

impl LeaseStore for FileLeaseStore {
    fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> LeaseResult<Option<LeaseRecord>> {
        self.guarded(name, |path| {
            match self.read_record(path) {
                Ok(None) => {}
                Ok(Some(current)) if current.holder == holder => {
                    let renewed = current.extended(ttl);
                    self.write_record(path, &renewed)?;
                    return Ok(Some(renewed));
                }
                Ok(Some(current)) if current.is_expired(Utc::now()) => {
                    tracing::warn!(
                        lease = name,
                        holder = %current.holder,
                        expired_at = %current.expires_at,
                        "Breaking expired lease"
                    );
                }
                Ok(Some(_)) => return Ok(None),
                // Records are only ever renamed into place, so this is not a torn write
                Err(LeaseError::Corrupt { message, .. }) => {
                    tracing::warn!(lease = name, "Replacing unreadable lease record: {}", message);
                }
                Err(e) => return Err(e),
            }

            let record = LeaseRecord::new(name, holder, ttl);
            self.write_record(path, &record)?;
            Ok(Some(record))
        })
    }

    fn renew(&self, name: &str, holder: &str, ttl: Duration) -> LeaseResult<LeaseRecord> {
        self.guarded(name, |path| match self.read_record(path)? {
            Some(current) if current.holder == holder => {
                let renewed = current.extended(ttl);
                self.write_record(path, &renewed)?;
                Ok(renewed)
            }
            _ => Err(LeaseError::NotHeld {
                name: name.to_string(),
                holder: holder.to_string(),
            }),
        })
    }

    fn release(&self, name: &str, holder: &str) -> LeaseResult<bool> {
        self.guarded(name, |path| match self.read_record(path)? {
            Some(current) if current.holder == holder => match fs::remove_file(path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(LeaseError::io("release lease", e)),
            },
            _ => Ok(false),
        })
    }

    fn current(&self, name: &str) -> LeaseResult<Option<LeaseRecord>> {
        self.read_record(&self.record_path(name))
    }
}
