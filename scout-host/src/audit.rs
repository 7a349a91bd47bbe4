//! Size-rotated audit trail.
//!
//! Every decoded report and issued command is appended through a
//! synchronous hook; this module is the file-backed implementation
//! behind it. Rotation keeps a bounded number of numbered backups,
//! mirroring the rotating-file policy of the operator tooling this
//! replaces.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

/// Rotate once the active file grows past this many bytes.
const MAX_BYTES: u64 = 1_048_576;

/// Number of rotated backups to keep (`.1` newest, `.3` oldest).
const BACKUPS: u32 = 3;

pub struct AuditLog {
    path: PathBuf,
    guard: Mutex<()>,
    max_bytes: u64,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
            max_bytes: MAX_BYTES,
        }
    }

    #[cfg(test)]
    fn with_max_bytes(path: PathBuf, max_bytes: u64) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
            max_bytes,
        }
    }

    /// Append one line, rotating first when the file is over budget.
    ///
    /// Failures are logged, never propagated: the audit trail must not
    /// take the session down.
    pub fn append(&self, line: &str) {
        let _guard = self.guard.lock().expect("audit log poisoned");

        if let Ok(meta) = std::fs::metadata(&self.path) {
            if meta.len() >= self.max_bytes {
                self.rotate();
            }
        }

        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"));

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "[{}] {}", stamp, line));
        if let Err(e) = result {
            warn!(%e, path = %self.path.display(), "audit append failed");
        }
    }

    /// Shift `.2` → `.3`, `.1` → `.2`, active → `.1`.
    fn rotate(&self) {
        for n in (1..BACKUPS).rev() {
            let from = self.backup_path(n);
            let to = self.backup_path(n + 1);
            let _ = std::fs::rename(from, to);
        }
        let _ = std::fs::rename(&self.path, self.backup_path(1));
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }
}
