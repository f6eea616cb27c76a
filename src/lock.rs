//! Advisory lock over a working-tree root.
//!
//! A run writes `<root>/.ralph/ralph.lock` containing its pid, start time,
//! issue id, and command. Only one *live* lock may exist per root.
//!
//! ## Race safety
//!
//! `acquire()` writes the lock contents to a temporary file in `.ralph/` and
//! publishes it with a no-clobber link, so the lock file is never visible
//! half-written and of two racing runs exactly one wins. The loser reads the
//! winner's lock.
//!
//! ## Stale lock recovery
//!
//! A lock whose pid is no longer running (crash, SIGKILL) or whose content
//! cannot be parsed is stale. Removal happens only while holding
//! `.ralph/ralph.lock.reclaim` (created with `O_EXCL`): the holder re-reads
//! the lock and deletes it only if it is still stale. Creating a lock never
//! replaces an existing file, so what the reclaimer read is what it deletes.
//! A reclaim marker older than [`ABANDONED_RECLAIM_AGE`] is from a crashed
//! reclaimer and is cleared. PID reuse can make a stale lock look live; that
//! window is accepted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::config::RALPH_DIR;
use crate::errors::LockError;

/// Lock file name inside the root's `.ralph` directory.
pub const LOCK_FILE: &str = "ralph.lock";

/// Marker held while a stale lock is being removed.
pub const RECLAIM_FILE: &str = "ralph.lock.reclaim";

/// A reclaim marker this old belongs to a reclaimer that died.
pub const ABANDONED_RECLAIM_AGE: Duration = Duration::from_secs(30);

const ACQUIRE_ATTEMPTS: u32 = 50;
const RECLAIM_BACKOFF: Duration = Duration::from_millis(10);

/// Path of the lock file for `root`.
pub fn lock_path(root: &Path) -> PathBuf {
    root.join(RALPH_DIR).join(LOCK_FILE)
}

fn reclaim_path(root: &Path) -> PathBuf {
    root.join(RALPH_DIR).join(RECLAIM_FILE)
}

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub issue_id: String,
    pub command: String,
}

impl LockInfo {
    fn for_current_process(issue_id: &str, command: &str) -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            issue_id: issue_id.to_string(),
            command: command.to_string(),
        }
    }

    /// Describe the holder as a `LockError`.
    pub fn to_error(&self) -> LockError {
        LockError {
            pid: self.pid,
            issue_id: self.issue_id.clone(),
            command: self.command.clone(),
            started_at: self.started_at.to_rfc3339(),
        }
    }
}

/// Whether a process id refers to a running process.
pub trait ProcessLiveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Liveness via `kill(pid, 0)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalLiveness;

impl ProcessLiveness for SignalLiveness {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs the existence and permission checks only.
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        // No cheap liveness check here; never reclaim a lock we cannot verify.
        true
    }
}

/// Outcome of [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The caller now owns the lock described here.
    Acquired(LockInfo),
    /// A live process already holds the lock; its contents are unchanged.
    Held(LockInfo),
}

impl LockAcquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockAcquisition::Acquired(_))
    }

    /// The pre-existing lock that blocked acquisition, if any.
    pub fn existing_lock(&self) -> Option<&LockInfo> {
        match self {
            LockAcquisition::Held(info) => Some(info),
            LockAcquisition::Acquired(_) => None,
        }
    }
}

/// Acquires, inspects, and releases root locks.
pub struct LockManager {
    liveness: Box<dyn ProcessLiveness>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_liveness(Box::new(SignalLiveness))
    }

    pub fn with_liveness(liveness: Box<dyn ProcessLiveness>) -> Self {
        Self { liveness }
    }

    /// Try to take the lock for `root`.
    pub fn acquire(&self, root: &Path, issue_id: &str, command: &str) -> Result<LockAcquisition> {
        let path = lock_path(root);
        let dir = root.join(RALPH_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create lock directory: {}", dir.display()))?;

        for _ in 0..ACQUIRE_ATTEMPTS {
            let info = LockInfo::for_current_process(issue_id, command);
            if publish_lock(&dir, &path, &info)? {
                tracing::debug!(pid = info.pid, issue_id, command, "acquired root lock");
                return Ok(LockAcquisition::Acquired(info));
            }
            if let Some(existing) = self.read_lock_info(root)
                && self.liveness.is_alive(existing.pid)
            {
                return Ok(LockAcquisition::Held(existing));
            }
            if !self.reclaim_stale(root)? {
                std::thread::sleep(RECLAIM_BACKOFF);
            }
        }

        match self.read_lock_info(root) {
            Some(existing) => Ok(LockAcquisition::Held(existing)),
            None => anyhow::bail!("Failed to acquire lock at {} after stale cleanup", path.display()),
        }
    }

    /// Remove the lock for `root` if it is stale, holding the reclaim marker.
    ///
    /// Returns false when another process is reclaiming.
    fn reclaim_stale(&self, root: &Path) -> Result<bool> {
        let Some(_marker) = ReclaimMarker::take(root)? else {
            return Ok(false);
        };
        let path = lock_path(root);
        match self.read_lock_info(root) {
            Some(existing) if self.liveness.is_alive(existing.pid) => {}
            Some(existing) => {
                tracing::info!(pid = existing.pid, issue_id = %existing.issue_id, "removing stale lock (process not running)");
                remove_if_present(&path)?;
            }
            None if path.exists() => {
                tracing::info!(path = %path.display(), "removing unreadable lock file");
                remove_if_present(&path)?;
            }
            None => {}
        }
        Ok(true)
    }

    /// Release the lock if, and only if, this process owns it.
    ///
    /// Returns whether a lock file was removed.
    pub fn release(&self, root: &Path) -> Result<bool> {
        match self.read_lock_info(root) {
            Some(info) if info.pid == std::process::id() => {
                remove_if_present(&lock_path(root))?;
                tracing::debug!(pid = info.pid, "released root lock");
                Ok(true)
            }
            Some(info) => {
                tracing::warn!(owner = info.pid, "not releasing lock owned by another process");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Whether a live process holds the lock for `root`.
    pub fn is_locked(&self, root: &Path) -> bool {
        self.read_lock_info(root)
            .is_some_and(|info| self.liveness.is_alive(info.pid))
    }

    /// Parsed lock contents, or `None` if missing or unparseable.
    pub fn read_lock_info(&self, root: &Path) -> Option<LockInfo> {
        let content = fs::read_to_string(lock_path(root)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Remove the lock file regardless of owner. Manual recovery only.
    ///
    /// Also clears a leftover reclaim marker.
    pub fn force_remove(&self, root: &Path) -> Result<bool> {
        let path = lock_path(root);
        let existed = path.exists();
        remove_if_present(&path)?;
        remove_if_present(&reclaim_path(root))?;
        Ok(existed)
    }
}

/// Write `info` beside the lock and link it into place unless a lock exists.
///
/// Returns whether this call created the lock.
fn publish_lock(dir: &Path, path: &Path, info: &LockInfo) -> Result<bool> {
    let json = serde_json::to_string_pretty(info).context("Failed to serialize lock info")?;
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage lock file in {}", dir.display()))?;
    staged
        .write_all(json.as_bytes())
        .and_then(|_| staged.as_file().sync_all())
        .with_context(|| format!("Failed to write lock file: {}", path.display()))?;
    match staged.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => {
            Err(e.error).with_context(|| format!("Failed to create lock file: {}", path.display()))
        }
    }
}

/// Exclusive right to delete a stale lock; removed on drop.
struct ReclaimMarker {
    path: PathBuf,
}

impl ReclaimMarker {
    fn take(root: &Path) -> Result<Option<Self>> {
        let path = reclaim_path(root);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                clear_abandoned_marker(&path);
                Ok(None)
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to create reclaim marker: {}", path.display())),
        }
    }
}

impl Drop for ReclaimMarker {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove reclaim marker");
        }
    }
}

fn clear_abandoned_marker(path: &Path) {
    let age = path
        .metadata()
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok());
    if age.is_some_and(|age| age >= ABANDONED_RECLAIM_AGE) {
        tracing::warn!(path = %path.display(), "clearing abandoned reclaim marker");
        let _ = fs::remove_file(path);
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Holds a root lock for the life of a run and releases it on drop.
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    root: PathBuf,
    info: LockInfo,
}

impl<'a> LockGuard<'a> {
    /// Acquire the lock or report who holds it.
    pub fn acquire(
        manager: &'a LockManager,
        root: &Path,
        issue_id: &str,
        command: &str,
    ) -> Result<Self> {
        match manager.acquire(root, issue_id, command)? {
            LockAcquisition::Acquired(info) => Ok(Self {
                manager,
                root: root.to_path_buf(),
                info,
            }),
            LockAcquisition::Held(existing) => Err(existing.to_error().into()),
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.release(&self.root) {
            tracing::warn!(error = %e, "failed to release root lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct AllAlive;

    impl ProcessLiveness for AllAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            true
        }
    }

    /// Race `contenders` threads on one root; returns how many got the lock.
    fn race_acquire(manager: &LockManager, root: &Path, contenders: usize) -> usize {
        let barrier = Barrier::new(contenders);
        let granted = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for i in 0..contenders {
                let (barrier, granted) = (&barrier, &granted);
                scope.spawn(move || {
                    barrier.wait();
                    let outcome = manager
                        .acquire(root, &format!("HLN-{}", i), "run")
                        .unwrap();
                    if outcome.is_acquired() {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        granted.load(Ordering::SeqCst)
    }

    /// Liveness double: only the listed pids are running.
    struct FixedLiveness(HashSet<u32>);

    impl ProcessLiveness for FixedLiveness {
        fn is_alive(&self, pid: u32) -> bool {
            self.0.contains(&pid)
        }
    }

    fn manager_with_alive(pids: &[u32]) -> LockManager {
        LockManager::with_liveness(Box::new(FixedLiveness(pids.iter().copied().collect())))
    }

    fn write_lock(root: &Path, pid: u32, issue_id: &str) {
        let info = LockInfo {
            pid,
            started_at: Utc::now(),
            issue_id: issue_id.to_string(),
            command: "run".to_string(),
        };
        fs::create_dir_all(root.join(RALPH_DIR)).unwrap();
        fs::write(lock_path(root), serde_json::to_string(&info).unwrap()).unwrap();
    }

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new();
        let outcome = manager.acquire(dir.path(), "HLN-1", "run").unwrap();
        assert!(outcome.is_acquired());
        assert!(outcome.existing_lock().is_none());

        let info = manager.read_lock_info(dir.path()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.issue_id, "HLN-1");
        assert_eq!(info.command, "run");
    }

    #[test]
    fn test_lock_file_uses_camel_case_json() {
        let dir = tempdir().unwrap();
        LockManager::new().acquire(dir.path(), "HLN-1", "plan").unwrap();
        let raw = fs::read_to_string(lock_path(dir.path())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("pid").is_some());
        assert!(value.get("startedAt").is_some());
        assert_eq!(value["issueId"], "HLN-1");
        assert_eq!(value["command"], "plan");
    }

    #[test]
    fn test_live_lock_blocks_and_is_unchanged() {
        let dir = tempdir().unwrap();
        write_lock(dir.path(), 4242, "OLD-1");
        let manager = manager_with_alive(&[4242]);

        let outcome = manager.acquire(dir.path(), "NEW-2", "run").unwrap();
        assert!(!outcome.is_acquired());
        let existing = outcome.existing_lock().unwrap();
        assert_eq!(existing.issue_id, "OLD-1");
        assert_eq!(existing.pid, 4242);
        assert_eq!(
            manager.read_lock_info(dir.path()).unwrap().issue_id,
            "OLD-1"
        );
    }

    #[test]
    fn test_stale_lock_is_reclaimed_by_new_caller() {
        let dir = tempdir().unwrap();
        write_lock(dir.path(), 4242, "OLD-1");
        let manager = manager_with_alive(&[]);

        let outcome = manager.acquire(dir.path(), "NEW-2", "run").unwrap();
        assert!(outcome.is_acquired());
        let info = manager.read_lock_info(dir.path()).unwrap();
        assert_eq!(info.issue_id, "NEW-2");
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn test_corrupt_lock_is_treated_as_stale() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(RALPH_DIR)).unwrap();
        fs::write(lock_path(dir.path()), "{not json").unwrap();

        let outcome = LockManager::new().acquire(dir.path(), "HLN-1", "run").unwrap();
        assert!(outcome.is_acquired());
    }

    #[test]
    fn test_concurrent_acquire_grants_exactly_one() {
        let manager = LockManager::with_liveness(Box::new(AllAlive));
        for _ in 0..100 {
            let dir = tempdir().unwrap();
            assert_eq!(race_acquire(&manager, dir.path(), 8), 1);
            let info = manager.read_lock_info(dir.path()).unwrap();
            assert!(info.issue_id.starts_with("HLN-"));
        }
    }

    #[test]
    fn test_concurrent_stale_takeover_grants_exactly_one() {
        let manager = manager_with_alive(&[std::process::id()]);
        for _ in 0..50 {
            let dir = tempdir().unwrap();
            write_lock(dir.path(), 4242, "DEAD-1");
            assert_eq!(race_acquire(&manager, dir.path(), 8), 1);
            assert_ne!(manager.read_lock_info(dir.path()).unwrap().issue_id, "DEAD-1");
            assert!(!dir.path().join(RALPH_DIR).join(RECLAIM_FILE).exists());
        }
    }

    #[test]
    fn test_acquire_leaves_only_the_lock_file() {
        let dir = tempdir().unwrap();
        LockManager::new().acquire(dir.path(), "HLN-1", "run").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path().join(RALPH_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![LOCK_FILE.to_string()]);
    }

    #[test]
    fn test_abandoned_reclaim_marker_is_cleared() {
        let dir = tempdir().unwrap();
        write_lock(dir.path(), 4242, "DEAD-1");
        let marker = dir.path().join(RALPH_DIR).join(RECLAIM_FILE);
        fs::write(&marker, "").unwrap();
        fs::File::options()
            .write(true)
            .open(&marker)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - ABANDONED_RECLAIM_AGE * 2)
            .unwrap();

        let outcome = manager_with_alive(&[]).acquire(dir.path(), "HLN-1", "run").unwrap();
        assert!(outcome.is_acquired());
        assert!(!marker.exists());
    }

    #[test]
    fn test_release_only_removes_own_lock() {
        let dir = tempdir().unwrap();
        write_lock(dir.path(), 4242, "OTHER");
        let manager = manager_with_alive(&[4242]);
        assert!(!manager.release(dir.path()).unwrap());
        assert!(lock_path(dir.path()).exists());

        manager.force_remove(dir.path()).unwrap();
        manager.acquire(dir.path(), "MINE", "run").unwrap();
        assert!(manager.release(dir.path()).unwrap());
        assert!(!lock_path(dir.path()).exists());
    }

    #[test]
    fn test_release_without_lock_is_noop() {
        let dir = tempdir().unwrap();
        assert!(!LockManager::new().release(dir.path()).unwrap());
    }

    #[test]
    fn test_is_locked_reflects_liveness() {
        let dir = tempdir().unwrap();
        assert!(!manager_with_alive(&[4242]).is_locked(dir.path()));

        write_lock(dir.path(), 4242, "X");
        assert!(manager_with_alive(&[4242]).is_locked(dir.path()));
        assert!(!manager_with_alive(&[]).is_locked(dir.path()));
    }

    #[test]
    fn test_force_remove_ignores_ownership() {
        let dir = tempdir().unwrap();
        write_lock(dir.path(), 4242, "OTHER");
        let manager = manager_with_alive(&[4242]);
        assert!(manager.force_remove(dir.path()).unwrap());
        assert!(manager.read_lock_info(dir.path()).is_none());
        assert!(!manager.force_remove(dir.path()).unwrap());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let dir = tempdir().unwrap();
        let manager = LockManager::new();
        {
            let guard = LockGuard::acquire(&manager, dir.path(), "HLN-1", "run").unwrap();
            assert_eq!(guard.info().issue_id, "HLN-1");
            assert!(lock_path(dir.path()).exists());
        }
        assert!(!lock_path(dir.path()).exists());
    }

    #[test]
    fn test_guard_reports_holder() {
        let dir = tempdir().unwrap();
        write_lock(dir.path(), 4242, "BUSY-1");
        let manager = manager_with_alive(&[4242]);
        let err = LockGuard::acquire(&manager, dir.path(), "HLN-1", "run")
            .err()
            .unwrap();
        let lock_err = err.downcast_ref::<LockError>().unwrap();
        assert_eq!(lock_err.issue_id, "BUSY-1");
        assert_eq!(lock_err.pid, 4242);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_liveness() {
        assert!(SignalLiveness.is_alive(std::process::id()));
        // Linux never hands out pids at or above PID_MAX_LIMIT (2^22).
        assert!(!SignalLiveness.is_alive(4_194_304));
        assert!(!SignalLiveness.is_alive(0));
    }
}
