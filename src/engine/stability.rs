//! Output stability detection.
//!
//! The application gives no completion signal, so the export is considered
//! written once the matching files in the staging directory stop changing for a
//! quiet period and all of them have reached the minimum size.
//!
//! Assumes a single writer: concurrent runs against the same directory are the
//! caller's responsibility.

use crate::model::FilePattern;
use crate::poll::wait_until;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Matching files of a directory ordered by name. Equal iff every file matches
/// on name, size and modification time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySignature {
    files: Vec<FileSnapshot>,
}

impl DirectorySignature {
    pub fn files(&self) -> &[FileSnapshot] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn all_at_least(&self, min_bytes: u64) -> bool {
        self.files.iter().all(|f| f.size >= min_bytes)
    }
}

/// Regular files in `dir` matching `pattern`, with their paths.
pub fn list_matching(dir: &Path, pattern: &FilePattern) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && pattern.matches(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Fingerprint the matching files of `dir`.
pub fn scan(dir: &Path, pattern: &FilePattern) -> std::io::Result<DirectorySignature> {
    let mut files = Vec::new();
    for path in list_matching(dir, pattern)? {
        // A file can disappear between listing and stat; it simply is not part
        // of this tick's signature.
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        files.push(FileSnapshot {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: meta.len(),
            modified: meta.modified().ok(),
        });
    }
    Ok(DirectorySignature { files })
}

pub struct StabilityMonitor {
    dir: PathBuf,
    pattern: FilePattern,
    min_bytes_per_file: u64,
    quiet_period: Duration,
    interval: Duration,
}

impl StabilityMonitor {
    pub fn new(
        dir: PathBuf,
        pattern: FilePattern,
        min_bytes_per_file: u64,
        quiet_period: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            dir,
            pattern,
            min_bytes_per_file,
            quiet_period,
            interval,
        }
    }

    /// True once at least one matching file exists, all matching files reach
    /// the minimum size, and the signature has not changed for the quiet period.
    /// False when `total_timeout` expires first.
    pub async fn await_stable(&self, total_timeout: Duration) -> bool {
        let mut last: Option<DirectorySignature> = None;
        let mut unchanged_since = Instant::now();

        let settled = wait_until(self.interval, total_timeout, || {
            let now = Instant::now();
            let current = match scan(&self.dir, &self.pattern) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::debug!(dir = %self.dir.display(), error = %e, "staging directory not readable yet");
                    DirectorySignature::default()
                }
            };
            if last.as_ref() != Some(&current) {
                tracing::trace!(files = current.files().len(), "output changed");
                last = Some(current);
                unchanged_since = now;
                return None;
            }
            let ready = !current.is_empty()
                && current.all_at_least(self.min_bytes_per_file)
                && now.duration_since(unchanged_since) >= self.quiet_period;
            ready.then_some(())
        })
        .await;

        settled.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn monitor(dir: &Path, min: u64) -> StabilityMonitor {
        StabilityMonitor::new(
            dir.to_path_buf(),
            FilePattern::extension("sav"),
            min,
            Duration::from_secs(2),
            Duration::from_millis(250),
        )
    }

    #[test]
    fn signature_tracks_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.sav"), b"12345").unwrap();
        fs::write(dir.path().join("a.SAV"), b"1").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::create_dir(dir.path().join("dir.sav")).unwrap();

        let sig = scan(dir.path(), &FilePattern::extension("sav")).unwrap();
        let names: Vec<_> = sig.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.SAV", "b.sav"]);
        assert!(sig.all_at_least(1));
        assert!(!sig.all_at_least(2));
    }

    #[test]
    fn signature_changes_with_size() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.sav");
        fs::write(&p, b"1").unwrap();
        let before = scan(dir.path(), &FilePattern::extension("sav")).unwrap();
        fs::write(&p, b"12").unwrap();
        let after = scan(dir.path(), &FilePattern::extension("sav")).unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_quiet_period() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sav"), vec![0u8; 64]).unwrap();
        let start = Instant::now();
        assert!(monitor(dir.path(), 10).await_stable(Duration::from_secs(30)).await);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn never_settles_while_files_keep_growing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.sav");
        fs::write(&path, vec![0u8; 64]).unwrap();

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                for i in 1..=40u64 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    let _ = fs::write(&path, vec![0u8; 64 + i as usize]);
                }
            })
        };

        let start = Instant::now();
        assert!(!monitor(dir.path(), 10).await_stable(Duration::from_secs(15)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        writer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn settles_no_earlier_than_quiet_period_after_last_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.sav");
        fs::write(&path, vec![0u8; 64]).unwrap();

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                for i in 1..=4u64 {
                    tokio::time::sleep(Duration::from_millis(700)).await;
                    let _ = fs::write(&path, vec![0u8; 64 + i as usize]);
                }
            })
        };

        let start = Instant::now();
        assert!(monitor(dir.path(), 10).await_stable(Duration::from_secs(30)).await);
        // Last write lands at 2.8s.
        assert!(start.elapsed() >= Duration::from_millis(2800) + Duration::from_secs(2));
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn undersized_files_never_settle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sav"), vec![0u8; 5]).unwrap();
        assert!(!monitor(dir.path(), 10).await_stable(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_directory_never_settles() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!monitor(dir.path(), 0).await_stable(Duration::from_secs(5)).await);
    }
}
