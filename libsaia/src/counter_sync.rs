use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config::Config;
use super::error::CounterSyncError;

/// Reads the file number published by the experiment control software (Dexter).
///
/// The control software rewrites the sync file for every run, and the file is briefly empty
/// while that happens. Reads that come back empty or unparsable are retried every
/// `retry_interval` up to `max_attempts` times.
///
/// If the number has not changed since the previous image, the control software has not
/// caught up yet and the next number is used instead. This is a best-effort guess; the
/// resolved number is remembered for the next comparison.
#[derive(Debug)]
pub struct CounterSync {
    path: PathBuf,
    last: Option<u64>,
    retry_interval: Duration,
    max_attempts: u32,
}

impl CounterSync {
    pub fn new(path: &Path, retry_interval: Duration, max_attempts: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            last: None,
            retry_interval,
            max_attempts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.dexter_sync_file,
            config.watcher.counter_retry(),
            config.watcher.counter_max_attempts,
        )
    }

    /// The most recently resolved file number
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Read the sync file and resolve the number for the next image
    pub fn next_file_number(&mut self) -> Result<u64, CounterSyncError> {
        let published = self.read_published()?;
        let resolved = match self.last {
            Some(last) if last == published => {
                spdlog::debug!(
                    "File number {} has not been updated yet, using {}",
                    published,
                    published + 1
                );
                published + 1
            }
            _ => published,
        };
        self.last = Some(resolved);
        Ok(resolved)
    }

    fn read_published(&self) -> Result<u64, CounterSyncError> {
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                std::thread::sleep(self.retry_interval);
            }
            if let Ok(contents) = std::fs::read_to_string(&self.path) {
                if let Ok(number) = contents.trim().parse::<u64>() {
                    return Ok(number);
                }
            }
        }
        Err(CounterSyncError::ExternalCounterUnavailable {
            path: self.path.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_in(dir: &Path, contents: &str) -> CounterSync {
        let path = dir.join("dexter_sync.txt");
        std::fs::write(&path, contents).unwrap();
        CounterSync::new(&path, Duration::from_millis(1), 5)
    }

    #[test]
    fn test_unchanged_number_is_incremented() {
        let dir = tempfile::tempdir().unwrap();
        let mut sync = sync_in(dir.path(), "42");
        assert_eq!(sync.next_file_number().unwrap(), 42);
        assert_eq!(sync.next_file_number().unwrap(), 43);
        assert_eq!(sync.last(), Some(43));
    }

    #[test]
    fn test_updated_number_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut sync = sync_in(dir.path(), "42\n");
        assert_eq!(sync.next_file_number().unwrap(), 42);
        std::fs::write(dir.path().join("dexter_sync.txt"), "44").unwrap();
        assert_eq!(sync.next_file_number().unwrap(), 44);
    }

    #[test]
    fn test_empty_file_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let mut sync = sync_in(dir.path(), "");
        match sync.next_file_number() {
            Err(CounterSyncError::ExternalCounterUnavailable { attempts, .. }) => {
                assert_eq!(attempts, 5)
            }
            other => panic!("expected ExternalCounterUnavailable, got {other:?}"),
        }
        assert_eq!(sync.last(), None);
    }

    #[test]
    fn test_file_filled_during_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dexter_sync.txt");
        std::fs::write(&path, "").unwrap();
        let mut sync = CounterSync::new(&path, Duration::from_millis(5), 400);
        let writer = {
            let path = path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                std::fs::write(path, "7").unwrap();
            })
        };
        assert_eq!(sync.next_file_number().unwrap(), 7);
        writer.join().unwrap();
    }
}
