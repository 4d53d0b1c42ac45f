//! Watch the camera output directory and hand over each new image once it is safe to read.
//!
//! The camera software writes every image under the same file name. An active watcher waits
//! for the write to finish, copies the image into the dated storage directory under a name
//! built from the experiment control software's file number, waits for the copy to finish,
//! and deletes the original so the next image fires a new creation event. A silent watcher
//! only waits for the write to finish and reports the original path.
//!
//! Events are handled one at a time, to completion, on a single worker thread. Only one
//! watcher may run per storage directory; a second one could overwrite stored images.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

use super::config::Config;
use super::constants::WATCHER_STOP_CHECK_INTERVAL;
use super::counter_sync::CounterSync;
use super::error::WatcherError;
use super::watch_event::{EventTimings, WatchEvent};

/// Storage directories that currently have a running watcher
static ACTIVE_STORAGE_DIRS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Source of file sizes for the settle polling loop
pub trait SizeProbe {
    fn size(&mut self, path: &Path) -> io::Result<u64>;
}

/// Reads file sizes from the file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSizeProbe;

impl SizeProbe for FsSizeProbe {
    fn size(&mut self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Which file a settle poll is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStage {
    /// The original, written by the camera software
    Write,
    /// The copy in the storage directory
    Copy,
}

/// Poll the size of `path` every `interval` until two consecutive reads agree.
///
/// Returns the number of size reads made. A file that is still changing after `timeout`
/// fails with WriteTimeout or CopyTimeout depending on `stage`.
pub fn wait_for_settled_size<P: SizeProbe>(
    probe: &mut P,
    path: &Path,
    interval: Duration,
    timeout: Duration,
    stage: SettleStage,
) -> Result<usize, WatcherError> {
    let start = Instant::now();
    let mut last_size = probe.size(path)?;
    let mut polls = 1;
    loop {
        std::thread::sleep(interval);
        let size = probe.size(path)?;
        polls += 1;
        if size == last_size {
            return Ok(polls);
        }
        if start.elapsed() >= timeout {
            let waited = start.elapsed();
            return Err(match stage {
                SettleStage::Write => WatcherError::WriteTimeout {
                    path: path.to_path_buf(),
                    waited,
                },
                SettleStage::Copy => WatcherError::CopyTimeout {
                    path: path.to_path_buf(),
                    waited,
                },
            });
        }
        last_size = size;
    }
}

/// Run `op`, and run it once more after `delay` if the first attempt was refused permission.
/// Windows refuses access to a file the camera software still holds open.
fn retry_on_permission_denied<T>(
    delay: Duration,
    what: &str,
    path: &Path,
    mut op: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    match op() {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            spdlog::warn!(
                "Permission denied trying to {} {}, retrying in {:?}",
                what,
                path.display(),
                delay
            );
            std::thread::sleep(delay);
            op()
        }
        result => result,
    }
}

/// Date label used in stored image names, e.g. 16Oct2026
fn date_token(date: &OffsetDateTime) -> String {
    let month = date.month().to_string();
    format!("{:0>2}{}{}", date.day(), &month[..3], date.year())
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| {
        spdlog::warn!("Could not determine the local time offset, using UTC for image dates");
        OffsetDateTime::now_utc()
    })
}

/// Runs the per-event state machine. Owned by the watcher worker thread.
#[derive(Debug)]
pub struct EventHandler {
    active: bool,
    storage_dir: PathBuf,
    species_label: String,
    date_token: String,
    counter: CounterSync,
    probe: FsSizeProbe,
    poll_interval: Duration,
    write_timeout: Duration,
    copy_timeout: Duration,
    copy_retry: Duration,
    delete_retry: Duration,
    last_end: Instant,
}

impl EventHandler {
    /// Create a handler storing images under the dated directory for `date`
    pub fn new(config: &Config, date: &OffsetDateTime) -> Self {
        Self {
            active: config.active_watcher,
            storage_dir: config.get_storage_directory(date),
            species_label: config.species_label.clone(),
            date_token: date_token(date),
            counter: CounterSync::from_config(config),
            probe: FsSizeProbe,
            poll_interval: config.watcher.poll_interval(),
            write_timeout: config.watcher.write_timeout(),
            copy_timeout: config.watcher.copy_timeout(),
            copy_retry: config.watcher.copy_retry(),
            delete_retry: config.watcher.delete_retry(),
            last_end: Instant::now(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Name of the stored copy of `source` for file number `number`
    fn stored_name(&self, source: &Path, number: u64) -> String {
        match source.extension() {
            Some(ext) => format!(
                "{}_{}_{}.{}",
                self.species_label,
                self.date_token,
                number,
                ext.to_string_lossy()
            ),
            None => format!("{}_{}_{}", self.species_label, self.date_token, number),
        }
    }

    /// Take a newly created file through to an emitted path.
    ///
    /// Returns the path consumers should read and the stage durations.
    pub fn handle(&mut self, source: &Path) -> Result<(PathBuf, EventTimings), WatcherError> {
        let start = Instant::now();
        let mut timings = EventTimings {
            idle: start.duration_since(self.last_end),
            ..Default::default()
        };

        wait_for_settled_size(
            &mut self.probe,
            source,
            self.poll_interval,
            self.write_timeout,
            SettleStage::Write,
        )?;
        timings.write = start.elapsed();

        let ready_path = if self.active {
            let copy_start = Instant::now();
            let number = self.counter.next_file_number()?;
            let destination = self.storage_dir.join(self.stored_name(source, number));
            let n_bytes = retry_on_permission_denied(self.copy_retry, "copy", source, || {
                std::fs::copy(source, &destination)
            })?;
            wait_for_settled_size(
                &mut self.probe,
                &destination,
                self.poll_interval,
                self.copy_timeout,
                SettleStage::Copy,
            )?;
            timings.copy = copy_start.elapsed();

            retry_on_permission_denied(self.delete_retry, "delete", source, || {
                std::fs::remove_file(source)
            })?;
            spdlog::info!(
                "Stored {} as {} ({})",
                source.display(),
                destination.display(),
                human_bytes::human_bytes(n_bytes as f64)
            );
            destination
        } else {
            spdlog::info!("New image {}", source.display());
            source.to_path_buf()
        };

        self.last_end = Instant::now();
        timings.event = self.last_end.duration_since(start);
        Ok((ready_path, timings))
    }
}

/// Marks a storage directory as watched until dropped
#[derive(Debug)]
struct Registration(PathBuf);

impl Registration {
    fn claim(storage_path: &Path) -> Result<Self, WatcherError> {
        let key = std::fs::canonicalize(storage_path).unwrap_or_else(|_| storage_path.to_path_buf());
        let mut active = ACTIVE_STORAGE_DIRS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if active.contains(&key) {
            return Err(WatcherError::AlreadyActive(key));
        }
        active.push(key.clone());
        Ok(Self(key))
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut active = ACTIVE_STORAGE_DIRS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.retain(|dir| *dir != self.0);
    }
}

/// A running directory watcher.
///
/// Created with `start`, and stopped with `stop` or by dropping it. Stopping waits for the
/// event being handled to finish, so nothing is written to storage after it returns.
pub struct DirWatcher {
    backend: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    last_timings: Arc<Mutex<Option<EventTimings>>>,
    storage_dir: PathBuf,
    registration: Option<Registration>,
}

impl DirWatcher {
    /// Start watching `config.image_read_path`, sending a WatchEvent to `tx` for each new file.
    ///
    /// Fails with AlreadyActive if another watcher is running for the same storage path.
    pub fn start(config: &Config, tx: Sender<WatchEvent>) -> Result<Self, WatcherError> {
        let registration = Registration::claim(&config.image_storage_path)?;

        let mut handler = EventHandler::new(config, &local_now());
        let storage_dir = handler.storage_dir().to_path_buf();
        if config.active_watcher {
            std::fs::create_dir_all(&storage_dir)?;
        }

        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut backend = notify::recommended_watcher(move |res| {
            // Receiver is gone once the worker has stopped
            let _ = event_tx.send(res);
        })?;
        backend.watch(&config.image_read_path, RecursiveMode::NonRecursive)?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let last_timings = Arc::new(Mutex::new(None));
        let worker = {
            let stop_flag = stop_flag.clone();
            let last_timings = last_timings.clone();
            let sync_file = config.dexter_sync_file.clone();
            std::thread::spawn(move || {
                run_worker(
                    &mut handler,
                    event_rx,
                    tx,
                    &stop_flag,
                    &last_timings,
                    &sync_file,
                )
            })
        };

        spdlog::info!(
            "Watching {} ({}), storing images in {}",
            config.image_read_path.display(),
            if config.active_watcher {
                "active"
            } else {
                "silent"
            },
            storage_dir.display()
        );

        Ok(Self {
            backend: Some(backend),
            worker: Some(worker),
            stop_flag,
            last_timings,
            storage_dir,
            registration: Some(registration),
        })
    }

    /// Dated directory images are copied into
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Stage durations of the most recently completed event
    pub fn last_timings(&self) -> Option<EventTimings> {
        *self
            .last_timings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop watching and wait for the worker to finish the event it is handling
    pub fn stop(&mut self) -> Result<(), WatcherError> {
        self.backend.take();
        self.stop_flag.store(true, Ordering::SeqCst);
        let result = match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| WatcherError::WorkerPanicked),
            None => Ok(()),
        };
        if self.registration.take().is_some() {
            spdlog::info!("Stopped watcher for {}", self.storage_dir.display());
        }
        result
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            spdlog::error!("Error stopping watcher: {e}");
        }
    }
}

fn run_worker(
    handler: &mut EventHandler,
    events: mpsc::Receiver<notify::Result<Event>>,
    tx: Sender<WatchEvent>,
    stop_flag: &AtomicBool,
    last_timings: &Mutex<Option<EventTimings>>,
    sync_file: &Path,
) {
    while !stop_flag.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(WATCHER_STOP_CHECK_INTERVAL) {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                spdlog::error!("Directory notification error: {e}");
                continue;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if !matches!(event.kind, EventKind::Create(_)) {
            continue;
        }

        for path in event.paths {
            if path.is_dir() {
                continue;
            }
            if path == sync_file {
                spdlog::debug!("Ignoring update to the sync file {}", path.display());
                continue;
            }
            let message = match handler.handle(&path) {
                Ok((ready_path, timings)) => {
                    *last_timings
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(timings);
                    WatchEvent::ImageReady {
                        path: ready_path,
                        timings,
                    }
                }
                Err(e) => {
                    spdlog::error!("Failed to handle new file {}: {e}", path.display());
                    WatchEvent::Failed {
                        path,
                        reason: e.to_string(),
                    }
                }
            };
            if tx.send(message).is_err() {
                spdlog::warn!("Watch event receiver closed, stopping watcher worker");
                return;
            }
        }
    }
}
