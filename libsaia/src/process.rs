use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

use super::config::Config;
use super::constants::WATCHER_STOP_CHECK_INTERVAL;
use super::error::{HistogramError, ImageError, PeakError, ProcessorError};
use super::export::save_histogram;
use super::histogram::SignalHistogram;
use super::image::ImageLoader;
use super::watch_event::{IngestStatus, WatchEvent};
use super::watcher::DirWatcher;

/// Measure one image, add it to the histogram and refresh the threshold
pub fn process_image(
    path: &Path,
    loader: &ImageLoader,
    histogram: &mut SignalHistogram,
) -> Result<IngestStatus, ProcessorError> {
    let record = loader.measure(path)?;
    let file_id = record.file_id.clone();
    let signal = record.signal;
    histogram.append(record);

    let refresh = histogram.refresh()?;
    match refresh.warning {
        // Expected until both background and atom images have been seen
        Some(HistogramError::PeakError(PeakError::PeakSearchFailed { found, .. })) if found < 2 => {
            spdlog::debug!("Only {found} histogram peaks so far, keeping threshold {}", refresh.threshold)
        }
        Some(e) => spdlog::warn!("Threshold not updated after {}: {e}", path.display()),
        None => (),
    }

    Ok(IngestStatus::new(
        histogram.len(),
        file_id,
        signal,
        histogram.classify(signal),
        histogram.threshold(),
    ))
}

/// Image errors skip that image; everything else stops processing
fn skip_or_fail(
    path: &Path,
    result: Result<IngestStatus, ProcessorError>,
) -> Result<Option<IngestStatus>, ProcessorError> {
    match result {
        Ok(status) => Ok(Some(status)),
        Err(ProcessorError::ImageError(e)) => {
            if let ImageError::InvalidRoi { .. } | ImageError::ShapeMismatch { .. } = e {
                spdlog::error!("Skipping {}: {e}", path.display());
            } else {
                spdlog::warn!("Skipping {}: {e}", path.display());
            }
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Feed watcher events into the histogram until `limit` images have been added, `stop` is
/// raised, or the watcher goes away.
///
/// An IngestStatus is sent to `tx` for every image added. Returns the number of images added.
pub fn process_stream(
    events: &Receiver<WatchEvent>,
    loader: &ImageLoader,
    histogram: &mut SignalHistogram,
    tx: &Sender<IngestStatus>,
    limit: Option<usize>,
    stop: &AtomicBool,
) -> Result<usize, ProcessorError> {
    let mut n_added = 0;
    while !stop.load(Ordering::SeqCst) && limit.map_or(true, |limit| n_added < limit) {
        let event = match events.recv_timeout(WATCHER_STOP_CHECK_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match event {
            WatchEvent::ImageReady { path, timings } => {
                spdlog::debug!(
                    "{} ready after idle {:?}, write {:?}, copy {:?}, event {:?}",
                    path.display(),
                    timings.idle,
                    timings.write,
                    timings.copy,
                    timings.event
                );
                if let Some(status) = skip_or_fail(&path, process_image(&path, loader, histogram))? {
                    tx.send(status)?;
                    n_added += 1;
                }
            }
            WatchEvent::Failed { path, reason } => {
                spdlog::warn!("Watcher skipped {}: {reason}", path.display());
            }
        }
    }
    Ok(n_added)
}

/// Rebuild a histogram from images that are already on disk. Unreadable images are logged
/// and skipped. Returns the number of images added.
pub fn process_files(
    paths: &[PathBuf],
    loader: &ImageLoader,
    histogram: &mut SignalHistogram,
    tx: &Sender<IngestStatus>,
) -> Result<usize, ProcessorError> {
    let mut n_added = 0;
    for path in paths {
        if let Some(status) = skip_or_fail(path, process_image(path, loader, histogram))? {
            tx.send(status)?;
            n_added += 1;
        }
    }
    spdlog::info!("Added {} of {} images", n_added, paths.len());
    Ok(n_added)
}

/// Image files in a directory, sorted by name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, ProcessorError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Save the histogram to `results_path/<name>.csv` and log its summary
fn finish_run(config: &Config, histogram: &SignalHistogram, name: &str) -> Result<(), ProcessorError> {
    let summary = histogram.summary();
    spdlog::info!(
        "{} images, {} above threshold {}, loading probability {:.3} (-{:.3}/+{:.3})",
        summary.images_processed,
        summary.above_threshold,
        summary.threshold,
        summary.loading_probability,
        summary.loading_error_lower,
        summary.loading_error_upper
    );
    if let Some(fidelity) = summary.fidelity {
        spdlog::info!("Fidelity {:.4} +/- {:.4}", fidelity.value, fidelity.error);
    }
    if histogram.is_empty() {
        spdlog::warn!("No images were processed, nothing to save");
        return Ok(());
    }
    std::fs::create_dir_all(&config.results_path)?;
    save_histogram(histogram, &config.get_results_file(name))?;
    Ok(())
}

/// The main loop of live acquisition.
///
/// Starts a directory watcher for the config and adds each new image to a fresh histogram
/// until `limit` images have been processed or `stop` is raised. Then stops the watcher and
/// saves the histogram as `results_path/<name>.csv`.
pub fn process_acquisition(
    config: &Config,
    name: &str,
    limit: Option<usize>,
    stop: &AtomicBool,
    tx: &Sender<IngestStatus>,
) -> Result<SignalHistogram, ProcessorError> {
    config.validate()?;
    let loader = ImageLoader::new(&config.image);
    let mut histogram = SignalHistogram::new(&config.histogram)?;

    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher = DirWatcher::start(config, event_tx)?;
    let result = process_stream(&event_rx, &loader, &mut histogram, tx, limit, stop);
    watcher.stop()?;
    result?;

    finish_run(config, &histogram, name)?;
    Ok(histogram)
}

/// Rebuild a histogram from every image in `image_dir` and save it as
/// `results_path/<name>.csv`
pub fn process_directory(
    config: &Config,
    image_dir: &Path,
    name: &str,
    tx: &Sender<IngestStatus>,
) -> Result<SignalHistogram, ProcessorError> {
    let loader = ImageLoader::new(&config.image);
    let mut histogram = SignalHistogram::new(&config.histogram)?;
    let paths = list_images(image_dir)?;
    spdlog::info!("Reprocessing {} images from {}", paths.len(), image_dir.display());
    process_files(&paths, &loader, &mut histogram, tx)?;
    finish_run(config, &histogram, name)?;
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageConfig;
    use crate::watch_event::EventTimings;

    fn write_images(dir: &Path, signals: &[u32]) -> Vec<PathBuf> {
        signals
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let path = dir.join(format!("Cs-133_16Oct2026_{i}.asc"));
                std::fs::write(&path, format!("0 {s} 0\n1 0 0\n")).unwrap();
                path
            })
            .collect()
    }

    fn whole_image_loader() -> ImageLoader {
        ImageLoader::new(&ImageConfig::default())
    }

    #[test]
    fn test_process_files_skips_bad_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_images(dir.path(), &[10, 12, 11, 98, 101, 99, 13]);
        let bad = dir.path().join("Cs-133_16Oct2026_99.asc");
        std::fs::write(&bad, "").unwrap();
        paths.insert(2, bad);

        let mut histogram = SignalHistogram::default();
        histogram.set_auto_bins(Some(10));
        let (tx, rx) = mpsc::channel();
        let n = process_files(&paths, &whole_image_loader(), &mut histogram, &tx).unwrap();
        assert_eq!(n, 7);
        assert_eq!(histogram.len(), 7);

        let statuses: Vec<IngestStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 7);
        assert_eq!(statuses[0].file_id, "0");
        assert_eq!(statuses[0].signal, 10.0);
        let last = statuses.last().unwrap();
        assert!(last.threshold > 13.0 && last.threshold < 98.0);
        assert!(!last.atom_present);
    }

    #[test]
    fn test_process_stream_stops_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), &[5, 6, 7]);
        let (event_tx, event_rx) = mpsc::channel();
        event_tx
            .send(WatchEvent::Failed {
                path: dir.path().join("lost.asc"),
                reason: String::from("write timeout"),
            })
            .unwrap();
        for path in paths {
            event_tx
                .send(WatchEvent::ImageReady {
                    path,
                    timings: EventTimings::default(),
                })
                .unwrap();
        }

        let mut histogram = SignalHistogram::default();
        let (tx, rx) = mpsc::channel();
        let stop = AtomicBool::new(false);
        let n = process_stream(
            &event_rx,
            &whole_image_loader(),
            &mut histogram,
            &tx,
            Some(2),
            &stop,
        )
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(rx.try_iter().count(), 2);
        // the third image is still waiting in the channel
        assert!(event_rx.try_recv().is_ok());
    }

    #[test]
    fn test_process_stream_ends_with_watcher() {
        let (event_tx, event_rx) = mpsc::channel();
        drop(event_tx);
        let mut histogram = SignalHistogram::default();
        let (tx, _rx) = mpsc::channel();
        let stop = AtomicBool::new(false);
        let n = process_stream(&event_rx, &whole_image_loader(), &mut histogram, &tx, None, &stop)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_process_stream_honours_stop() {
        let (_event_tx, event_rx) = mpsc::channel();
        let mut histogram = SignalHistogram::default();
        let (tx, _rx) = mpsc::channel();
        let stop = AtomicBool::new(true);
        let n = process_stream(&event_rx, &whole_image_loader(), &mut histogram, &tx, None, &stop)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_process_directory_saves_results() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        write_images(&images, &[10, 12, 98, 101]);

        let mut config = Config::default();
        config.results_path = dir.path().join("results");
        let (tx, _rx) = mpsc::channel();
        let histogram = process_directory(&config, &images, "run1", &tx).unwrap();
        assert_eq!(histogram.len(), 4);
        assert!(config.get_results_file("run1").exists());
    }
}
