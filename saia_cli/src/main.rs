use clap::{value_parser, Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use libsaia::config::Config;
use libsaia::histogram::SignalHistogram;
use libsaia::process::{process_acquisition, process_directory};
use libsaia::watch_event::IngestStatus;

fn make_template_config(path: &Path) {
    let config = Config::default();
    config
        .write_config_file(path)
        .expect("Failed to write template config file!");
}

/// Send everything the library logs to saia.log in the configured log directory
fn init_file_logging(config: &Config) {
    let log_path = config.get_log_file();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).expect("Could not create the log directory!");
    }
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(log_path)
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(false)
            .build()
            .expect("Could not create the log file!"),
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()
            .expect("Could not create the file logger!"),
    );
    spdlog::set_default_logger(logger);
    spdlog::info!("Starting saia CLI");
}

/// Raise `stop` once a line is read. EOF or a read error leaves it down.
fn stop_on_enter(mut input: impl BufRead, stop: &AtomicBool) {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => stop.store(true, Ordering::SeqCst),
        Ok(_) => log::warn!(
            "Stdin is closed; watching until the process is killed (use --count to stop after N images)"
        ),
        Err(e) => log::error!("Could not read stdin, Enter will not stop the watcher: {e}"),
    }
}

fn status_message(status: &IngestStatus) -> String {
    format!(
        "image {} signal {:.1} {} (threshold {:.1})",
        status.file_id,
        status.signal,
        if status.atom_present {
            "atom"
        } else {
            "empty"
        },
        status.threshold
    )
}

fn report(histogram: &SignalHistogram) {
    let summary = histogram.summary();
    log::info!(
        "Processed {} images, {} above threshold {:.2}",
        summary.images_processed,
        summary.above_threshold,
        summary.threshold
    );
    log::info!(
        "Loading probability: {:.3} (-{:.3}/+{:.3})",
        summary.loading_probability,
        summary.loading_error_lower,
        summary.loading_error_upper
    );
    log::info!(
        "Background: {:.1} +/- {:.1}, Signal: {:.1} +/- {:.1}",
        summary.background_mean,
        summary.background_std,
        summary.signal_mean,
        summary.signal_std
    );
    if let (Some(separation), Some(snr)) = (summary.separation, summary.signal_to_noise) {
        log::info!("Peak separation: {separation:.1}, S/N: {snr:.2}");
    }
    match summary.fidelity {
        Some(fidelity) => log::info!("Fidelity: {:.4} +/- {:.4}", fidelity.value, fidelity.error),
        None => log::warn!("Could not find both peaks; fidelity is undefined"),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("saia_cli")
        .about("Single atom image analysis")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("watch")
                .about("Watch the image directory and build a histogram of new images")
                .arg(
                    Arg::new("count")
                        .short('c')
                        .long("count")
                        .value_parser(value_parser!(usize))
                        .help("Stop after this many images (default: stop on Enter)"),
                ),
        )
        .subcommand(
            Command::new("reprocess")
                .about("Build a histogram from images that are already stored")
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .required(true)
                        .help("Directory of stored images"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .default_value("histogram")
                .help("Name of the saved histogram file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));
    let name = matches
        .get_one::<String>("name")
        .expect("Name has a default")
        .clone();

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Image Read Path: {}", config.image_read_path.to_string_lossy());
    log::info!(
        "Image Storage Path: {}",
        config.image_storage_path.to_string_lossy()
    );
    log::info!("Dexter Sync File: {}", config.dexter_sync_file.to_string_lossy());
    log::info!("Results Path: {}", config.results_path.to_string_lossy());
    log::info!("Active Watcher: {}", config.active_watcher);
    match config.image.roi {
        Some(roi) => log::info!(
            "ROI: centre ({}, {}) size {}",
            roi.center_x,
            roi.center_y,
            roi.size
        ),
        None => log::info!("ROI: whole image"),
    }
    init_file_logging(&config);

    // Setup the progress spinner
    let pb = pb_manager.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} images {msg}")
            .expect("Bad progress template"),
    );
    let (tx, rx) = mpsc::channel::<IngestStatus>();
    let stop = Arc::new(AtomicBool::new(false));

    // Spawn the task!
    let handle = match matches.subcommand() {
        Some(("watch", args)) => {
            let limit = args.get_one::<usize>("count").copied();
            if limit.is_none() {
                log::info!("Watching for new images. Press Enter to stop.");
                let stop = stop.clone();
                std::thread::spawn(move || stop_on_enter(std::io::stdin().lock(), &stop));
            }
            let stop = stop.clone();
            std::thread::spawn(move || process_acquisition(&config, &name, limit, &stop, &tx))
        }
        Some(("reprocess", args)) => {
            let dir = PathBuf::from(args.get_one::<String>("dir").expect("dir is required"));
            std::thread::spawn(move || process_directory(&config, &dir, &name, &tx))
        }
        _ => {
            log::error!("Unrecognized subcommand, see --help");
            return;
        }
    };

    loop {
        // No UI to drive updates, so poll the status channel a few times a second
        std::thread::sleep(Duration::from_millis(200));
        for status in rx.try_iter() {
            pb.set_position(status.images_processed as u64);
            pb.set_message(status_message(&status));
        }
        pb.tick();

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(histogram) => report(&histogram),
                    Err(e) => log::error!("Processing failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join processing task!"),
            }
            break;
        }
    }

    pb.finish();

    log::info!("Done.");
}
