//! # saia
//!
//! saia is a single atom image analyser, written in Rust. It watches the directory an
//! EMCCD camera writes its images to, stores each new image under a name synchronized with
//! the experiment control software (Dexter), and builds a histogram of the per-image signal
//! in a region of interest. The histogram has two peaks, one for images without an atom and
//! one for images with an atom, and saia places the threshold between them that maximizes
//! the detection fidelity.
//!
//! ## Installation
//!
//! Currently the only method of install is from source. If you have not used Rust before,
//! you will most likely need to install the Rust tool chain. See the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! To build and install the CLI use `cargo install --path ./saia_cli` from the top level
//! repository. The binary will be installed to your cargo install location (typically
//! something like `~/.cargo/bin/`).
//!
//! ## Configuration
//!
//! The CLI reads a YAML configuration file. A template can be made with
//! `saia_cli -p config.yml new`. The format is as follows:
//!
//! ```yml
//! image_storage_path: /data/images
//! log_file_path: /data/logs
//! dexter_sync_file: /data/dexter/sync.txt
//! image_read_path: /data/camera
//! results_path: /data/results
//! active_watcher: true
//! species_label: Cs-133
//! image:
//!   strip_index_column: true
//!   pic_size: null
//!   roi:
//!     center_x: 30
//!     center_y: 32
//!     size: 4
//!   signal_mode: sum
//! histogram:
//!   fixed_bins: null
//!   auto_bin_count: null
//!   threshold_method: max_fidelity
//!   manual_threshold: null
//!   fidelity_samples: 100
//! watcher:
//!   poll_interval_ms: 10
//!   write_timeout_ms: 5000
//!   copy_timeout_ms: 5000
//!   counter_retry_ms: 1
//!   counter_max_attempts: 1000
//!   copy_retry_ms: 200
//!   delete_retry_ms: 500
//! ```
//!
//! - `image_read_path`: the directory the camera software writes new images to. Every file
//! created here is treated as a new image.
//! - `dexter_sync_file`: a text file holding the current file number of the experiment
//! control software. It should not be inside `image_read_path`.
//! - `image_storage_path`: images are copied to `<image_storage_path>/<year>/<Month>/<day>/`
//! as `<species_label>_<DDMonYYYY>_<file number>.<ext>`.
//! - `active_watcher`: if false, new images are read where they are and are not copied,
//! renamed, or deleted.
//! - `image.roi`: the signal is taken from a `size` x `size` square starting at
//! `center - size / 2`. If null, the whole image is used.
//! - `histogram.manual_threshold`: if set, the threshold is fixed at this value rather than
//! estimated from the histogram.
//!
//! ## Output
//!
//! Histograms are saved to `results_path` as CSV files. The first line holds the threshold
//! (`# threshold=<value>`), followed by one row per image with the columns
//! `file_id,signal,atom_present,max_count,centroid_x,centroid_y,background_mean,background_std`.
//! A log file, `saia.log`, is written to `log_file_path`.
pub mod config;
pub mod constants;
pub mod counter_sync;
pub mod error;
pub mod export;
pub mod fidelity;
pub mod gaussian_fit;
pub mod histogram;
pub mod image;
pub mod measurement;
pub mod peak_finder;
pub mod process;
pub mod roi;
pub mod watch_event;
pub mod watcher;
