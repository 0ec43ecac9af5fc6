//! Command-line front end.
//!
//! The core of the application lives in `duosync-core`; this crate's job,
//! the same as artid's `UI/cli` (`examples/gabo01-artid/UI/cli/src/main.rs`),
//! is only to parse arguments, wire them into the core, and translate the
//! result into an exit code.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};

use duosync_core::prelude::*;

mod errors;

use errors::CliError;

const SYNC_DB_NAME: &str = ".sync.ffs_db";

/// Bidirectional folder synchronizer.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file paths. Parsing `*.ffs_gui`/`*.ffs_batch`/
    /// `GlobalSettings.xml` is not supported in this build.
    config_files: Vec<PathBuf>,

    /// Open the config without executing. Stubbed: this build has no GUI
    /// config editor.
    #[arg(long = "edit")]
    edit: bool,

    /// Override/add a folder pair: `-dirpair <left> <right>`.
    #[arg(long = "dirpair", num_args = 2, value_names = ["LEFT", "RIGHT"])]
    dirpair: Option<Vec<PathBuf>>,

    /// Undocumented: interpret the given paths as filesystem locations to
    /// sync, resolving each to its parent folder if it names a file.
    #[arg(long = "sendto", num_args = 1..)]
    sendto: Option<Vec<PathBuf>>,
}

fn main() {
    if synclog::init("info").is_err() {
        println!("Unable to start the logging implementation");
        exit(3);
    }

    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            3
        }
    };
    exit(code);
}

/// Returns the process exit code per the CLI's contract: `0` success, `1`
/// finished with warnings, `2` aborted, `3` uncaught exception (the last of
/// these is produced by `main`, not here).
fn dispatch(cli: Cli) -> Result<i32, CliError> {
    if cli.edit {
        warn!("-edit: this build has no GUI config editor; nothing to do");
        return Ok(0);
    }

    if let Some(pair) = &cli.dirpair {
        if pair.len() != 2 {
            return Err(CliError::DirpairArity(pair.len()));
        }
        return sync_one_pair(&pair[0], &pair[1]);
    }

    if let Some(paths) = &cli.sendto {
        if paths.is_empty() {
            return Err(CliError::SendtoEmpty);
        }
        for path in paths {
            require_exists(path)?;
        }
        warn!("-sendto resolves against saved config jobs, which this build does not parse");
        return Err(CliError::ConfigFileUnsupported(paths[0].clone()));
    }

    if let Some(first) = cli.config_files.first() {
        return Err(CliError::ConfigFileUnsupported(first.clone()));
    }

    warn!("nothing to do: pass -dirpair <left> <right>, or a config file path");
    Ok(0)
}

fn require_exists(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::PathNotFound(path.to_path_buf()))
    }
}

/// Runs a single two-way synchronization between `left` and `right`, the
/// way `-dirpair` is specified to behave: an ad hoc pair not backed by any
/// saved configuration.
fn sync_one_pair(left: &Path, right: &Path) -> Result<i32, CliError> {
    require_exists(left)?;
    require_exists(right)?;

    info!(
        "Starting synchronization between {} and {} at {}",
        left.display(),
        right.display(),
        Utc::now().to_rfc3339()
    );

    let left_device = Device::new("left");
    let right_device = Device::new("right");
    let left_fs: Arc<dyn AbstractFs> = Arc::new(Local::new(left));
    let right_fs: Arc<dyn AbstractFs> = Arc::new(Local::new(right));

    let mut pair = BaseFolderPair::new(
        AbstractPath::root(left_device.clone()),
        AbstractPath::root(right_device.clone()),
        CompareVariant::ByTimeAndSize,
    );
    // Never treat our own last-synchronous-state file as something to sync.
    pair.filter = HardFilter::new(vec![], vec![format!("/{SYNC_DB_NAME}")]);

    let lssdb = load_lssdb(left_fs.as_ref(), right_fs.as_ref(), &left_device, &right_device);

    let options = RunOptions {
        mode: SyncMode::TwoWay,
        symlink_policy: SymlinkPolicy::Follow,
        deletion_policy_left: DeletionPolicy::Permanent,
        deletion_policy_right: DeletionPolicy::Permanent,
        copy_permissions: false,
        transactional: true,
        verify: false,
    };

    let error_sink = LoggingErrorSink;
    let progress = NullProgressSink;

    let report = run(&mut pair, left_fs.clone(), right_fs.clone(), lssdb.as_ref(), &options, &error_sink, &progress).map_err(CliError::Sync)?;

    if let Err(err) = save_lssdb(left_fs.as_ref(), right_fs.as_ref(), &left_device, &right_device, &report.updated_lssdb) {
        warn!("could not persist last-synchronous-state database: {}", err);
    }

    if report.failures > 0 {
        warn!("synchronization finished with {} failed item(s)", report.failures);
        return Ok(1);
    }

    info!("Synchronization performed successfully");
    Ok(0)
}

fn load_lssdb(left_fs: &dyn AbstractFs, right_fs: &dyn AbstractFs, left_device: &Device, right_device: &Device) -> Option<SyncFolder> {
    let left_path = AbstractPath::new(left_device.clone(), SYNC_DB_NAME);
    let right_path = AbstractPath::new(right_device.clone(), SYNC_DB_NAME);

    let left_bytes = read_all(left_fs, &left_path);
    let right_bytes = read_all(right_fs, &right_path);

    match lssdb_codec::load(left_bytes.as_deref(), right_bytes.as_deref()) {
        Ok(folder) => Some(folder),
        Err(_) => None,
    }
}

fn read_all(fs: &dyn AbstractFs, path: &AbstractPath) -> Option<Vec<u8>> {
    let mut stream = fs.read_stream(path).ok()?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).ok()?;
    Some(buf)
}

fn save_lssdb(left_fs: &dyn AbstractFs, right_fs: &dyn AbstractFs, left_device: &Device, right_device: &Device, folder: &SyncFolder) -> Result<(), SyncError> {
    let session = uuid::Uuid::new_v4();
    let (left_saved, right_saved) = lssdb_codec::save(folder, session);

    let left_path = AbstractPath::new(left_device.clone(), SYNC_DB_NAME);
    let right_path = AbstractPath::new(right_device.clone(), SYNC_DB_NAME);

    let mut left_stream = left_fs.write_stream(&left_path)?;
    left_stream
        .write_all(&left_saved.bytes)
        .map_err(|e| duosync_core::afs::AfsError::from_io(SYNC_DB_NAME, e))?;

    let mut right_stream = right_fs.write_stream(&right_path)?;
    right_stream
        .write_all(&right_saved.bytes)
        .map_err(|e| duosync_core::afs::AfsError::from_io(SYNC_DB_NAME, e))?;

    Ok(())
}

/// Logs every error through `log::error!` and always ignores, turning a
/// per-item failure into a counted warning rather than aborting the whole
/// run, matching artid's "log and keep going" batch-mode callback style.
struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn on_error(&self, path: &Path, error: &AfsError) -> ErrorResponse {
        error!("{}: {}", path.display(), error);
        ErrorResponse::Ignore
    }
}
