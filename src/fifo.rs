//! Named pipe locations and the open/create helpers around them.

use crate::config_loader::expand_tilde;
use crate::error::FifoError;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

pub const INPUT_FIFO_NAME: &str = "tts_input.fifo";
pub const OUTPUT_FIFO_NAME: &str = "tts_output.fifo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl FifoPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            input: dir.join(INPUT_FIFO_NAME),
            output: dir.join(OUTPUT_FIFO_NAME),
        }
    }

    /// Uses `dir` when given, otherwise the per-user runtime directory.
    pub fn resolve(dir: Option<&str>) -> Self {
        let dir = dir.map(expand_tilde).unwrap_or_else(runtime_dir);
        Self::in_dir(&dir)
    }
}

/// `/run/user/<euid>` on Linux, the temp directory on macOS or when the
/// runtime directory is missing.
pub fn runtime_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        return std::env::temp_dir();
    }
    let run_user = PathBuf::from(format!("/run/user/{}", nix::unistd::geteuid()));
    if run_user.is_dir() {
        run_user
    } else {
        std::env::temp_dir()
    }
}

/// Creates the FIFO unless it already exists.
pub fn create_fifo(path: &Path) -> Result<(), FifoError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
        Ok(_) => return Err(FifoError::NotAFifo(path.to_path_buf())),
        Err(_) => {}
    }

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|source| {
        FifoError::Create {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::info!(path = %path.display(), "FIFO created");
    Ok(())
}

/// Opens the FIFO for reading. Blocks until a writer attaches.
pub fn open_reader(path: &Path) -> Result<File, FifoError> {
    File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => FifoError::Missing(path.to_path_buf()),
        _ => FifoError::Open {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Opens the FIFO for writing without blocking. Fails with `ENXIO` when no
/// reader is attached (see [`is_no_listener`]).
pub fn open_writer_nonblocking(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
}

/// Opens the FIFO for writing, failing fast like [`open_writer_nonblocking`]
/// when no reader is attached, then switches the descriptor back to blocking
/// so writes larger than the pipe buffer wait for the reader.
pub fn open_writer(path: &Path) -> io::Result<File> {
    let file = open_writer_nonblocking(path)?;
    let flags = OFlag::from_bits_truncate(fcntl(&file, FcntlArg::F_GETFL)?);
    fcntl(&file, FcntlArg::F_SETFL(flags - OFlag::O_NONBLOCK))?;
    Ok(file)
}

pub fn is_no_listener(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::ENXIO as i32)
}

/// Briefly attaches a writer so a reader blocked in `open` returns.
pub fn wake_reader(path: &Path) {
    match open_writer_nonblocking(path) {
        Ok(_) => tracing::debug!(path = %path.display(), "Woke FIFO reader"),
        Err(e) if is_no_listener(&e) => {}
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "Could not wake FIFO reader"),
    }
}
