use std::io::{Read, Write};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use switchyard_mux::{BackendError, TermSize};
use thiserror::Error;

/// Errors from PTY operations.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),

    #[error("PTY I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
}

impl From<PtyError> for BackendError {
    fn from(err: PtyError) -> Self {
        match err {
            PtyError::SpawnFailed(msg) => BackendError::SpawnFailed(msg),
            PtyError::IoError(err) => BackendError::Io(err),
            PtyError::ResizeFailed(msg) => BackendError::ResizeFailed(msg),
        }
    }
}

pub(crate) fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// A spawned child process and the master side of its PTY.
///
/// The slave side is closed once the child holds it, so the reader sees EOF
/// (or `EIO`) when the child exits.
pub struct PtyHandle {
    pub master: Box<dyn MasterPty + Send>,
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub child: Box<dyn Child + Send + Sync>,
}

impl PtyHandle {
    /// Open a PTY of `size` and run `cmd` on it.
    pub fn spawn(cmd: CommandBuilder, size: TermSize) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(size))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn command: {e}")))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader,
            writer,
            child,
        })
    }
}

/// Resize the PTY behind `master`.
pub fn resize(master: &dyn MasterPty, size: TermSize) -> Result<(), PtyError> {
    master
        .resize(pty_size(size))
        .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
}

/// Write bytes to the PTY (user input -> process).
pub fn write_all(writer: &mut dyn Write, data: &[u8]) -> Result<(), PtyError> {
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn sh() -> CommandBuilder {
        CommandBuilder::new("/bin/sh")
    }

    fn read_until(reader: &mut dyn Read, needle: &str) -> String {
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    output.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&output).contains(needle) {
                        break;
                    }
                }
            }
        }
        String::from_utf8_lossy(&output).into_owned()
    }

    #[test]
    fn test_spawn_pty() {
        let handle = PtyHandle::spawn(sh(), TermSize::default());
        assert!(handle.is_ok(), "Failed to spawn PTY: {:?}", handle.err());
        let mut handle = handle.unwrap();
        assert!(matches!(handle.child.try_wait(), Ok(None)));
        let _ = handle.child.kill();
    }

    #[test]
    fn test_write_read_echo() {
        let mut handle = PtyHandle::spawn(sh(), TermSize::default()).unwrap();

        write_all(handle.writer.as_mut(), b"echo SWITCHYARD_TEST_OK\n").unwrap();
        let text = read_until(handle.reader.as_mut(), "SWITCHYARD_TEST_OK");

        assert!(
            text.contains("SWITCHYARD_TEST_OK"),
            "Expected output to contain SWITCHYARD_TEST_OK, got: {text}"
        );
        let _ = handle.child.kill();
    }

    #[test]
    fn test_resize() {
        let mut handle = PtyHandle::spawn(sh(), TermSize::default()).unwrap();
        let result = resize(handle.master.as_ref(), TermSize::new(120, 40).unwrap());
        assert!(result.is_ok(), "Resize failed: {:?}", result.err());
        let _ = handle.child.kill();
    }

    #[test]
    fn test_child_exit_code() {
        let mut handle = PtyHandle::spawn(sh(), TermSize::default()).unwrap();
        write_all(handle.writer.as_mut(), b"exit 3\n").unwrap();

        let mut reader = std::mem::replace(&mut handle.reader, Box::new(std::io::empty()));
        let drain = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 {
                    return;
                }
            }
        });
        let _ = drain.join();

        let status = handle.child.wait().unwrap();
        assert_eq!(status.exit_code(), 3);
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let result = PtyHandle::spawn(
            CommandBuilder::new("/definitely/not/a/program"),
            TermSize::default(),
        );
        assert!(matches!(result, Err(PtyError::SpawnFailed(_))));
    }
}
