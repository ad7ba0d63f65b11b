use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use courier_common::config;
use courier_common::error::{Error, Result};
use uuid::Uuid;

/// Anonymous, unlinkable file the received payload lands in before a
/// follow-up command takes over.
///
/// The file never has a directory entry. Its only name is the
/// `/proc/self/fd/<n>` path, which resolves through this process's own
/// descriptor table and stops existing when every holder of the descriptor
/// closes it. No third process can reach the payload through it.
pub struct HandoffFile {
    file: File,
}

impl HandoffFile {
    /// Creates the anonymous file in the memory-backed handoff directory.
    pub fn create() -> Result<Self> {
        let dir = config::handoff_dir();
        let file = match open_anonymous(&dir) {
            Ok(file) => file,
            // Kernels or filesystems without O_TMPFILE: a privately named
            // file, unlinked before any payload byte arrives, restores the
            // no-directory-entry property.
            Err(e) if matches!(e.raw_os_error(), Some(libc::EOPNOTSUPP) | Some(libc::EISDIR)) => {
                tracing::debug!(dir = %dir.display(), "O_TMPFILE unsupported, using unlinked fallback");
                open_unlinked(&dir).map_err(Error::Handoff)?
            }
            Err(e) => return Err(Error::Handoff(e)),
        };

        // std opens everything close-on-exec; this descriptor has to survive
        // exec or the published path resolves to nothing in the command.
        // SAFETY: clearing fd flags on a descriptor we own.
        if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETFD, 0) } < 0 {
            return Err(Error::Handoff(io::Error::last_os_error()));
        }

        Ok(Self { file })
    }

    /// Descriptor the transfer engine writes the payload into.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// The process-relative path a launched command opens the payload through.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(format!("/proc/self/fd/{}", self.file.as_raw_fd()))
    }

    /// Replaces the current process with `argv`, publishing the payload path
    /// under [`config::HANDOFF_ENV_KEY`]. Returns only on failure.
    pub fn exec(self, argv: &[OsString]) -> Error {
        let Some((program, rest)) = argv.split_first() else {
            return Error::Handoff(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no command to execute",
            ));
        };
        let mut command = Command::new(program);
        command
            .args(rest)
            .env(config::HANDOFF_ENV_KEY, self.path());
        let err = command.exec();
        Error::Handoff(err)
    }
}

fn open_anonymous(dir: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .mode(0o600)
        .custom_flags(libc::O_TMPFILE | libc::O_EXCL | libc::O_NONBLOCK)
        .open(dir)
}

fn open_unlinked(dir: &Path) -> io::Result<File> {
    let path = dir.join(format!("courier-{}", Uuid::new_v4()));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&path)?;
    fs::remove_file(&path)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn artifact_has_no_directory_entry() {
        let handoff = HandoffFile::create().unwrap();
        assert_eq!(handoff.file().metadata().unwrap().nlink(), 0);
    }

    #[test]
    fn proc_path_resolves_to_the_artifact() {
        let handoff = HandoffFile::create().unwrap();
        handoff.file().write_all(b"hello").unwrap();
        assert_eq!(fs::read(handoff.path()).unwrap(), b"hello");
    }

    #[test]
    fn path_dies_with_the_descriptor() {
        let handoff = HandoffFile::create().unwrap();
        let path = handoff.path();
        let ino = handoff.file().metadata().unwrap().ino();
        drop(handoff);
        // The descriptor number may be recycled by a concurrent test, but it
        // can never resolve to the dropped artifact again.
        if let Ok(meta) = fs::metadata(&path) {
            assert_ne!(meta.ino(), ino);
        }
    }

    #[test]
    fn exec_with_no_command_reports_handoff_failure() {
        let handoff = HandoffFile::create().unwrap();
        assert!(matches!(handoff.exec(&[]), Error::Handoff(_)));
    }

    #[test]
    fn descriptor_survives_into_children() {
        let handoff = HandoffFile::create().unwrap();
        handoff.file().write_all(b"classified").unwrap();

        // A spawned child resolves /proc/self/fd/<n> against its own
        // descriptor table; the inherited descriptor makes that work.
        let output = Command::new("cat").arg(handoff.path()).output().unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"classified");
    }
}
