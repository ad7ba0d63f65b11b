use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::{io, ptr, slice};

use courier_common::error::{Error, Result};

/// What a produce request names as the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Map the named file and pin it in memory for the transfer
    File(PathBuf),
    /// Stream the producer's stdin; no view of the bytes ever materializes
    Stdin,
}

impl SourceSpec {
    /// `-` selects stdin streaming, anything else names a file.
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            SourceSpec::Stdin
        } else {
            SourceSpec::File(PathBuf::from(raw))
        }
    }
}

/// Read-only, swap-pinned view of the payload file.
///
/// The pages are locked before the transfer reads a single byte and released
/// (unlocked, unmapped) when the value drops, on every exit path.
#[derive(Debug)]
pub struct MappedSecret {
    base: *mut libc::c_void,
    len: usize,
}

impl MappedSecret {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::Source)?;
        let len = file.metadata().map_err(Error::Source)?.len() as usize;

        // An empty payload has nothing to map; mmap rejects length zero.
        if len == 0 {
            return Ok(Self {
                base: ptr::null_mut(),
                len: 0,
            });
        }

        // SAFETY: fresh read-only private mapping over a file we just
        // opened; the descriptor may close afterwards, the mapping stays.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(Error::Source(io::Error::last_os_error()));
        }

        // Pin before anything reads the pages. A denied mlock aborts the
        // transfer; serving swappable memory instead is not an option.
        // SAFETY: base/len describe the mapping created above.
        if unsafe { libc::mlock(base, len) } < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: unmapping the region we just mapped.
            unsafe { libc::munmap(base, len) };
            return Err(Error::Lock(err));
        }

        Ok(Self { base, len })
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: the mapping is live and read-only for self's lifetime.
        unsafe { slice::from_raw_parts(self.base as *const u8, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedSecret {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: releasing the mapping created in open(); there is nothing
        // useful to do with an error on the way out.
        unsafe {
            libc::munlock(self.base, self.len);
            libc::munmap(self.base, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dash_means_stdin() {
        assert_eq!(SourceSpec::parse("-"), SourceSpec::Stdin);
        assert_eq!(
            SourceSpec::parse("/tmp/x"),
            SourceSpec::File(PathBuf::from("/tmp/x"))
        );
    }

    #[test]
    fn mapping_mirrors_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload: Vec<u8> = (0..8192u32).flat_map(|i| i.to_le_bytes()).collect();
        file.write_all(&payload).unwrap();

        let secret = MappedSecret::open(file.path()).unwrap();
        assert_eq!(secret.len(), payload.len());
        assert_eq!(secret.as_bytes(), &payload[..]);
    }

    #[test]
    fn empty_file_maps_to_the_empty_source() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let secret = MappedSecret::open(file.path()).unwrap();
        assert!(secret.is_empty());
        assert!(secret.as_bytes().is_empty());
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let err = MappedSecret::open(Path::new("/nonexistent/courier-test")).unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }
}
