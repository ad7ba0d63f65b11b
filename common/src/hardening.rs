use nix::sys::resource::{setrlimit, Resource};

use crate::error::{errno_io, Error, Result};

/// Forbids core-dump generation for the calling process.
///
/// Both orchestrators call this before any secret byte is read or received,
/// so a crash mid-transfer cannot leave payload material in a core file.
pub fn disable_core_dumps() -> Result<()> {
    setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(|e| Error::Hardening(errno_io(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::resource::getrlimit;

    #[test]
    fn core_limit_drops_to_zero() {
        disable_core_dumps().unwrap();
        let (soft, hard) = getrlimit(Resource::RLIMIT_CORE).unwrap();
        assert_eq!(soft, 0);
        assert_eq!(hard, 0);
    }
}
