use std::{env, path::PathBuf};

/// The environment variable the handoff path is published under; a command
/// launched by the consumer reads the payload from the path found here.
pub const HANDOFF_ENV_KEY: &str = "COURIER_FILE";

const HANDOFF_DIR_ENV: &str = "COURIER_TMP_DIR";
const DEFAULT_HANDOFF_DIR: &str = "/dev/shm";

/// Directory the anonymous handoff file is created in.
///
/// Defaults to the memory-backed `/dev/shm` so the artifact never touches a
/// disk-backed filesystem; `COURIER_TMP_DIR` overrides it.
pub fn handoff_dir() -> PathBuf {
    let dir = env::var(HANDOFF_DIR_ENV).unwrap_or(DEFAULT_HANDOFF_DIR.to_string());
    PathBuf::from(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_dir_defaults_to_shm() {
        if env::var(HANDOFF_DIR_ENV).is_err() {
            assert_eq!(handoff_dir(), PathBuf::from("/dev/shm"));
        }
    }
}
