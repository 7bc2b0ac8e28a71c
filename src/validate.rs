use log::warn;
use std::fs;
use std::path::Path;

use crate::error::Error;

/// Fail when a required output file is empty, unless the caller opted into
/// empty results with `--allow-empty`. Applied uniformly after both stages.
pub fn ensure_non_empty(path: &Path, allow_empty: bool) -> Result<(), Error> {
    let len = fs::metadata(path).map_err(|e| Error::io(e, path))?.len();
    if len == 0 {
        if allow_empty {
            warn!("{} is empty (--allow-empty set, continuing)", path.display());
            return Ok(());
        }
        return Err(Error::EmptyOutput(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov.reg.bed");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            ensure_non_empty(&path, false),
            Err(Error::EmptyOutput(_))
        ));
    }

    #[test]
    fn test_allow_empty_downgrades_to_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov.reg.bed");
        fs::write(&path, "").unwrap();
        assert!(ensure_non_empty(&path, true).is_ok());
    }

    #[test]
    fn test_non_empty_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov.reg.bed");
        fs::write(&path, "chr1\t0\t1000\t5\n").unwrap();
        assert!(ensure_non_empty(&path, false).is_ok());
    }
}
