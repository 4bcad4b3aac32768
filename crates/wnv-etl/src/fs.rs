use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Stage `bytes` next to `path` and rename it into place, so readers never observe a
/// half-written file and a failed write keeps the previous version.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "old").expect("seed file");

        write_atomically(&path, b"new").expect("write succeeds");

        assert_eq!(std::fs::read_to_string(&path).expect("read back"), "new");
        let leftovers = std::fs::read_dir(dir.path()).expect("list dir").count();
        assert_eq!(leftovers, 1, "staging file should be renamed away");
    }

    #[test]
    fn missing_parent_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("out.csv");
        assert!(write_atomically(&path, b"data").is_err());
    }
}
