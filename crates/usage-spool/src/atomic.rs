//! Atomic, permission-restricted file writes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mode for spool and dead-letter files.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Mode for spool and dead-letter directories.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Create `dir` (and parents) if missing, owner-only on unix.
pub(crate) fn ensure_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)
}

/// Write `bytes` to `dir/file_name` atomically.
///
/// The content goes to a hidden temp file in the same directory, is synced,
/// then renamed over the target. Readers see either the old file or the
/// complete new one. On failure the temp file is removed.
pub(crate) fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    ensure_dir(dir)?;

    let target = dir.join(file_name);
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let write_result = (|| -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }

        let mut file = options.open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(FILE_MODE))?;
        }

        fs::rename(&tmp_path, &target)?;

        if let Ok(parent_dir) = fs::File::open(dir) {
            let _ = parent_dir.sync_all();
        }

        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    Ok(target)
}

/// Move a file into another directory, falling back to copy+remove when
/// the directories are on different filesystems.
pub(crate) fn relocate(src: &Path, dst_dir: &Path, dst_name: &str) -> io::Result<PathBuf> {
    ensure_dir(dst_dir)?;
    let target = dst_dir.join(dst_name);

    if fs::rename(src, &target).is_err() {
        let bytes = fs::read(src)?;
        write_atomic(dst_dir, dst_name, &bytes)?;
        fs::remove_file(src)?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_directory_and_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("spool");

        let path = write_atomic(&dir, "a.json", b"{}").unwrap();
        assert_eq!(path, dir.join("a.json"));
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn write_atomic_overwrites_and_leaves_no_temp_files() {
        let temp = tempfile::tempdir().unwrap();

        write_atomic(temp.path(), "a.json", b"first").unwrap();
        write_atomic(temp.path(), "a.json", b"second").unwrap();

        assert_eq!(fs::read(temp.path().join("a.json")).unwrap(), b"second");
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn files_and_directories_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("spool");
        let path = write_atomic(&dir, "a.json", b"{}").unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode & 0o077, 0);
    }

    #[test]
    fn relocate_moves_between_directories() {
        let temp = tempfile::tempdir().unwrap();
        let src = write_atomic(&temp.path().join("spool"), "spool_x.json", b"data").unwrap();

        let dst = relocate(&src, &temp.path().join("failed"), "failed_x.json").unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(dst).unwrap(), b"data");
    }
}
