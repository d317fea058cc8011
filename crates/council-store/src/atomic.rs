//! Crash-safe replace-on-write
//!
//! Guards against two failure modes:
//!
//! * an error raised while producing the new content — the destination
//!   stays byte-for-byte untouched;
//! * an unclean shutdown mid-write — either the old or the new file is
//!   seen on disk afterwards, never a mix.
//!
//! The new content is written to a temporary file next to the destination,
//! flushed and fsynced, and then atomically renamed over the destination.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// How far to push the replacement towards stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Fsync the new file before the rename.
    File,
    /// Additionally fsync the containing directory after the rename.
    ///
    /// Needed only by callers that must guarantee the *new* content (and
    /// not a pre-crash stale file) survives an immediate crash.
    FileAndDirectory,
}

/// Atomically replace `dest` with content produced by `body`.
///
/// `body` writes into a temporary file created in the destination's
/// directory. If it returns an error the temporary file is discarded and
/// `dest` is left untouched. On success the temporary file is flushed,
/// forced to stable storage, and renamed over `dest` in one step.
pub fn replace_file<T, F>(dest: &Path, durability: Durability, body: F) -> io::Result<T>
where
    F: FnOnce(&mut File) -> io::Result<T>,
{
    let dir = dest.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination has no parent directory: {}", dest.display()),
        )
    })?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    // Any error here drops `tmp`, which unlinks the temporary file.
    let value = body(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;

    if durability == Durability::FileAndDirectory {
        fsync_dir(dir)?;
    }

    Ok(value)
}

/// Force a directory's metadata to stable storage.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn successful_write_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("record.json");
        fs::write(&dest, b"old").unwrap();

        replace_file(&dest, Durability::File, |f| f.write_all(b"new")).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn failed_write_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("record.json");
        fs::write(&dest, b"precious").unwrap();

        let err = replace_file(&dest, Durability::File, |f| {
            f.write_all(b"half-writ")?;
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated failure"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        assert_eq!(fs::read(&dest).unwrap(), b"precious");
        // No temporary litter either.
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn creates_destination_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fresh.json");

        replace_file(&dest, Durability::FileAndDirectory, |f| f.write_all(b"content"))
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"content");
    }
}
