// Path-level helpers: load and save containers on disk, copy-aside backups.
//
// Optionally computes a SHA-256 of the saved bytes (feature-gated behind
// `file-io`) so callers can report what was written.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::dbpf::{Container, ContainerError, SaveOptions};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

/// Local-time stamp embedded in backup names.
const BACKUP_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `save_container()`.
#[derive(Debug, Clone)]
pub struct SaveStats {
    /// Bytes written to disk.
    pub bytes: u64,
    /// Resources in the saved index.
    pub resources: usize,
    /// SHA-256 of the written file (if `file-io` feature is enabled).
    pub sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Read and decode a container file.
///
/// Only an unreadable file or a missing/foreign header is an error; other
/// damage is recovered from and listed in `Container::warnings()`.
pub fn load_container(path: &Path) -> Result<Container, ContainerError> {
    let bytes = std::fs::read(path)?;
    let container = Container::load(&bytes)?;
    log::info!(
        "{}: {} bytes, {} resources, {} warnings",
        path.display(),
        bytes.len(),
        container.len(),
        container.warnings().len()
    );
    Ok(container)
}

/// Serialize `container` and write it to `path`.
pub fn save_container(
    container: &Container,
    path: &Path,
    opts: &SaveOptions,
) -> Result<SaveStats, ContainerError> {
    let bytes = container.to_bytes_with(opts)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    #[cfg(feature = "file-io")]
    let sha256 = Some(sha2::Sha256::digest(&bytes).into());
    #[cfg(not(feature = "file-io"))]
    let sha256 = None;

    log::info!("{}: wrote {} bytes", path.display(), bytes.len());
    Ok(SaveStats {
        bytes: bytes.len() as u64,
        resources: container.len(),
        sha256,
    })
}

// ---------------------------------------------------------------------------
// Backups
// ---------------------------------------------------------------------------

/// `<dir>/<stem>.backup_<stamp>.save` next to `path`.
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.backup_{stamp}.save"))
}

/// Copy an existing file aside before it is overwritten.
///
/// The backup is stamped with the local time (`YYYYMMDD_HHMMSS`). Returns the
/// backup path, or `None` if there was nothing to back up.
pub fn create_backup(path: &Path) -> io::Result<Option<PathBuf>> {
    let stamp = chrono::Local::now().format(BACKUP_STAMP_FORMAT).to_string();
    backup_with_stamp(path, &stamp)
}

/// Backups never replace each other: when `<stamp>` is taken, `<stamp>_1`,
/// `<stamp>_2`, ... are tried in turn.
fn backup_with_stamp(path: &Path, stamp: &str) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut source = File::open(path)?;
    for n in 0..=u32::MAX {
        let candidate = match n {
            0 => backup_path(path, stamp),
            n => backup_path(path, &format!("{stamp}_{n}")),
        };
        let mut dest = match File::create_new(&candidate) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };
        io::copy(&mut source, &mut dest)?;
        dest.flush()?;
        log::info!("backup: {} -> {}", path.display(), candidate.display());
        return Ok(Some(candidate));
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup name for {}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbpf::{Resource, ResourceKey};

    fn sample() -> Container {
        (0..4)
            .map(|i| Resource::new(ResourceKey::new(0x6, 0, i), vec![i as u8; 10 * i as usize]))
            .collect()
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Slot_00000001.save");
        let stats = save_container(&sample(), &path, &SaveOptions::default()).unwrap();
        assert_eq!(stats.resources, 4);
        assert_eq!(stats.bytes, std::fs::metadata(&path).unwrap().len());
        #[cfg(feature = "file-io")]
        assert!(stats.sha256.is_some());

        let loaded = load_container(&path).unwrap();
        assert_eq!(loaded.len(), 4);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_container(&dir.path().join("nope.save")).unwrap_err();
        assert!(matches!(err, ContainerError::Io(_)));
    }

    #[test]
    fn load_foreign_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, vec![b'x'; 200]).unwrap();
        assert!(matches!(
            load_container(&path).unwrap_err(),
            ContainerError::Format(_)
        ));
    }

    #[test]
    fn backup_naming() {
        let p = backup_path(Path::new("/saves/Slot_00000002.save"), "20240131_235959");
        assert_eq!(
            p,
            PathBuf::from("/saves/Slot_00000002.backup_20240131_235959.save")
        );
    }

    #[test]
    fn backup_name_carries_local_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Slot_00000001.save");
        std::fs::write(&path, b"previous").unwrap();

        let backup = create_backup(&path).unwrap().unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        let stamp = name
            .strip_prefix("Slot_00000001.backup_")
            .and_then(|s| s.strip_suffix(".save"))
            .unwrap();
        let stamp = stamp.split('_').take(2).collect::<Vec<_>>().join("_");
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, BACKUP_STAMP_FORMAT).is_ok());
    }

    #[test]
    fn backups_in_the_same_second_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.save");

        std::fs::write(&path, b"first").unwrap();
        let a = backup_with_stamp(&path, "20240101_120000").unwrap().unwrap();
        std::fs::write(&path, b"second").unwrap();
        let b = backup_with_stamp(&path, "20240101_120000").unwrap().unwrap();

        assert_ne!(a, b);
        assert_eq!(b, dir.path().join("out.backup_20240101_120000_1.save"));
        assert_eq!(std::fs::read(&a).unwrap(), b"first");
        assert_eq!(std::fs::read(&b).unwrap(), b"second");
    }

    #[test]
    fn backup_only_when_target_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.save");
        assert!(create_backup(&path).unwrap().is_none());

        std::fs::write(&path, b"previous").unwrap();
        let backup = create_backup(&path).unwrap().unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), b"previous");
        assert!(path.exists());
    }
}
