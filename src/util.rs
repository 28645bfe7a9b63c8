use std::fs;
use std::io;
use std::path::Path;

/// Copy a file and preserve its permissions and access/modification times.
///
/// Returns the number of bytes copied. Metadata that cannot be carried over (e.g. on
/// filesystems without timestamp support) is logged and skipped; only the content copy itself
/// can fail the call.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> io::Result<u64> {
    let copied = fs::copy(src, dst)?;

    if let Err(e) = copy_metadata(src, dst) {
        tracing::warn!(
            "Failed to preserve metadata from {} on {}: {}",
            src.display(),
            dst.display(),
            e
        );
    }

    Ok(copied)
}

/// Copy permissions and timestamps from source to destination
fn copy_metadata(src: &Path, dst: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = src.metadata()?;

    let permissions = fs::Permissions::from_mode(metadata.permissions().mode());
    fs::set_permissions(dst, permissions)?;

    if let (Ok(atime), Ok(mtime)) = (metadata.accessed(), metadata.modified()) {
        let times = [
            timespec_from_systemtime(atime),
            timespec_from_systemtime(mtime),
        ];
        let path_cstr = std::ffi::CString::new(dst.as_os_str().as_encoded_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid path"))?;

        // SAFETY: `path_cstr` is a valid NUL-terminated string and `times` holds exactly the
        // two timespecs utimensat reads; both outlive the call.
        let rc = unsafe { libc::utimensat(libc::AT_FDCWD, path_cstr.as_ptr(), times.as_ptr(), 0) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

/// Convert `SystemTime` to `libc::timespec`
pub fn timespec_from_systemtime(time: std::time::SystemTime) -> libc::timespec {
    match time.duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => libc::timespec {
            tv_sec: libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: libc::c_long::from(duration.subsec_nanos()),
        },
        Err(_) => libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        },
    }
}

/// fsync a directory so that entries created or renamed in it are durable
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    let file = fs::File::open(dir)?;
    rustix::fs::fsync(&file)?;
    Ok(())
}

/// fsync every regular file and directory under `dir`, including `dir` itself
pub fn fsync_all_walk(dir: &Path) -> io::Result<()> {
    tracing::trace!("Running fsync() on {}", dir.display());

    let walker = jwalk::WalkDir::new(dir).follow_links(false);

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type();

        if !(file_type.is_file() || file_type.is_dir()) {
            tracing::trace!("Skipping non-regular file for sync: {}", path.display());
            continue;
        }

        match fs::File::open(&path) {
            Ok(file) => {
                if let Err(e) = rustix::fs::fsync(&file) {
                    tracing::debug!("Failed to sync {}: {}", path.display(), e);
                }
            }
            Err(e) => {
                tracing::debug!("Failed to open {} for sync: {}", path.display(), e);
            }
        }
    }
    Ok(())
}

/// Human-readable size with two decimals, e.g. `1.50 KB`
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    #[allow(clippy::cast_precision_loss)]
    let mut size = size as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3.00 TB");
    }

    #[test]
    fn test_copy_preserves_mode_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        fs::write(&src, "payload").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o640)).unwrap();

        let mtime = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs::File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let copied = copy_file_with_metadata(&src, &dst).unwrap();
        assert_eq!(copied, 7);
        assert_eq!(fs::read(&dst).unwrap(), b"payload");

        let meta = dst.metadata().unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        assert_eq!(meta.modified().unwrap(), mtime);
    }

    #[test]
    fn test_fsync_all_walk() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("a/b/c.txt"), "x").unwrap();
        fsync_all_walk(temp_dir.path()).unwrap();
        fsync_dir(temp_dir.path()).unwrap();
    }
}
