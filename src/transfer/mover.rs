//! The move transaction.
//!
//! A file is renamed into the destination directory without ever replacing
//! an existing file there. When the name is taken, identical content counts
//! as an already completed move and the source is deleted; different content
//! is a conflict. On every failure the source stays where it was.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use filetime::{set_file_mtime, FileTime};
use tracing::{debug, info, warn};

use super::compare::files_identical;
use crate::error::MoveError;

/// How a successful move was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The file now lives at the target.
    Moved,
    /// An identical file already existed at the target; the source was deleted.
    Deduplicated,
    /// The source was already gone and the target exists.
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedFile {
    pub source: PathBuf,
    pub target: PathBuf,
    pub outcome: MoveOutcome,
}

impl MovedFile {
    pub fn file_name(&self) -> Option<&str> {
        self.target.file_name().and_then(|n| n.to_str())
    }
}

/// Moves `source` into `dest_dir`, keeping its file name.
pub fn move_file(source: &Path, dest_dir: &Path) -> Result<MovedFile, MoveError> {
    let file_name = source.file_name().ok_or_else(|| MoveError::InvalidSource {
        from: source.to_path_buf(),
    })?;
    let target = dest_dir.join(file_name);

    if same_directory(source, dest_dir) {
        return Err(MoveError::SameDirectory {
            from: source.to_path_buf(),
            dir: dest_dir.to_path_buf(),
        });
    }

    let done = |outcome| MovedFile {
        source: source.to_path_buf(),
        target: target.clone(),
        outcome,
    };

    match fs::symlink_metadata(source) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return if target.exists() {
                debug!(?source, ?target, "Source already moved");
                Ok(done(MoveOutcome::AlreadyPresent))
            } else {
                Err(MoveError::SourceMissing {
                    from: source.to_path_buf(),
                })
            };
        }
        Err(e) => return Err(MoveError::io(source, &target, e)),
    }

    let result = match rename_no_replace(source, &target) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(?source, ?target, "Rename crosses filesystems, copying");
            copy_then_remove(source, &target)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!(?source, ?target, "Moved file");
            Ok(done(MoveOutcome::Moved))
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => resolve_existing(source, &target)
            .map(|()| done(MoveOutcome::Deduplicated)),
        Err(e) => Err(MoveError::io(source, &target, e)),
    }
}

/// The target name is taken: converge if the content matches.
fn resolve_existing(source: &Path, target: &Path) -> Result<(), MoveError> {
    let identical = files_identical(source, target).map_err(|e| MoveError::io(source, target, e))?;
    if !identical {
        warn!(?source, ?target, "Target exists with different content");
        return Err(MoveError::Conflict {
            from: source.to_path_buf(),
            target: target.to_path_buf(),
        });
    }
    fs::remove_file(source).map_err(|e| MoveError::io(source, target, e))?;
    info!(?source, ?target, "Target already had identical content, removed source");
    Ok(())
}

fn same_directory(source: &Path, dest_dir: &Path) -> bool {
    let Some(parent) = source.parent() else {
        return false;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    match (parent.canonicalize(), dest_dir.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => parent == dest_dir,
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

/// Atomic rename that fails with `AlreadyExists` instead of replacing.
#[cfg(target_os = "linux")]
fn rename_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::fcntl::{renameat2, RenameFlags};
    use std::os::fd::BorrowedFd;

    // SAFETY: AT_FDCWD is a valid directory fd for the whole process, so
    // the paths resolve like a plain rename.
    let cwd = unsafe { BorrowedFd::borrow_raw(libc::AT_FDCWD) };

    match renameat2(cwd, source, cwd, target, RenameFlags::RENAME_NOREPLACE) {
        Ok(()) => Ok(()),
        // Filesystem or kernel without RENAME_NOREPLACE.
        Err(Errno::EINVAL) | Err(Errno::ENOSYS) => link_then_unlink(source, target),
        Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
    }
}

#[cfg(not(target_os = "linux"))]
fn rename_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    link_then_unlink(source, target)
}

/// Hard links never replace an existing name. Filesystems without hard
/// links fall back to copying.
fn link_then_unlink(source: &Path, target: &Path) -> io::Result<()> {
    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(target);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            debug!(?source, error = %e, "Hard link failed, copying");
            copy_then_remove(source, target)
        }
    }
}

/// Copies into a freshly created target, keeps the modification time, then
/// deletes the source. A partial copy is removed on failure.
fn copy_then_remove(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let metadata = input.metadata()?;
    let mut output = OpenOptions::new().write(true).create_new(true).open(target)?;

    let copied = io::copy(&mut input, &mut output)
        .and_then(|_| output.sync_all())
        .and_then(|()| fs::set_permissions(target, metadata.permissions()))
        .and_then(|()| {
            set_file_mtime(target, FileTime::from_last_modification_time(&metadata))
        });
    drop(output);
    if let Err(e) = copied {
        let _ = fs::remove_file(target);
        return Err(e);
    }

    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(target);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempdir().unwrap();
        let from = root.path().join("from");
        let to = root.path().join("to");
        fs::create_dir(&from).unwrap();
        fs::create_dir(&to).unwrap();
        (root, from, to)
    }

    #[test]
    fn test_plain_move() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"content").unwrap();

        let moved = move_file(&from.join("a.jpg"), &to).unwrap();
        assert_eq!(moved.outcome, MoveOutcome::Moved);
        assert_eq!(moved.target, to.join("a.jpg"));
        assert_eq!(moved.file_name(), Some("a.jpg"));
        assert!(!from.join("a.jpg").exists());
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"content");
    }

    #[test]
    fn test_identical_target_deduplicates() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"same").unwrap();
        fs::write(to.join("a.jpg"), b"same").unwrap();

        let moved = move_file(&from.join("a.jpg"), &to).unwrap();
        assert_eq!(moved.outcome, MoveOutcome::Deduplicated);
        assert!(!from.join("a.jpg").exists());
        assert_eq!(fs::read_dir(&to).unwrap().count(), 1);

        // Repeating the move converges instead of failing.
        let again = move_file(&from.join("a.jpg"), &to).unwrap();
        assert_eq!(again.outcome, MoveOutcome::AlreadyPresent);
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"same");
    }

    #[test]
    fn test_conflict_leaves_both_files() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"XXXX").unwrap();
        fs::write(to.join("a.jpg"), b"YYYY").unwrap();

        let err = move_file(&from.join("a.jpg"), &to).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(fs::read(from.join("a.jpg")).unwrap(), b"XXXX");
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"YYYY");
    }

    #[test]
    fn test_missing_source() {
        let (_root, from, to) = setup();
        let err = move_file(&from.join("gone.jpg"), &to).unwrap_err();
        assert!(matches!(err, MoveError::SourceMissing { .. }));
    }

    #[test]
    fn test_missing_destination_keeps_source() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"content").unwrap();
        let err = move_file(&from.join("a.jpg"), &to.join("nope")).unwrap_err();
        assert!(matches!(err, MoveError::Io { .. }));
        assert!(from.join("a.jpg").exists());
    }

    #[test]
    fn test_same_directory_rejected() {
        let (_root, from, _to) = setup();
        fs::write(from.join("a.jpg"), b"content").unwrap();
        let err = move_file(&from.join("a.jpg"), &from).unwrap_err();
        assert!(matches!(err, MoveError::SameDirectory { .. }));
        assert!(from.join("a.jpg").exists());
    }

    #[test]
    fn test_round_trip_preserves_mtime() {
        let (_root, from, to) = setup();
        let path = from.join("a.jpg");
        fs::write(&path, b"content").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).unwrap();

        move_file(&path, &to).unwrap();
        move_file(&to.join("a.jpg"), &from).unwrap();
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_000_000);
    }

    #[test]
    fn test_copy_then_remove_keeps_mtime() {
        let (_root, from, to) = setup();
        let path = from.join("a.jpg");
        fs::write(&path, b"content").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(2_000_000, 0)).unwrap();

        copy_then_remove(&path, &to.join("a.jpg")).unwrap();
        assert!(!path.exists());
        let mtime = FileTime::from_last_modification_time(&fs::metadata(to.join("a.jpg")).unwrap());
        assert_eq!(mtime.unix_seconds(), 2_000_000);
    }

    #[test]
    fn test_copy_never_clobbers() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"new").unwrap();
        fs::write(to.join("a.jpg"), b"old").unwrap();

        let err = copy_then_remove(&from.join("a.jpg"), &to.join("a.jpg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"old");
        assert!(from.join("a.jpg").exists());
    }

    #[test]
    fn test_rename_no_replace_refuses_existing_name() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"new").unwrap();
        fs::write(to.join("a.jpg"), b"old").unwrap();

        let err = rename_no_replace(&from.join("a.jpg"), &to.join("a.jpg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(from.join("a.jpg")).unwrap(), b"new");
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"old");
    }

    #[test]
    fn test_rename_no_replace_moves_into_free_name() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"data").unwrap();

        rename_no_replace(&from.join("a.jpg"), &to.join("a.jpg")).unwrap();
        assert!(!from.join("a.jpg").exists());
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"data");
    }

    #[test]
    fn test_link_then_unlink_never_clobbers() {
        let (_root, from, to) = setup();
        fs::write(from.join("a.jpg"), b"new").unwrap();
        fs::write(to.join("a.jpg"), b"old").unwrap();

        let err = link_then_unlink(&from.join("a.jpg"), &to.join("a.jpg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(to.join("a.jpg")).unwrap(), b"old");
    }
}
