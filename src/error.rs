use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a move transaction did not complete. The source file is always left
/// where it was.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error(
        "cannot move {} to {}: destination already exists with different content",
        from.display(),
        target.display()
    )]
    Conflict { from: PathBuf, target: PathBuf },

    #[error("{} does not exist", from.display())]
    SourceMissing { from: PathBuf },

    #[error("no destination directory selected")]
    NoDestination,

    #[error("{} has no file name", from.display())]
    InvalidSource { from: PathBuf },

    #[error("{} is already in {}", from.display(), dir.display())]
    SameDirectory { from: PathBuf, dir: PathBuf },

    #[error("failed to move {} to {}: {error}", from.display(), target.display())]
    Io {
        from: PathBuf,
        target: PathBuf,
        #[source]
        error: io::Error,
    },
}

impl MoveError {
    pub(crate) fn io(from: impl Into<PathBuf>, target: impl Into<PathBuf>, error: io::Error) -> Self {
        Self::Io {
            from: from.into(),
            target: target.into(),
            error,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_names_both_files() {
        let err = MoveError::Conflict {
            from: PathBuf::from("/photos/inbox/a.jpg"),
            target: PathBuf::from("/photos/keep/a.jpg"),
        };
        let message = err.to_string();
        assert!(message.contains("/photos/inbox/a.jpg"), "{message}");
        assert!(message.contains("/photos/keep/a.jpg"), "{message}");
        assert!(message.contains("different content"), "{message}");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = MoveError::io(
            "/a/x.png",
            "/b/x.png",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_conflict());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/a/x.png"));
    }
}
