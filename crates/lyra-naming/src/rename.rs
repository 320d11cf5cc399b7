use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, NamingError>;

/// Errors crossing the naming-layer boundary.
///
/// Only genuine I/O failures surface as errors; cache-internal bookkeeping
/// problems are either fatal assertions (bugs) or tolerated no-ops.
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("rename target already exists: {path}")]
    TargetExists { path: PathBuf },
}

/// Caller-supplied I/O callback performing the side-effecting move during a
/// rename, in place of a direct [`std::fs::rename`].
///
/// Implementations must either complete the move or fail without moving;
/// partial moves leave the registry and the disk disagreeing about what
/// exists where.
pub trait RenameHandler {
    fn handle(&self, from: &Path, to: &Path) -> io::Result<()>;
}

impl<F> RenameHandler for F
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    fn handle(&self, from: &Path, to: &Path) -> io::Result<()> {
        self(from, to)
    }
}

/// Performs the disk-level move for a rename.
///
/// Destination collisions are rejected up front so the outcome does not
/// depend on platform `rename` overwrite semantics.
pub(crate) fn perform_move(
    from: &Path,
    to: &Path,
    handler: Option<&dyn RenameHandler>,
) -> Result<()> {
    if to.exists() {
        return Err(NamingError::TargetExists {
            path: to.to_path_buf(),
        });
    }
    match handler {
        Some(handler) => handler.handle(from, to)?,
        None => std::fs::rename(from, to)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perform_move_renames_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"payload").unwrap();

        perform_move(&from, &to, None).unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
    }

    #[test]
    fn perform_move_rejects_existing_targets() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"a").unwrap();
        std::fs::write(&to, b"b").unwrap();

        let err = perform_move(&from, &to, None).unwrap_err();
        assert!(matches!(err, NamingError::TargetExists { .. }));
        // Nothing moved.
        assert_eq!(std::fs::read(&from).unwrap(), b"a");
        assert_eq!(std::fs::read(&to).unwrap(), b"b");
    }

    #[test]
    fn perform_move_prefers_the_injected_handler() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"a").unwrap();

        let handler = |f: &Path, t: &Path| -> io::Result<()> {
            std::fs::copy(f, t)?;
            std::fs::remove_file(f)
        };
        perform_move(&from, &to, Some(&handler)).unwrap();

        assert!(!from.exists());
        assert!(to.exists());
    }

    #[test]
    fn handler_errors_propagate_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"a").unwrap();

        let handler =
            |_: &Path, _: &Path| -> io::Result<()> { Err(io::Error::other("device gone")) };
        let err = perform_move(&from, &to, Some(&handler)).unwrap_err();
        match err {
            NamingError::Io(io) => assert_eq!(io.to_string(), "device gone"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
