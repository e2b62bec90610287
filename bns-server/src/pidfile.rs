use {
    std::{fs, io, path::{Path, PathBuf}, process},
    tracing::{info, error},
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum PidFileError {
    #[error("failed to write pid file {path:?}: {source:?}")]
    FailedToWrite { path: PathBuf, source: io::Error },
}

/// Pid file that is removed again when dropped.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PidFileError> {
        let path = path.into();
        fs::write(&path, format!("{}\n", process::id()))
            .map_err(|source| PidFileError::FailedToWrite { path: path.clone(), source })?;
        info!("wrote pid file {path:?}");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            error!("failed to remove pid file {:?}: {err:?}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_pid_and_removes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bns.pid");

        let pid_file = PidFile::create(&path).unwrap();
        assert_eq!(path, pid_file.path());
        assert_eq!(format!("{}\n", process::id()), fs::read_to_string(&path).unwrap());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        match PidFile::create(dir.path().join("missing").join("bns.pid")) {
            Err(PidFileError::FailedToWrite { .. }) => {},
            Ok(_) => panic!("expected pid file creation to fail"),
        }
    }
}
