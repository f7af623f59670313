use std::{
    fs,
    path::{Path, PathBuf},
};

use super::Artifact;
use crate::Result;

/// Where finished artifacts are offered to the user.
pub trait ArtifactSink {
    /// Hands the artifact over and returns where it ended up.
    fn offer(&mut self, artifact: &Artifact) -> Result<PathBuf>;
}

/// Saves artifacts into a directory, the native equivalent of a download.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir`, created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectorySink {
    fn offer(&mut self, artifact: &Artifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&artifact.file_name);
        fs::write(&path, &artifact.bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = artifact.bytes.len(),
            mime = %artifact.mime,
            "artifact saved"
        );
        Ok(path)
    }
}
