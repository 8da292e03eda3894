//! Per-job scratch directories.
//!
//! Every job gets a directory under a service-owned root, named after its job
//! id. The directory is handed out as a [`Workspace`] guard which removes it
//! exactly once: through [`Workspace::cleanup`] on the normal path, or on drop
//! when the job unwinds early.

use crate::archive::{self, ArchiveError};
use crate::errors::{self, JobError};
use crate::types::{Artifact, JobId};
use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Containers may run as any user, so the bind-mounted directory is world writable.
const WORKSPACE_MODE: u32 = 0o777;

#[derive(Debug)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Create the root if missing. The stored path is canonical since bind
    /// mounts need absolute host paths.
    pub fn create(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn workspace_path(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.simple().to_string())
    }

    /// Create the job's directory and extract `input` into it.
    ///
    /// Fails if the directory already exists. The input archive itself is
    /// never written to disk, so it cannot leak into the packed output.
    pub async fn stage(&self, job_id: JobId, input: Artifact) -> errors::Result<Workspace> {
        let path = self.workspace_path(job_id);
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| JobError::Staging {
                path: path.clone(),
                source,
            })?;
        let workspace = Workspace {
            job_id,
            path,
            removed: false,
        };

        tokio::fs::set_permissions(&workspace.path, Permissions::from_mode(WORKSPACE_MODE))
            .await
            .map_err(|source| JobError::Staging {
                path: workspace.path.clone(),
                source,
            })?;

        let dest = workspace.path.clone();
        tokio::task::spawn_blocking(move || archive::unpack(&input, &dest))
            .await
            .map_err(|err| JobError::Staging {
                path: workspace.path.clone(),
                source: io::Error::new(io::ErrorKind::Other, err),
            })?
            .map_err(|err| extraction_failure(&workspace.path, err))?;

        debug!(%job_id, path = ?workspace.path, "workspace staged");
        Ok(workspace)
    }

    /// Remove job directories left behind by a previous process.
    ///
    /// Only entries whose names parse as job ids are touched. Returns how many
    /// were removed.
    pub fn sweep_stale(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(root = ?self.root, error = %err, "failed to scan workspace root");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_job_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| Uuid::try_parse(name).is_ok())
                    .unwrap_or(false);
            if !is_job_dir {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(path = ?entry.path(), error = %err, "failed to remove stale workspace")
                }
            }
        }
        if removed > 0 {
            info!(removed, "removed stale workspaces");
        }
        removed
    }
}

/// A broken archive is the submitter's fault; a failing filesystem is ours.
fn extraction_failure(path: &Path, err: ArchiveError) -> JobError {
    match err {
        ArchiveError::Io { source, .. } => JobError::Staging {
            path: path.to_path_buf(),
            source,
        },
        err => JobError::InputArchive(err),
    }
}

/// Exclusive handle to one job's directory.
#[derive(Debug)]
pub struct Workspace {
    job_id: JobId,
    path: PathBuf,
    removed: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive whatever the directory holds right now.
    pub async fn pack(&self) -> errors::Result<Artifact> {
        let dir = self.path.clone();
        let bytes = tokio::task::spawn_blocking(move || archive::pack(&dir))
            .await
            .map_err(|err| {
                JobError::OutputArchive(ArchiveError::Io {
                    path: self.path.clone(),
                    source: io::Error::new(io::ErrorKind::Other, err),
                })
            })?
            .map_err(JobError::OutputArchive)?;
        Ok(Artifact::from(bytes))
    }

    /// Remove the directory and everything in it.
    pub async fn cleanup(mut self) -> io::Result<()> {
        self.removed = true;
        let result = tokio::fs::remove_dir_all(&self.path).await;
        if result.is_ok() {
            debug!(job_id = %self.job_id, "workspace removed");
        }
        result
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(job_id = %self.job_id, "workspace removed on drop"),
            Err(err) => {
                warn!(job_id = %self.job_id, path = ?self.path, error = %err, "failed to remove workspace")
            }
        }
    }
}
