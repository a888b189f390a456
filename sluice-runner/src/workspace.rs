//! Ephemeral run workspaces
//!
//! Every run checks out into its own directory under the workspace base.
//! The directory is created fresh and removed when the run ends, including
//! when the run is torn down by cancellation (via `Drop`).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory owned by a single run
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    removed: AtomicBool,
}

impl Workspace {
    /// Creates `<base>/<run_id>`, wiping any leftover from an earlier process
    pub fn create(base: &Path, run_id: Uuid) -> io::Result<Self> {
        let path = base.join(run_id.to_string());

        if path.exists() {
            warn!("Removing stale workspace {}", path.display());
            std::fs::remove_dir_all(&path)?;
        }

        std::fs::create_dir_all(base)?;

        info!("Created workspace {}", path.display());

        Ok(Self {
            path,
            removed: AtomicBool::new(false),
        })
    }

    /// Root of the run's checkout; does not exist until the checkout step ran
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path inside the checkout
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Path of an executable inside the run's virtual environment
    pub fn venv_bin(&self, program: &str) -> PathBuf {
        self.path.join(".venv").join("bin").join(program)
    }

    /// Removes the workspace directory; calling it twice is a no-op
    pub fn cleanup(&self) -> io::Result<()> {
        if self.removed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("Removed workspace {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to cleanup workspace on drop: {}", e);
        }
    }
}
