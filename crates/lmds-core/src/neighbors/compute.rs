//! Strategies that fill a store's neighbor and rank blocks

#[cfg(unix)]
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info};

use super::kernel::fill_neighbor_blocks;
#[cfg(unix)]
use super::shm::SharedSegment;
#[cfg(unix)]
use super::{StoreHeader, StoreView};
#[cfg(unix)]
use crate::config::LmdsConfig;
#[cfg(unix)]
use crate::error::LmdsError;
use crate::error::Result;

/// Compute-offload port for the all-pairs neighbor computation.
///
/// `segment` is a whole store buffer whose header and position block are
/// already written; implementations fill the neighbor and rank blocks in
/// place and return only once they are complete.
pub trait NeighborCompute {
    fn compute(&self, segment: &mut [u8]) -> Result<()>;
}

/// Computes in the calling process on the rayon thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessCompute;

impl NeighborCompute for InProcessCompute {
    fn compute(&self, segment: &mut [u8]) -> Result<()> {
        let start = Instant::now();
        let header = fill_neighbor_blocks(segment)?;
        debug!(
            points = header.point_count,
            dimensions = header.dimensions,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed neighbors in process"
        );
        Ok(())
    }
}

/// Computes in a separate executable over a System V shared memory segment.
///
/// The executable is invoked as `<path> <key> <size>` and blocks the caller
/// until it exits. There is no timeout.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct ExternalProcessCompute {
    executable: PathBuf,
}

#[cfg(unix)]
impl ExternalProcessCompute {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Use the executable named by `config`.
    pub fn from_config(config: &LmdsConfig) -> Self {
        Self::new(config.neighbors_executable.clone())
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[cfg(unix)]
impl NeighborCompute for ExternalProcessCompute {
    fn compute(&self, segment: &mut [u8]) -> Result<()> {
        let start = Instant::now();
        let mut shared = SharedSegment::create(segment.len())?;
        shared.as_mut_slice().copy_from_slice(segment);

        let output = Command::new(&self.executable)
            .arg(shared.key().to_string())
            .arg(shared.size().to_string())
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: "lmds::neighbors::external", "{}", line);
        }

        if !output.status.success() {
            return Err(LmdsError::ComputationFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        segment.copy_from_slice(shared.as_slice());
        drop(shared);

        let filled = StoreHeader::decode(segment).and_then(|header| {
            StoreView {
                header,
                bytes: &segment[..],
            }
            .validate()
        });
        if let Err(e) = filled {
            return Err(LmdsError::ComputationFailed {
                status: output.status.to_string(),
                stderr: format!("{} left an incomplete store: {}", self.executable.display(), e),
            });
        }

        info!(
            executable = %self.executable.display(),
            bytes = segment.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed neighbors in external process"
        );
        Ok(())
    }
}
