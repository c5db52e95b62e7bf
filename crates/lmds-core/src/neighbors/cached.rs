use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::info;

use super::{NeighborIndex, StoreHeader, StoreView, HEADER_SIZE};
use crate::config::LmdsConfig;
use crate::distance::DistanceMetric;
use crate::error::{LmdsError, Result};

/// Read-only neighbor index over a memory-mapped store file.
///
/// The mapping lives exactly as long as the value; dropping it (or calling
/// [`CachedNeighbors::close`]) unmaps the file. The file is never written, so
/// any number of instances may map it at once.
#[derive(Debug)]
pub struct CachedNeighbors {
    header: StoreHeader,
    path: PathBuf,
    mmap: Mmap,
}

impl CachedNeighbors {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        let mut raw = [0u8; HEADER_SIZE];
        file.read_exact(&mut raw).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => LmdsError::CorruptNeighborStore(format!(
                "{} is shorter than the header",
                path.display()
            )),
            _ => LmdsError::Io(e),
        })?;
        let header = StoreHeader::decode(&raw)?;

        // SAFETY: the store is opened read-only and never mutated after creation.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        if mmap.len() != header.total_size() {
            return Err(LmdsError::CorruptNeighborStore(format!(
                "{} has {} bytes, header implies {}",
                path.display(),
                mmap.len(),
                header.total_size()
            )));
        }
        StoreView {
            header,
            bytes: &mmap[..],
        }
        .validate()?;

        info!(
            path = %path.display(),
            metric = %header.metric,
            points = header.point_count,
            dimensions = header.dimensions,
            "Opened cached neighbor store"
        );
        Ok(Self {
            header,
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Open the store for `dataset` and `metric` named by the configured
    /// filename template.
    pub fn open_variant(
        config: &LmdsConfig,
        dataset: &str,
        metric: DistanceMetric,
        small: bool,
    ) -> Result<Self> {
        let index = Self::open(config.neighbors_path(dataset, metric, small))?;
        if index.header.metric != metric {
            return Err(LmdsError::CorruptNeighborStore(format!(
                "{} holds {} distances, expected {}",
                index.path.display(),
                index.header.metric,
                metric
            )));
        }
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unmap the store.
    pub fn close(self) {}
}

impl NeighborIndex for CachedNeighbors {
    fn view(&self) -> StoreView<'_> {
        StoreView {
            header: self.header,
            bytes: &self.mmap[..],
        }
    }
}
