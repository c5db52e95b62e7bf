//! System V shared memory segments used to hand a store buffer to the
//! external neighbor computation

use std::io;
use std::ptr;
use std::slice;

use tracing::{debug, warn};

use crate::error::{LmdsError, Result};

const CREATE_ATTEMPTS: usize = 64;

/// An attached shared memory segment.
///
/// The creating side owns the segment and removes it on drop; the attaching
/// side only detaches.
#[derive(Debug)]
pub struct SharedSegment {
    id: libc::c_int,
    key: libc::key_t,
    size: usize,
    addr: *mut u8,
    owner: bool,
}

impl SharedSegment {
    /// Create and attach a fresh segment under a random unused key.
    pub fn create(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(LmdsError::SharedMemory(
                "cannot create an empty segment".to_string(),
            ));
        }

        for _ in 0..CREATE_ATTEMPTS {
            let key = random_key();
            // SAFETY: plain syscall, no pointers involved.
            let id = unsafe {
                libc::shmget(key, size, libc::IPC_CREAT | libc::IPC_EXCL | 0o600)
            };
            if id == -1 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EEXIST) {
                    continue;
                }
                return Err(LmdsError::SharedMemory(format!(
                    "shmget of {} bytes failed: {}",
                    size, err
                )));
            }

            return match attach_id(id) {
                Ok(addr) => {
                    debug!(key, size, "Created shared memory segment");
                    Ok(Self {
                        id,
                        key,
                        size,
                        addr,
                        owner: true,
                    })
                }
                Err(e) => {
                    remove_id(id);
                    Err(e)
                }
            };
        }

        Err(LmdsError::SharedMemory(format!(
            "no free key after {} attempts",
            CREATE_ATTEMPTS
        )))
    }

    /// Attach an existing segment created by another process.
    pub fn attach(key: libc::key_t, size: usize) -> Result<Self> {
        // SAFETY: plain syscall, no pointers involved.
        let id = unsafe { libc::shmget(key, size, 0o600) };
        if id == -1 {
            return Err(LmdsError::SharedMemory(format!(
                "shmget of key {} failed: {}",
                key,
                io::Error::last_os_error()
            )));
        }
        let addr = attach_id(id)?;
        Ok(Self {
            id,
            key,
            size,
            addr,
            owner: false,
        })
    }

    pub fn key(&self) -> libc::key_t {
        self.key
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: addr points to an attached mapping of at least `size` bytes
        // that stays valid until drop.
        unsafe { slice::from_raw_parts(self.addr, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self guarantees exclusive access in this process.
        unsafe { slice::from_raw_parts_mut(self.addr, self.size) }
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        // SAFETY: addr was returned by shmat and has not been detached.
        if unsafe { libc::shmdt(self.addr as *const libc::c_void) } == -1 {
            warn!(key = self.key, error = %io::Error::last_os_error(), "shmdt failed");
        }
        if self.owner {
            remove_id(self.id);
            debug!(key = self.key, "Removed shared memory segment");
        }
    }
}

fn random_key() -> libc::key_t {
    loop {
        // IPC_PRIVATE is 0 and negative keys are awkward to pass on a command line.
        let key = rand::random::<i32>() & i32::MAX;
        if key != 0 {
            return key as libc::key_t;
        }
    }
}

fn attach_id(id: libc::c_int) -> Result<*mut u8> {
    // SAFETY: id names an existing segment; a null address lets the kernel choose.
    let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(LmdsError::SharedMemory(format!(
            "shmat failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(addr as *mut u8)
}

fn remove_id(id: libc::c_int) {
    // SAFETY: IPC_RMID ignores the buffer argument.
    if unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) } == -1 {
        warn!(id, error = %io::Error::last_os_error(), "shmctl(IPC_RMID) failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn attached_views_share_bytes() {
        let mut owner = SharedSegment::create(64).unwrap();
        owner.as_mut_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);

        let mut peer = SharedSegment::attach(owner.key(), owner.size()).unwrap();
        assert_eq!(&peer.as_slice()[..4], &[1, 2, 3, 4]);
        peer.as_mut_slice()[4] = 9;
        drop(peer);

        assert_eq!(owner.as_slice()[4], 9);
    }

    #[test]
    fn dropped_owner_removes_segment() {
        let owner = SharedSegment::create(16).unwrap();
        let key = owner.key();
        drop(owner);
        assert!(matches!(
            SharedSegment::attach(key, 16),
            Err(LmdsError::SharedMemory(_))
        ));
    }

    #[test]
    fn empty_segment_is_rejected() {
        assert!(matches!(
            SharedSegment::create(0),
            Err(LmdsError::SharedMemory(_))
        ));
    }
}
