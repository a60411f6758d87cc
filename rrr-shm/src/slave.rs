//! Slave side of the shared-memory arena (§4.7): maps segments the
//! master has created and lazily refreshes its view when the master's
//! slot table changes. A slave never allocates or frees — that
//! asymmetry is enforced here by [`ShmSlave`] simply not exposing those
//! operations, not by a runtime check.

use std::ptr;

use crate::err::{ShmError, ShmErrorKind};
use crate::master::{shm_name_cstring, ShmHandle, ShmMaster, RRR_SHM_COLLECTION_MAX};

#[derive(Clone, Copy)]
struct MappedSlot {
    ptr: *mut libc::c_void,
    data_size: usize,
    version: u64,
}

impl MappedSlot {
    const fn empty() -> Self {
        return Self { ptr: ptr::null_mut(), data_size: 0, version: 0 };
    }
}

pub struct ShmSlave {
    master: *const ShmMaster,
    version_master_seen: u64,
    slots: [MappedSlot; RRR_SHM_COLLECTION_MAX],
}

impl ShmSlave {
    /// Creates a slave view over `master`. Callers are responsible for
    /// ensuring `master` outlives the returned `ShmSlave` (the arena is
    /// shared within a single process across threads here, mirroring the
    /// original's cross-process model at the API level).
    pub fn new(master: &ShmMaster) -> Self {
        return Self {
            master: master as *const ShmMaster,
            version_master_seen: 0,
            slots: [MappedSlot::empty(); RRR_SHM_COLLECTION_MAX],
        };
    }

    fn master(&self) -> &ShmMaster {
        return unsafe { &*self.master };
    }

    fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*self.master().control_ptr()).mutex));
        }
    }

    fn unlock(&self) {
        unsafe {
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*self.master().control_ptr()).mutex));
        }
    }

    /// Re-maps any slot whose `version` differs from what this slave last
    /// saw. Cheap when nothing changed: a single read of `version_master`
    /// under the lock.
    fn refresh_if_needed(&mut self) -> Result<(), ShmError> {
        self.lock();
        let control = self.master().control_ptr();
        let version_master = unsafe { (*control).version_master };
        if version_master == self.version_master_seen {
            self.unlock();
            return Ok(());
        }

        for i in 0..RRR_SHM_COLLECTION_MAX {
            let master_slot = unsafe { (*control).slots[i] };
            if master_slot.version == self.slots[i].version {
                continue;
            }
            if self.slots[i].ptr != ptr::null_mut() {
                unsafe {
                    libc::munmap(self.slots[i].ptr, self.slots[i].data_size);
                }
                self.slots[i] = MappedSlot::empty();
            }
            if master_slot.data_size == 0 {
                // slot freed; leave unmapped
                self.slots[i].version = master_slot.version;
                continue;
            }
            let mapped = self.map_slot(&master_slot);
            let mapped = match mapped {
                Ok(m) => m,
                Err(e) => {
                    self.unlock();
                    return Err(e);
                }
            };
            log::debug!("shm slave remapped slot {i} ({} bytes)", mapped.data_size);
            self.slots[i] = mapped;
        }
        self.version_master_seen = version_master;
        self.unlock();
        return Ok(());
    }

    fn map_slot(&self, slot: &crate::master::Slot) -> Result<MappedSlot, ShmError> {
        let cname = shm_name_cstring(&slot.name);
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(ShmError::from_errno(ShmErrorKind::ShmOpenFailed, "slave shm_open"));
        }
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                slot.data_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe {
            libc::close(fd);
        }
        if addr == libc::MAP_FAILED {
            return Err(ShmError::from_errno(ShmErrorKind::MmapFailed, "slave mmap"));
        }
        return Ok(MappedSlot { ptr: addr, data_size: slot.data_size, version: slot.version });
    }

    /// Returns the raw pointer for `handle`, refreshing this slave's view
    /// first if the master's table has changed since last access.
    pub fn access(&mut self, handle: ShmHandle) -> Result<*mut u8, ShmError> {
        self.refresh_if_needed()?;
        if handle >= self.slots.len() || self.slots[handle].ptr.is_null() {
            return Err(ShmError::new(ShmErrorKind::InvalidHandle, "handle not mapped on slave"));
        }
        return Ok(self.slots[handle].ptr as *mut u8);
    }

    /// Translates a handle plus byte offset within the segment to an
    /// absolute pointer, the inverse of [`ShmSlave::resolve_reverse`].
    pub fn resolve(&mut self, handle: ShmHandle, offset: usize) -> Result<*mut u8, ShmError> {
        let base = self.access(handle)?;
        if offset > self.slots[handle].data_size {
            return Err(ShmError::new(ShmErrorKind::InvalidHandle, "offset beyond segment size"));
        }
        return Ok(unsafe { base.add(offset) });
    }

    /// Translates an absolute pointer previously returned by
    /// [`ShmSlave::resolve`] back to a `(handle, offset)` pair.
    pub fn resolve_reverse(&mut self, ptr: *const u8) -> Result<(ShmHandle, usize), ShmError> {
        self.refresh_if_needed()?;
        for (handle, slot) in self.slots.iter().enumerate() {
            if slot.ptr.is_null() {
                continue;
            }
            let start = slot.ptr as usize;
            let end = start + slot.data_size;
            let addr = ptr as usize;
            if addr >= start && addr < end {
                return Ok((handle, addr - start));
            }
        }
        return Err(ShmError::new(ShmErrorKind::InvalidHandle, "pointer not within any mapped segment"));
    }
}

impl Drop for ShmSlave {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            if !slot.ptr.is_null() {
                unsafe {
                    libc::munmap(slot.ptr, slot.data_size);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slave_maps_segment_allocated_by_master() {
        let master = ShmMaster::new().expect("control block mmap");
        let handle = master.allocate(256).expect("allocate");
        let mut slave = ShmSlave::new(&master);
        let ptr = slave.access(handle).expect("access");
        unsafe {
            ptr.write(0x42);
            assert_eq!(ptr.read(), 0x42);
        }
        master.free(handle).expect("free");
    }

    #[test]
    fn resolve_and_resolve_reverse_round_trip() {
        let master = ShmMaster::new().expect("control block mmap");
        let handle = master.allocate(64).expect("allocate");
        let mut slave = ShmSlave::new(&master);
        let ptr = slave.resolve(handle, 8).expect("resolve");
        let (back_handle, back_offset) = slave.resolve_reverse(ptr).expect("resolve_reverse");
        assert_eq!(back_handle, handle);
        assert_eq!(back_offset, 8);
        master.free(handle).expect("free");
    }

    #[test]
    fn freed_handle_is_unmapped_after_refresh() {
        let master = ShmMaster::new().expect("control block mmap");
        let handle = master.allocate(64).expect("allocate");
        let mut slave = ShmSlave::new(&master);
        slave.access(handle).expect("access before free");
        master.free(handle).expect("free");
        let err = slave.access(handle).unwrap_err();
        assert_eq!(err.kind(), ShmErrorKind::InvalidHandle);
    }
}
