//! Master side of the shared-memory arena (§4.7): owns the slot table,
//! creates and destroys segments, and is the only side allowed to
//! allocate or free.

use std::ffi::CString;
use std::mem::MaybeUninit;
use std::ptr;

use crate::err::{ShmError, ShmErrorKind};
use crate::name::random_shm_name;

/// Mirrors the original's `RRR_SHM_COLLECTION_MAX`: a fixed upper bound
/// on the number of live segments a single collection can track, not a
/// guarantee that allocations up to that count will succeed (each still
/// needs a free slot and a successful `shm_open`).
pub const RRR_SHM_COLLECTION_MAX: usize = 192;

#[derive(Clone, Copy)]
pub(crate) struct Slot {
    pub(crate) name: [u8; 8],
    pub(crate) data_size: usize,
    pub(crate) version: u64,
    active: bool,
}

impl Slot {
    const fn empty() -> Self {
        return Self { name: [0u8; 8], data_size: 0, version: 0, active: false };
    }
}

/// The process-shared control block living at the start of the master
/// mapping: a `pthread_mutex_t` guarding the slot table and a
/// monotonically increasing `version_master` slaves compare against
/// before deciding whether to walk the table.
pub(crate) struct ControlBlock {
    pub(crate) mutex: libc::pthread_mutex_t,
    pub(crate) version_master: u64,
    pub(crate) slots: [Slot; RRR_SHM_COLLECTION_MAX],
}

/// Handle returned by [`ShmMaster::allocate`]. Opaque to callers; only
/// meaningful to the master/slave pair that produced it.
pub type ShmHandle = usize;

pub struct ShmMaster {
    control: *mut ControlBlock,
    control_len: usize,
}

unsafe impl Send for ShmMaster {}

impl ShmMaster {
    /// Creates the anonymous, process-shared control block. This is not
    /// itself a named `shm_open` segment — it lives in an `MAP_SHARED |
    /// MAP_ANONYMOUS` mapping a forked worker inherits, matching how the
    /// broker's threads share the arena without needing a named handle
    /// for the control structure itself.
    pub fn new() -> Result<Self, ShmError> {
        let control_len = std::mem::size_of::<ControlBlock>();
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                control_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(ShmError::from_errno(ShmErrorKind::MasterMapFailed, "mmap control block"));
        }
        let control = addr as *mut ControlBlock;

        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            if libc::pthread_mutexattr_init(attr.as_mut_ptr()) != 0 {
                libc::munmap(addr, control_len);
                return Err(ShmError::new(ShmErrorKind::MutexInitFailed, "pthread_mutexattr_init failed"));
            }
            let mut attr = attr.assume_init();
            if libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED) != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                libc::munmap(addr, control_len);
                return Err(ShmError::new(ShmErrorKind::MutexInitFailed, "pthread_mutexattr_setpshared failed"));
            }

            let mutex_ptr = ptr::addr_of_mut!((*control).mutex);
            if libc::pthread_mutex_init(mutex_ptr, &attr) != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                libc::munmap(addr, control_len);
                return Err(ShmError::new(ShmErrorKind::MutexInitFailed, "pthread_mutex_init failed"));
            }
            libc::pthread_mutexattr_destroy(&mut attr);

            ptr::addr_of_mut!((*control).version_master).write(0);
            let slots_ptr = ptr::addr_of_mut!((*control).slots);
            slots_ptr.write([Slot::empty(); RRR_SHM_COLLECTION_MAX]);
        }

        return Ok(Self { control, control_len });
    }

    fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*self.control).mutex));
        }
    }

    fn unlock(&self) {
        unsafe {
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*self.control).mutex));
        }
    }

    /// Creates a new named segment of `data_size` bytes and returns the
    /// handle a slave will use to find it. Retries name generation on
    /// `EEXIST`, matching `__rrr_shm_open_create`.
    pub fn allocate(&self, data_size: usize) -> Result<ShmHandle, ShmError> {
        self.lock();
        let index = unsafe {
            (*self.control).slots.iter().position(|slot| !slot.active)
        };
        let index = match index {
            Some(i) => i,
            None => {
                self.unlock();
                return Err(ShmError::new(ShmErrorKind::CollectionFull, "no free slot in shm collection"));
            }
        };

        let result = self.create_segment(data_size);
        let name = match result {
            Ok(name) => name,
            Err(e) => {
                self.unlock();
                return Err(e);
            }
        };

        unsafe {
            let slot = &mut (*self.control).slots[index];
            slot.name = name;
            slot.data_size = data_size;
            slot.version = slot.version.wrapping_add(1);
            slot.active = true;
            (*self.control).version_master = (*self.control).version_master.wrapping_add(1);
        }
        self.unlock();
        log::debug!("shm master allocated slot {index} ({data_size} bytes)");
        return Ok(index);
    }

    fn create_segment(&self, data_size: usize) -> Result<[u8; 8], ShmError> {
        loop {
            let name = random_shm_name();
            let cname = shm_name_cstring(&name);
            let fd = unsafe {
                libc::shm_open(
                    cname.as_ptr(),
                    libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                    0o600,
                )
            };
            if fd < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EEXIST) {
                    continue;
                }
                return Err(ShmError::from_errno(ShmErrorKind::ShmOpenFailed, "shm_open"));
            }
            let truncated = unsafe { libc::ftruncate(fd, data_size as libc::off_t) };
            if truncated != 0 {
                let err = ShmError::from_errno(ShmErrorKind::TruncateFailed, "ftruncate");
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(cname.as_ptr());
                }
                return Err(err);
            }
            unsafe {
                libc::close(fd);
            }
            return Ok(name);
        }
    }

    /// Destroys a previously allocated segment. `handle` must be the
    /// value returned from the matching `allocate` call.
    pub fn free(&self, handle: ShmHandle) -> Result<(), ShmError> {
        self.lock();
        let result = unsafe {
            let slots = &mut (*self.control).slots;
            if handle >= slots.len() || !slots[handle].active {
                Err(ShmError::new(ShmErrorKind::DoubleFree, "handle not active"))
            } else {
                let name = slots[handle].name;
                let cname = shm_name_cstring(&name);
                libc::shm_unlink(cname.as_ptr());
                slots[handle] = Slot::empty();
                (*self.control).version_master = (*self.control).version_master.wrapping_add(1);
                Ok(())
            }
        };
        self.unlock();
        if result.is_ok() {
            log::debug!("shm master freed slot {handle}");
        }
        return result;
    }

    pub(crate) fn control_ptr(&self) -> *mut ControlBlock {
        return self.control;
    }

    pub(crate) fn control_len(&self) -> usize {
        return self.control_len;
    }
}

impl Drop for ShmMaster {
    fn drop(&mut self) {
        unsafe {
            for slot in (*self.control).slots.iter().filter(|s| s.active) {
                let cname = shm_name_cstring(&slot.name);
                libc::shm_unlink(cname.as_ptr());
            }
            libc::pthread_mutex_destroy(ptr::addr_of_mut!((*self.control).mutex));
            libc::munmap(self.control as *mut libc::c_void, self.control_len);
        }
    }
}

pub(crate) fn shm_name_cstring(name: &[u8; 8]) -> CString {
    let len = name.iter().position(|b| *b == 0).unwrap_or(name.len());
    return CString::new(&name[..len]).expect("shm name contains no interior nul");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_free_round_trip() {
        let master = ShmMaster::new().expect("control block mmap");
        let handle = master.allocate(4096).expect("allocate");
        master.free(handle).expect("free");
    }

    #[test]
    fn double_free_is_rejected() {
        let master = ShmMaster::new().expect("control block mmap");
        let handle = master.allocate(64).expect("allocate");
        master.free(handle).expect("first free");
        let err = master.free(handle).unwrap_err();
        assert_eq!(err.kind(), ShmErrorKind::DoubleFree);
    }

    #[test]
    fn collection_full_once_all_slots_used() {
        let master = ShmMaster::new().expect("control block mmap");
        let mut handles = Vec::new();
        for _ in 0..RRR_SHM_COLLECTION_MAX {
            handles.push(master.allocate(16).expect("allocate"));
        }
        let err = master.allocate(16).unwrap_err();
        assert_eq!(err.kind(), ShmErrorKind::CollectionFull);
        for h in handles {
            master.free(h).expect("free");
        }
    }
}
