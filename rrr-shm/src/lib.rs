//! Cross-process shared-memory arena (§4.7): a master owns a fixed-size
//! slot table of named `shm_open` segments; slaves lazily re-map the
//! segments whose contents changed since their last access, tracked
//! with a single version counter per slot plus one for the whole table.

pub mod err;
mod master;
mod name;
mod slave;

pub use err::{ShmError, ShmErrorKind};
pub use master::{ShmHandle, ShmMaster, RRR_SHM_COLLECTION_MAX};
pub use slave::ShmSlave;
