//! Persistent Memory Region: mapped file, header/root slots, and the
//! transactional free-list allocator (spec §4.A).

mod allocator;
mod pool;
mod ptr;

pub use pool::{EngineKind, Pool, LAYOUT_TAG, MAX_ENGINE_KINDS, MIN_POOL_SIZE};
pub use ptr::PPtr;
