mod group_ids;
mod keyed_lock;

pub use group_ids::group_id_for_root;
pub use keyed_lock::{KeyedLockGuard, KeyedLocks};
