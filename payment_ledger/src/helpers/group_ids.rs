use blake2::{Blake2b512, Digest};

use crate::db_types::{GroupId, TransactionId};

const GROUP_ID_PREFIX: &str = "grp_";
const GROUP_ID_DIGEST_BYTES: usize = 16;

/// Derives the group id of a root transaction (auth, sale or pre-note) from its transaction id.
///
/// The mapping is deterministic, so a retried root attempt always lands in the same group, and two different
/// transaction ids never share one.
pub fn group_id_for_root(id: &TransactionId) -> GroupId {
    let digest = Blake2b512::digest(id.as_str().as_bytes());
    let hex = digest.iter().take(GROUP_ID_DIGEST_BYTES).map(|b| format!("{b:02x}")).collect::<String>();
    GroupId::from(format!("{GROUP_ID_PREFIX}{hex}"))
}
