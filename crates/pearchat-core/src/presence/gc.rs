//! Expired peer record collection

use std::collections::BTreeMap;

use crate::types::{Identity, PeerRecord, Timestamp};

/// Remove records older than their expiry from `peers`.
///
/// The local participant's record gets `own_expiry_ms`, everyone else
/// `peer_expiry_ms`. A record is expired once its age is strictly greater
/// than the threshold. Returns the removed ids in key order.
pub fn collect_expired(
    peers: &mut BTreeMap<String, PeerRecord>,
    identity: &Identity,
    now: Timestamp,
    own_expiry_ms: i64,
    peer_expiry_ms: i64,
) -> Vec<String> {
    let mut removed = Vec::new();
    peers.retain(|id, record| {
        let expiry = if identity == id.as_str() {
            own_expiry_ms
        } else {
            peer_expiry_ms
        };
        let keep = record.age(now) <= expiry;
        if !keep {
            removed.push(id.clone());
        }
        keep
    });
    removed
}
