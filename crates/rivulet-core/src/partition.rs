//! Stable shard routing.
//!
//! Producer and consumer processes must agree on row placement without
//! coordination, so the digest is blake3 — bit-exact across processes,
//! restarts, and architectures — reduced mod the shard count. Never swap
//! this for the language-default hasher.

use crate::envelope::ChannelId;

/// Map a routing key to one of `shards` downstream instances.
pub fn route(key: &str, shards: u32) -> u32 {
    let digest = blake3::hash(key.as_bytes());
    let head = u64::from_le_bytes(digest.as_bytes()[0..8].try_into().unwrap());
    (head % u64::from(shards.max(1))) as u32
}

/// Build the routing key for a row: channel identity concatenated with the
/// co-location columns, so rows that must be grouped or joined together
/// always land on the same shard.
pub fn shard_key(channel: &ChannelId, parts: &[&str]) -> String {
    let mut key =
        String::with_capacity(channel.query.len() + channel.tag.len() + 8 * parts.len() + 2);
    key.push_str(&channel.query);
    key.push('/');
    key.push_str(&channel.tag);
    for part in parts {
        key.push('|');
        key.push_str(part);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_is_deterministic() {
        for key in ["", "a", "q1/groupby|2024H1|store-3"] {
            assert_eq!(route(key, 16), route(key, 16));
        }
    }

    #[test]
    fn route_is_within_bounds() {
        for i in 0..100 {
            let key = format!("key-{i}");
            assert!(route(&key, 7) < 7);
        }
    }

    #[test]
    fn zero_shards_clamps_to_one() {
        assert_eq!(route("anything", 0), 0);
    }

    #[test]
    fn shard_key_separates_channel_and_columns() {
        let ch = ChannelId::new("q3", "groupby");
        assert_eq!(shard_key(&ch, &["2024H1", "7"]), "q3/groupby|2024H1|7");
        assert_eq!(shard_key(&ch, &[]), "q3/groupby");
    }
}
