//! Channels visible to the gateway session.

use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent `channel_id -> guild_id` map fed by gateway events and read by
/// the REST client.
#[derive(Debug, Clone, Default)]
pub struct ChannelCache {
    channels: Arc<DashMap<u64, u64>>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel_id: u64, guild_id: u64) {
        self.channels.insert(channel_id, guild_id);
    }

    pub fn remove(&self, channel_id: u64) {
        self.channels.remove(&channel_id);
    }

    /// Drop every channel belonging to `guild_id`.
    pub fn remove_guild(&self, guild_id: u64) {
        self.channels.retain(|_, guild| *guild != guild_id);
    }

    /// Keep only channels whose guild satisfies `keep`.
    pub fn retain_guilds(&self, keep: impl Fn(u64) -> bool) {
        self.channels.retain(|_, guild| keep(*guild));
    }

    pub fn contains(&self, channel_id: u64) -> bool {
        self.channels.contains_key(&channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let cache = ChannelCache::new();
        cache.insert(10, 1);
        cache.insert(11, 1);
        assert!(cache.contains(10));
        assert_eq!(cache.len(), 2);

        cache.remove(10);
        assert!(!cache.contains(10));
        assert!(cache.contains(11));
    }

    #[test]
    fn test_remove_guild_keeps_other_guilds() {
        let cache = ChannelCache::new();
        cache.insert(10, 1);
        cache.insert(11, 1);
        cache.insert(20, 2);

        cache.remove_guild(1);
        assert!(!cache.contains(10));
        assert!(!cache.contains(11));
        assert!(cache.contains(20));
    }

    #[test]
    fn test_retain_guilds() {
        let cache = ChannelCache::new();
        cache.insert(10, 1);
        cache.insert(20, 2);
        cache.insert(30, 3);

        cache.retain_guilds(|guild| guild != 2);
        assert!(cache.contains(10));
        assert!(!cache.contains(20));
        assert!(cache.contains(30));
    }

    #[test]
    fn test_clones_share_state() {
        let cache = ChannelCache::new();
        let reader = cache.clone();
        cache.insert(5, 1);
        assert!(reader.contains(5));
        assert!(!reader.is_empty());
    }
}
