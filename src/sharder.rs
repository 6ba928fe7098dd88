pub trait Sharder {
    /// Map `feature_id` and `user_id` to a shard in `0..total_shards`.
    fn get_shard(&self, feature_id: &str, user_id: &str, total_shards: u32) -> u32;
}

/// CRC-32 (IEEE) over `feature_id` followed by `user_id`.
///
/// This matches the bucketing of the other Molasses SDKs, so the same user lands in the same
/// bucket regardless of which SDK evaluates the feature.
pub struct Crc32Sharder;

impl Sharder for Crc32Sharder {
    fn get_shard(&self, feature_id: &str, user_id: &str, total_shards: u32) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(feature_id.as_bytes());
        hasher.update(user_id.as_bytes());
        hasher.finalize() % total_shards
    }
}

#[cfg(test)]
pub struct DeterministicSharder(pub std::collections::HashMap<String, u32>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, _feature_id: &str, user_id: &str, total_shards: u32) -> u32 {
        self.0.get(user_id).copied().unwrap_or(0) % total_shards
    }
}
