use crate::{
    catalog::{Feature, FeatureCatalog, Segment, SegmentType},
    sharder::{Crc32Sharder, Sharder},
    User,
};

/// Percentage rollouts bucket users into this many shards.
const TOTAL_SHARDS: u32 = 100;

impl FeatureCatalog {
    /// Decide whether `feature_key` is active for `user`.
    ///
    /// Unknown and inactive features are inactive for everyone. Evaluation never fails and never
    /// performs I/O.
    pub fn is_active(&self, feature_key: &str, user: &User) -> bool {
        self.eval_feature(feature_key, user, &Crc32Sharder)
    }

    pub(crate) fn eval_feature(
        &self,
        feature_key: &str,
        user: &User,
        sharder: &impl Sharder,
    ) -> bool {
        let Some(feature) = self.get_feature(feature_key) else {
            log::trace!(target: "molasses", feature_key, user_id:display = user.id; "feature not found");
            return false;
        };
        feature.eval(user, sharder)
    }
}

impl Feature {
    /// The first segment that both matches `user` and admits it through the percentage rollout
    /// decides the outcome.
    pub(crate) fn eval(&self, user: &User, sharder: &impl Sharder) -> bool {
        if !self.active {
            return false;
        }

        let Some(segment) = self
            .segments
            .iter()
            .find(|segment| segment.admits(&self.id, user, sharder))
        else {
            return false;
        };

        segment.segment_type.is_active()
    }
}

impl Segment {
    fn admits(&self, feature_id: &str, user: &User, sharder: &impl Sharder) -> bool {
        self.matches(user) && self.is_in_rollout(feature_id, user, sharder)
    }

    /// Anonymous users have nothing stable to bucket on and are always in.
    fn is_in_rollout(&self, feature_id: &str, user: &User, sharder: &impl Sharder) -> bool {
        if user.is_anonymous() {
            return true;
        }
        let shard = sharder.get_shard(feature_id, &user.id, TOTAL_SHARDS);
        f64::from(shard) < self.percentage
    }
}

impl SegmentType {
    /// Outcome for a user that landed in a segment of this type.
    fn is_active(self) -> bool {
        match self {
            SegmentType::AlwaysControl => false,
            SegmentType::AlwaysExperiment | SegmentType::EveryoneElse => true,
        }
    }
}
