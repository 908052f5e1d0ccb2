//! Reward grants handed to the external reward-application collaborator.
//!
//! The core never applies experience, currency or items to a player itself;
//! it computes grants and hands them to a [`RewardSink`]. Each grant kind is
//! an explicit tagged variant rather than a free-form bag of fields.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardGrant {
    Experience { amount: i64 },
    Currency { amount: i64 },
    AscensionPoints { amount: i64 },
    Item { item_id: String },
    Title { title: String },
    SkillUnlock { skill_id: String },
}

/// External reward application. Fire-and-forget: called only after the
/// owning session state is already consistent.
pub trait RewardSink {
    fn grant(&mut self, player_id: &str, grants: &[RewardGrant]);
}

/// Default sink for hosts that wire reward application elsewhere.
#[derive(Debug, Default)]
pub struct NullRewardSink;

impl RewardSink for NullRewardSink {
    fn grant(&mut self, _player_id: &str, _grants: &[RewardGrant]) {}
}

/// Records every grant; used by tests and diagnostic hosts.
#[derive(Debug, Default)]
pub struct RecordingRewardSink {
    pub granted: Vec<(String, Vec<RewardGrant>)>,
}

impl RecordingRewardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants_for(&self, player_id: &str) -> Vec<&RewardGrant> {
        self.granted
            .iter()
            .filter(|(id, _)| id == player_id)
            .flat_map(|(_, grants)| grants.iter())
            .collect()
    }
}

impl RewardSink for RecordingRewardSink {
    fn grant(&mut self, player_id: &str, grants: &[RewardGrant]) {
        self.granted.push((player_id.to_string(), grants.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_filters_by_player() {
        let mut sink = RecordingRewardSink::new();
        sink.grant("p1", &[RewardGrant::Currency { amount: 100 }]);
        sink.grant("p2", &[RewardGrant::Experience { amount: 50 }]);
        sink.grant("p1", &[RewardGrant::Item { item_id: "tidal_trident".into() }]);

        assert_eq!(sink.grants_for("p1").len(), 2);
        assert_eq!(sink.grants_for("p2").len(), 1);
    }

    #[test]
    fn test_grant_serialization_tags_kind() {
        let grant = RewardGrant::AscensionPoints { amount: 400 };
        let json = serde_json::to_string(&grant).unwrap();
        assert!(json.contains("\"kind\":\"ascension_points\""));
    }
}
