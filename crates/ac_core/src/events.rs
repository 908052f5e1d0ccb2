//! Server-to-client push events and the delivery seam.
//!
//! Coordinators emit through the [`EventSink`] trait and never talk to a
//! transport directly. [`EventQueue`] collects envelopes for the host to
//! drain after each action or tick.

use crate::arena::EndReason;
use crate::ranking::LeaderboardEntry;
use crate::rewards::RewardGrant;
use crate::shard::instance::{InstanceEndReason, MemberReward, SpawnedEnemy};
use crate::shard::template::ShardType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opponent summary sent with a `matchFound` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentBrief {
    pub id: String,
    pub name: String,
    pub class: String,
    pub rating: i32,
    pub tier: crate::arena::rating::Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSettings {
    pub duration_ms: i64,
    pub max_rounds: u8,
}

/// Roster summary used by instance events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBrief {
    pub id: String,
    pub name: String,
    pub class: String,
    pub level: u32,
}

/// Top slices of one leaderboard category, as broadcast after a recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySlices {
    pub top10: Vec<LeaderboardEntry>,
    pub top100: Vec<LeaderboardEntry>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PushEvent {
    MatchFound {
        match_id: String,
        opponent: OpponentBrief,
        settings: MatchSettings,
    },
    ScoreUpdate {
        match_id: String,
        scores: BTreeMap<String, u32>,
        round: u8,
    },
    RoundEnded {
        match_id: String,
        round: u8,
        winner: String,
        next_round: u8,
        round_wins: BTreeMap<String, u8>,
    },
    RoundStarted {
        match_id: String,
        round: u8,
    },
    MatchEnded {
        match_id: String,
        winner: Option<String>,
        reason: EndReason,
        points: BTreeMap<String, i32>,
        duration_ms: i64,
    },
    ShardEchoActivated {
        shard_type: ShardType,
        instance_id: String,
        duration_ms: i64,
        ends_at: DateTime<Utc>,
    },
    ShardEchoDeactivated {
        shard_type: ShardType,
        instance_id: String,
        next_activation: DateTime<Utc>,
    },
    InstanceMemberJoined {
        instance_id: String,
        player: MemberBrief,
        current_players: u32,
        max_players: u32,
    },
    InstanceEntered {
        instance_id: String,
        template_id: String,
        members: Vec<MemberBrief>,
        enemies: Vec<SpawnedEnemy>,
    },
    InstanceStarted {
        instance_id: String,
        start_time: DateTime<Utc>,
        duration_secs: i64,
        stages: u32,
        enemies: Vec<SpawnedEnemy>,
    },
    InstanceCompleted {
        instance_id: String,
        reason: InstanceEndReason,
        rewards: BTreeMap<String, MemberReward>,
        duration_ms: i64,
        kills: u32,
    },
    LeaderboardsUpdated {
        season: u32,
        categories: BTreeMap<String, CategorySlices>,
    },
    SeasonStarted {
        season: u32,
        name: String,
        time_remaining_ms: i64,
    },
    SeasonRewardsReceived {
        season: u32,
        rank: u32,
        rewards: Vec<RewardGrant>,
        next_season_start: DateTime<Utc>,
    },
}

/// Who an envelope is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Player(String),
    Everyone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub audience: Audience,
    pub event: PushEvent,
}

/// Outbound delivery seam.
pub trait EventSink {
    fn send_to(&mut self, player_id: &str, event: PushEvent);
    fn broadcast(&mut self, event: PushEvent);
}

/// Vec-backed sink drained by the host between actions.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    queued: Vec<Envelope>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queued)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Events addressed to one player, broadcasts included.
    pub fn visible_to(&self, player_id: &str) -> Vec<&PushEvent> {
        self.queued
            .iter()
            .filter(|e| match &e.audience {
                Audience::Player(id) => id == player_id,
                Audience::Everyone => true,
            })
            .map(|e| &e.event)
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<&PushEvent> {
        self.queued
            .iter()
            .filter(|e| e.audience == Audience::Everyone)
            .map(|e| &e.event)
            .collect()
    }
}

impl EventSink for EventQueue {
    fn send_to(&mut self, player_id: &str, event: PushEvent) {
        self.queued.push(Envelope { audience: Audience::Player(player_id.to_string()), event });
    }

    fn broadcast(&mut self, event: PushEvent) {
        self.queued.push(Envelope { audience: Audience::Everyone, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_routes_by_audience() {
        let mut queue = EventQueue::new();
        queue.send_to("p1", PushEvent::RoundStarted { match_id: "m1".into(), round: 2 });
        queue.broadcast(PushEvent::SeasonStarted {
            season: 2,
            name: "Clash of Shards".into(),
            time_remaining_ms: 1000,
        });

        assert_eq!(queue.visible_to("p1").len(), 2);
        assert_eq!(queue.visible_to("p2").len(), 1);
        assert_eq!(queue.broadcasts().len(), 1);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_event_names_serialize_camel_case() {
        let event = PushEvent::RoundStarted { match_id: "m1".into(), round: 1 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "roundStarted");
        assert_eq!(json["data"]["matchId"], "m1");
    }
}
