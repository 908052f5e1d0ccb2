//! Instance sessions: membership, spawns and performance-weighted rewards.

use crate::error::{Rejection, Result};
use crate::events::{EventSink, MemberBrief, PushEvent};
use crate::rewards::{RewardGrant, RewardSink};
use crate::shard::template::{InstanceTemplate, RewardTemplate, ShardType};
use crate::store::PlayerStore;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

/// Completed sessions linger this long before being purged.
pub const PURGE_GRACE_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceEndReason {
    Objective,
    Timeout,
}

/// Per-member combat accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub kills: u32,
    pub damage_dealt: u64,
    pub damage_taken: u64,
}

impl PerformanceStats {
    /// Reward scaling: kills and damage dealt push the multiplier up, heavy
    /// damage taken pulls it down, and the result always lands in
    /// [0.5, 2.0].
    pub fn multiplier(&self) -> f64 {
        let mut multiplier = 1.0
            + f64::from(self.kills) * 0.05
            + (self.damage_dealt as f64 / 10_000.0).min(1.0);
        if self.damage_taken > 5_000 {
            multiplier -= 0.2;
        }
        multiplier.clamp(0.5, 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceMember {
    pub player_id: String,
    pub name: String,
    pub class: String,
    pub level: u32,
    pub joined_at: DateTime<Utc>,
    pub stats: PerformanceStats,
}

impl InstanceMember {
    fn brief(&self) -> MemberBrief {
        MemberBrief {
            id: self.player_id.clone(),
            name: self.name.clone(),
            class: self.class.clone(),
            level: self.level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One concrete enemy materialized from a template's enemy pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnedEnemy {
    pub id: String,
    pub enemy_type: String,
    pub level: u32,
    pub health: u32,
    pub max_health: u32,
    pub damage: u32,
    pub stage: u32,
    pub position: Position,
}

/// What one member takes away from a completed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReward {
    pub multiplier: f64,
    pub grants: Vec<RewardGrant>,
    pub stats: PerformanceStats,
}

/// One joinable, time-bounded encounter spawned from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSession {
    pub instance_id: String,
    pub template: InstanceTemplate,
    pub status: InstanceStatus,
    pub members: Vec<InstanceMember>,
    pub enemies: Vec<SpawnedEnemy>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<InstanceEndReason>,
    pub purge_at: Option<DateTime<Utc>>,
}

impl InstanceSession {
    pub fn shard_type(&self) -> ShardType {
        self.template.shard_type
    }

    pub fn member(&self, player_id: &str) -> Option<&InstanceMember> {
        self.members.iter().find(|m| m.player_id == player_id)
    }

    pub fn total_kills(&self) -> u32 {
        self.members.iter().map(|m| m.stats.kills).sum()
    }

    fn briefs(&self) -> Vec<MemberBrief> {
        self.members.iter().map(InstanceMember::brief).collect()
    }
}

/// Owns the live instance registry and every session's lifecycle.
#[derive(Debug)]
pub struct InstanceCoordinator {
    sessions: HashMap<String, InstanceSession>,
    rng: ChaCha8Rng,
}

impl Default for InstanceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceCoordinator {
    pub fn new() -> Self {
        Self { sessions: HashMap::new(), rng: ChaCha8Rng::from_entropy() }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { sessions: HashMap::new(), rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn get(&self, instance_id: &str) -> Option<&InstanceSession> {
        self.sessions.get(instance_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Non-completed sessions, ordered by id for stable query output.
    pub fn active_sessions(&self) -> Vec<&InstanceSession> {
        let mut active: Vec<&InstanceSession> = self
            .sessions
            .values()
            .filter(|s| s.status != InstanceStatus::Completed)
            .collect();
        active.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        active
    }

    /// Materialize an open session from a template.
    pub fn spawn_session(&mut self, template: &InstanceTemplate, now: DateTime<Utc>) -> String {
        let instance_id =
            format!("instance_{}_{}", template.shard_type.key(), Uuid::new_v4().simple());
        info!(instance = %instance_id, template = %template.id, "instance session spawned");
        self.sessions.insert(
            instance_id.clone(),
            InstanceSession {
                instance_id: instance_id.clone(),
                template: template.clone(),
                status: InstanceStatus::Open,
                members: Vec::new(),
                enemies: Vec::new(),
                created_at: now,
                started_at: None,
                ends_at: None,
                ended_at: None,
                end_reason: None,
                purge_at: None,
            },
        );
        instance_id
    }

    /// Join an open session. A full roster auto-starts the encounter.
    pub fn enter(
        &mut self,
        player_id: &str,
        instance_id: &str,
        store: &dyn PlayerStore,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let profile = store
            .get(player_id)
            .ok_or_else(|| Rejection::UnknownPlayer(player_id.to_string()))?;

        let auto_start = {
            let session = self
                .sessions
                .get_mut(instance_id)
                .filter(|s| s.status == InstanceStatus::Open)
                .ok_or(Rejection::InstanceUnavailable)?;

            if session.member(player_id).is_some() {
                // Re-entry while already on the roster is harmless.
                return Ok(());
            }
            if session.members.len() as u32 >= session.template.max_players {
                return Err(Rejection::InstanceFull);
            }
            for requirement in &session.template.requirements {
                requirement.check(profile)?;
            }

            let entrant = InstanceMember {
                player_id: player_id.to_string(),
                name: profile.name.clone(),
                class: profile.class.clone(),
                level: profile.level,
                joined_at: now,
                stats: PerformanceStats::default(),
            };
            let brief = entrant.brief();
            session.members.push(entrant);

            let joined = PushEvent::InstanceMemberJoined {
                instance_id: instance_id.to_string(),
                player: brief,
                current_players: session.members.len() as u32,
                max_players: session.template.max_players,
            };
            for member in &session.members {
                events.send_to(&member.player_id, joined.clone());
            }
            events.send_to(
                player_id,
                PushEvent::InstanceEntered {
                    instance_id: instance_id.to_string(),
                    template_id: session.template.id.clone(),
                    members: session.briefs(),
                    enemies: session.enemies.clone(),
                },
            );

            session.members.len() as u32 == session.template.max_players
        };

        if auto_start {
            self.start(instance_id, events, now)?;
        }
        Ok(())
    }

    /// Open → in-progress: spawn the encounter content and arm the hard
    /// timeout.
    pub fn start(
        &mut self,
        instance_id: &str,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(instance_id)
            .filter(|s| s.status == InstanceStatus::Open)
            .ok_or(Rejection::InstanceUnavailable)?;

        session.status = InstanceStatus::InProgress;
        session.started_at = Some(now);
        session.ends_at = Some(now + Duration::seconds(session.template.duration_secs));

        let stages = session.template.stages.max(1);
        let mut enemies = Vec::new();
        for spec in &session.template.enemies {
            let per_stage = spec.count as f64 / stages as f64;
            for i in 0..spec.count {
                let stage = ((i as f64 / per_stage).floor() as u32 + 1).min(stages);
                enemies.push(SpawnedEnemy {
                    id: format!("enemy_{}", Uuid::new_v4().simple()),
                    enemy_type: spec.enemy_type.clone(),
                    level: spec.level,
                    health: 100 * spec.level,
                    max_health: 100 * spec.level,
                    damage: 10 * spec.level,
                    stage,
                    position: Position {
                        x: 100.0 + self.rng.gen::<f64>() * 600.0,
                        y: 100.0 + self.rng.gen::<f64>() * 400.0,
                    },
                });
            }
        }
        session.enemies = enemies;

        info!(
            instance = %instance_id,
            enemies = session.enemies.len(),
            "instance started"
        );
        let started = PushEvent::InstanceStarted {
            instance_id: instance_id.to_string(),
            start_time: now,
            duration_secs: session.template.duration_secs,
            stages: session.template.stages,
            enemies: session.enemies.clone(),
        };
        for member in &session.members {
            events.send_to(&member.player_id, started.clone());
        }
        Ok(())
    }

    /// Fold combat reports into a member's accumulator.
    pub fn record_combat(
        &mut self,
        instance_id: &str,
        player_id: &str,
        kills: u32,
        damage_dealt: u64,
        damage_taken: u64,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(instance_id)
            .filter(|s| s.status == InstanceStatus::InProgress)
            .ok_or(Rejection::InstanceUnavailable)?;
        let member = session
            .members
            .iter_mut()
            .find(|m| m.player_id == player_id)
            .ok_or_else(|| Rejection::UnknownPlayer(player_id.to_string()))?;

        // Client-reported; hostile amounts must not overflow the counters.
        member.stats.kills = member.stats.kills.saturating_add(kills);
        member.stats.damage_dealt = member.stats.damage_dealt.saturating_add(damage_dealt);
        member.stats.damage_taken = member.stats.damage_taken.saturating_add(damage_taken);
        Ok(())
    }

    /// Terminal transition: compute per-member rewards, hand them to the
    /// external collaborator, broadcast completion and arm the purge timer.
    /// Already-completed sessions make this a no-op, so a late timeout after
    /// an early objective completion never double-pays.
    pub fn complete(
        &mut self,
        instance_id: &str,
        reason: InstanceEndReason,
        store: &mut dyn PlayerStore,
        rewards: &mut dyn RewardSink,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(instance_id)
            .ok_or(Rejection::InstanceUnavailable)?;
        if session.status == InstanceStatus::Completed {
            return Ok(());
        }

        session.status = InstanceStatus::Completed;
        session.ended_at = Some(now);
        session.end_reason = Some(reason);
        session.purge_at = Some(now + Duration::seconds(PURGE_GRACE_SECS));

        let mut reward_map: BTreeMap<String, MemberReward> = BTreeMap::new();
        for member in &session.members {
            let multiplier = member.stats.multiplier();
            let base = &session.template.rewards;
            let points = (base.ascension_points as f64 * multiplier).floor() as i64;
            let mut grants = vec![
                RewardGrant::Experience {
                    amount: (base.experience as f64 * multiplier).floor() as i64,
                },
                RewardGrant::Currency {
                    amount: (base.currency as f64 * multiplier).floor() as i64,
                },
                RewardGrant::AscensionPoints { amount: points },
            ];
            for item_id in
                roll_loot(&mut self.rng, base, session.template.shard_type, multiplier)
            {
                grants.push(RewardGrant::Item { item_id });
            }

            store.update(&member.player_id, &mut |p| {
                p.ascension_points += points;
                p.seasonal.instance_completions += 1;
            });
            rewards.grant(&member.player_id, &grants);
            reward_map.insert(
                member.player_id.clone(),
                MemberReward { multiplier, grants, stats: member.stats },
            );
        }

        let completed = PushEvent::InstanceCompleted {
            instance_id: instance_id.to_string(),
            reason,
            rewards: reward_map,
            duration_ms: (now - session.started_at.unwrap_or(session.created_at))
                .num_milliseconds(),
            kills: session.total_kills(),
        };
        for member in &session.members {
            events.send_to(&member.player_id, completed.clone());
        }

        info!(instance = %instance_id, ?reason, "instance completed");
        Ok(())
    }

    /// Per-tick duties: hard timeouts and post-completion purges.
    pub fn tick(
        &mut self,
        store: &mut dyn PlayerStore,
        rewards: &mut dyn RewardSink,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let timed_out: Vec<String> = self
            .sessions
            .values()
            .filter(|s| {
                s.status == InstanceStatus::InProgress
                    && s.ends_at.is_some_and(|at| now >= at)
            })
            .map(|s| s.instance_id.clone())
            .collect();
        for instance_id in timed_out {
            // The session cannot have vanished between collection and here,
            // but completion tolerates it anyway.
            let _ = self.complete(
                &instance_id,
                InstanceEndReason::Timeout,
                store,
                rewards,
                events,
                now,
            );
        }

        let purgable: Vec<String> = self
            .sessions
            .values()
            .filter(|s| {
                s.status == InstanceStatus::Completed
                    && s.purge_at.is_some_and(|at| now >= at)
            })
            .map(|s| s.instance_id.clone())
            .collect();
        for instance_id in purgable {
            self.sessions.remove(&instance_id);
            debug!(instance = %instance_id, "completed session purged");
        }
    }
}

/// One guaranteed pool item, an epic roll for a second, and a rare
/// legendary-tier roll, all scaled by the performance multiplier.
fn roll_loot(
    rng: &mut ChaCha8Rng,
    rewards: &RewardTemplate,
    shard_type: ShardType,
    multiplier: f64,
) -> Vec<String> {
    let mut loot = Vec::new();
    if let Some(item) = rewards.item_pool.choose(rng) {
        loot.push(item.clone());
    }
    if rng.gen::<f64>() < rewards.epic_chance * multiplier {
        if let Some(item) = rewards.item_pool.choose(rng) {
            loot.push(item.clone());
        }
    }
    if rng.gen::<f64>() < rewards.legendary_chance * multiplier {
        loot.push(shard_type.legendary_item());
    }
    loot
}
