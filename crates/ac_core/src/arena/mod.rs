//! Arena matchmaking and duel match lifecycle.
//!
//! The coordinator owns the waiting queue, the active-match registry and the
//! per-player daily counters. Inbound requests and the background sweep both
//! run on the single cooperative worker, so a player can never be paired
//! twice: every pairing path removes the queue entry before the match is
//! registered.

pub mod rating;

use crate::error::{Rejection, Result};
use crate::events::{EventSink, MatchSettings, OpponentBrief, PushEvent};
use crate::store::PlayerStore;
use chrono::{DateTime, Duration, Utc};
use rating::{points_for, Outcome, RatingDirectory, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

pub const DAILY_MATCH_LIMIT: u32 = 10;
pub const RATING_BAND: i32 = 200;
pub const MAX_ROUNDS: u8 = 3;
pub const ROUND_TARGET: u32 = 100;
pub const MATCH_DURATION_SECS: i64 = 5 * 60;
pub const INTERMISSION_SECS: i64 = 10;
pub const QUEUE_WAIT_CEILING_SECS: i64 = 5 * 60;
pub const SWEEP_INTERVAL_SECS: i64 = 5;

/// One player waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub player_id: String,
    pub name: String,
    pub class: String,
    /// Rating snapshot taken at enqueue time; the sweep matches on this.
    pub rating: i32,
    pub joined_at: DateTime<Utc>,
}

/// Pairing input: identity plus the rating to match on.
#[derive(Debug, Clone)]
struct Contender {
    player_id: String,
    name: String,
    class: String,
    rating: i32,
}

impl From<WaitingEntry> for Contender {
    fn from(entry: WaitingEntry) -> Self {
        Self {
            player_id: entry.player_id,
            name: entry.name,
            class: entry.class,
            rating: entry.rating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Victory,
    Draw,
    Timeout,
}

/// One side of an active duel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub player_id: String,
    pub name: String,
    pub class: String,
    pub rating: i32,
}

/// A multi-round scored duel. Owned exclusively by the coordinator; evicted
/// from the registry the moment it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelMatch {
    pub id: String,
    pub combatants: [Combatant; 2],
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub round: u8,
    /// Damage accumulated this round, zeroed at every round boundary.
    pub round_scores: [u32; 2],
    /// Rounds taken per side, tracked apart from the round scores.
    pub round_wins: [u8; 2],
    /// Set during the intermission between rounds.
    pub resume_at: Option<DateTime<Utc>>,
    pub state: MatchState,
}

impl DuelMatch {
    pub fn side_of(&self, player_id: &str) -> Option<usize> {
        self.combatants.iter().position(|c| c.player_id == player_id)
    }

    pub fn is_active(&self) -> bool {
        self.state == MatchState::Active
    }

    fn score_map(&self) -> BTreeMap<String, u32> {
        self.combatants
            .iter()
            .zip(self.round_scores.iter())
            .map(|(c, s)| (c.player_id.clone(), *s))
            .collect()
    }

    fn round_win_map(&self) -> BTreeMap<String, u8> {
        self.combatants
            .iter()
            .zip(self.round_wins.iter())
            .map(|(c, w)| (c.player_id.clone(), *w))
            .collect()
    }
}

/// Outcome of a match request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRequestOutcome {
    /// No compatible opponent was waiting; the requester joined the queue.
    Queued { position: usize },
    Paired { match_id: String, opponent_id: String },
}

/// Per-player arena summary for the read-only query surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaInfo {
    pub record: rating::RatingRecord,
    pub rank: Option<u32>,
    pub daily_matches_played: u32,
    pub daily_matches_remaining: u32,
}

#[derive(Debug, Default)]
pub struct MatchCoordinator {
    queue: Vec<WaitingEntry>,
    matches: HashMap<String, DuelMatch>,
    by_player: HashMap<String, String>,
    daily_matches: HashMap<String, u32>,
    last_sweep: Option<DateTime<Utc>>,
}

impl MatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn get_match(&self, match_id: &str) -> Option<&DuelMatch> {
        self.matches.get(match_id)
    }

    pub fn match_id_of(&self, player_id: &str) -> Option<&String> {
        self.by_player.get(player_id)
    }

    pub fn daily_matches_played(&self, player_id: &str) -> u32 {
        self.daily_matches.get(player_id).copied().unwrap_or(0)
    }

    /// Find an opponent for `player_id` or enqueue them.
    ///
    /// Greedy single-pass FIFO scan: the first waiting entry within
    /// [`RATING_BAND`] wins, regardless of whether a later entry would be a
    /// closer match.
    pub fn request_match(
        &mut self,
        player_id: &str,
        ratings: &mut RatingDirectory,
        store: &dyn PlayerStore,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> Result<MatchRequestOutcome> {
        let profile = store
            .get(player_id)
            .ok_or_else(|| Rejection::UnknownPlayer(player_id.to_string()))?;
        let (name, class) = (profile.name.clone(), profile.class.clone());

        if self.daily_matches_played(player_id) >= DAILY_MATCH_LIMIT {
            return Err(Rejection::DailyLimitReached { limit: DAILY_MATCH_LIMIT });
        }
        if self.by_player.contains_key(player_id) {
            return Err(Rejection::AlreadyInMatch);
        }
        if self.queue.iter().any(|e| e.player_id == player_id) {
            return Err(Rejection::AlreadyQueued);
        }

        let rating = ratings.ensure(player_id, &name).rating;

        let found = self
            .queue
            .iter()
            .position(|e| e.player_id != player_id && (e.rating - rating).abs() <= RATING_BAND);

        match found {
            Some(idx) => {
                let opponent = self.queue.remove(idx);
                let opponent_id = opponent.player_id.clone();
                let requester = Contender {
                    player_id: player_id.to_string(),
                    name,
                    class,
                    rating,
                };
                let match_id = self.start_match(opponent.into(), requester, ratings, events, now);
                Ok(MatchRequestOutcome::Paired { match_id, opponent_id })
            }
            None => {
                self.queue.push(WaitingEntry {
                    player_id: player_id.to_string(),
                    name,
                    class,
                    rating,
                    joined_at: now,
                });
                Ok(MatchRequestOutcome::Queued { position: self.queue.len() })
            }
        }
    }

    fn start_match(
        &mut self,
        a: Contender,
        b: Contender,
        ratings: &RatingDirectory,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> String {
        let match_id = format!("match_{}", Uuid::new_v4().simple());
        let duel = DuelMatch {
            id: match_id.clone(),
            combatants: [
                Combatant {
                    player_id: a.player_id.clone(),
                    name: a.name,
                    class: a.class,
                    rating: a.rating,
                },
                Combatant {
                    player_id: b.player_id.clone(),
                    name: b.name,
                    class: b.class,
                    rating: b.rating,
                },
            ],
            started_at: now,
            ends_at: now + Duration::seconds(MATCH_DURATION_SECS),
            round: 1,
            round_scores: [0, 0],
            round_wins: [0, 0],
            resume_at: None,
            state: MatchState::Active,
        };

        for side in 0..2 {
            let me = &duel.combatants[side];
            let other = &duel.combatants[1 - side];
            *self.daily_matches.entry(me.player_id.clone()).or_insert(0) += 1;
            self.by_player.insert(me.player_id.clone(), match_id.clone());
            events.send_to(
                &me.player_id,
                PushEvent::MatchFound {
                    match_id: match_id.clone(),
                    opponent: OpponentBrief {
                        id: other.player_id.clone(),
                        name: other.name.clone(),
                        class: other.class.clone(),
                        rating: other.rating,
                        tier: ratings
                            .get(&other.player_id)
                            .map(|r| r.tier)
                            .unwrap_or(Tier::Novice),
                    },
                    settings: MatchSettings {
                        duration_ms: MATCH_DURATION_SECS * 1000,
                        max_rounds: MAX_ROUNDS,
                    },
                },
            );
        }

        info!(
            match_id = %match_id,
            a = %duel.combatants[0].player_id,
            b = %duel.combatants[1].player_id,
            "arena match started"
        );
        self.matches.insert(match_id.clone(), duel);
        match_id
    }

    /// Credit client-reported damage to the reporter's round score. A score
    /// reaching [`ROUND_TARGET`] ends the round.
    pub fn record_damage(
        &mut self,
        match_id: &str,
        player_id: &str,
        amount: u32,
        ratings: &mut RatingDirectory,
        store: &mut dyn PlayerStore,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (round_done, winner_side) = {
            let duel = self
                .matches
                .get_mut(match_id)
                .filter(|m| m.is_active())
                .ok_or(Rejection::MatchUnavailable)?;
            let side = duel.side_of(player_id).ok_or(Rejection::MatchUnavailable)?;

            // Client-reported; a hostile amount must not overflow the score.
            duel.round_scores[side] = duel.round_scores[side].saturating_add(amount);
            let update = PushEvent::ScoreUpdate {
                match_id: match_id.to_string(),
                scores: duel.score_map(),
                round: duel.round,
            };
            for c in &duel.combatants {
                events.send_to(&c.player_id, update.clone());
            }
            (duel.round_scores[side] >= ROUND_TARGET, side)
        };

        if round_done {
            self.finish_round(match_id, winner_side, ratings, store, events, now);
        }
        Ok(())
    }

    /// Round boundary: bank the round win, zero both scores, advance the
    /// round counter, then either resolve the match or open the
    /// intermission.
    fn finish_round(
        &mut self,
        match_id: &str,
        winner_side: usize,
        ratings: &mut RatingDirectory,
        store: &mut dyn PlayerStore,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let decision = {
            let duel = match self.matches.get_mut(match_id) {
                Some(m) if m.is_active() => m,
                _ => return,
            };
            duel.round_wins[winner_side] += 1;
            duel.round_scores = [0, 0];
            duel.round += 1;

            if duel.round > MAX_ROUNDS {
                Some(Self::leader_by_round_wins(duel))
            } else {
                let ended_round = duel.round - 1;
                let winner_id = duel.combatants[winner_side].player_id.clone();
                let event = PushEvent::RoundEnded {
                    match_id: match_id.to_string(),
                    round: ended_round,
                    winner: winner_id,
                    next_round: duel.round,
                    round_wins: duel.round_win_map(),
                };
                duel.resume_at = Some(now + Duration::seconds(INTERMISSION_SECS));
                for c in &duel.combatants {
                    events.send_to(&c.player_id, event.clone());
                }
                None
            }
        };

        if let Some(winner) = decision {
            let reason = if winner.is_some() { EndReason::Victory } else { EndReason::Draw };
            self.resolve(match_id, reason, winner, ratings, store, events, now);
        }
    }

    fn leader_by_round_wins(duel: &DuelMatch) -> Option<usize> {
        match duel.round_wins[0].cmp(&duel.round_wins[1]) {
            std::cmp::Ordering::Greater => Some(0),
            std::cmp::Ordering::Less => Some(1),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Terminal transition. Tolerates the match already being resolved or
    /// evicted (late timeout), in which case it is a no-op.
    fn resolve(
        &mut self,
        match_id: &str,
        reason: EndReason,
        winner_side: Option<usize>,
        ratings: &mut RatingDirectory,
        store: &mut dyn PlayerStore,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        // Eviction doubles as the terminal marker: a match id absent from
        // the registry turns any late timer firing into a no-op.
        let Some(mut duel) = self.matches.remove(match_id) else {
            return;
        };
        duel.state = MatchState::Ended;

        let ids = [&duel.combatants[0].player_id, &duel.combatants[1].player_id];
        let outcomes = match winner_side {
            Some(0) => [Outcome::Win, Outcome::Loss],
            Some(_) => [Outcome::Loss, Outcome::Win],
            None => [Outcome::Draw, Outcome::Draw],
        };

        ratings.ensure(ids[0], &duel.combatants[0].name);
        ratings.ensure(ids[1], &duel.combatants[1].name);
        let (points_a, points_b) = match (ratings.get(ids[0]), ratings.get(ids[1])) {
            (Some(ra), Some(rb)) => {
                (points_for(outcomes[0], ra, rb), points_for(outcomes[1], rb, ra))
            }
            _ => (0, 0),
        };

        // Rating, counters, streaks and tier move together with the match
        // resolution; nothing can interleave on the cooperative worker.
        let points = [points_a, points_b];
        for side in 0..2 {
            if let Some(record) = ratings.get_mut(ids[side]) {
                record.apply(outcomes[side], points[side], now);
            }
            store.update(ids[side], &mut |p| p.ascension_points += points[side] as i64);
            self.by_player.remove(ids[side]);
        }

        let winner_id = winner_side.map(|s| duel.combatants[s].player_id.clone());
        let point_map: BTreeMap<String, i32> =
            ids.iter().zip(points.iter()).map(|(id, p)| (id.to_string(), *p)).collect();
        let event = PushEvent::MatchEnded {
            match_id: match_id.to_string(),
            winner: winner_id.clone(),
            reason,
            points: point_map,
            duration_ms: (now - duel.started_at).num_milliseconds(),
        };
        for id in ids {
            events.send_to(id, event.clone());
        }

        info!(
            match_id = %match_id,
            ?reason,
            winner = winner_id.as_deref().unwrap_or("-"),
            "arena match resolved"
        );
    }

    /// Per-tick duties: match timeouts, intermission expiry and the periodic
    /// queue sweep.
    pub fn tick(
        &mut self,
        ratings: &mut RatingDirectory,
        store: &mut dyn PlayerStore,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let timed_out: Vec<String> = self
            .matches
            .values()
            .filter(|m| m.is_active() && now >= m.ends_at)
            .map(|m| m.id.clone())
            .collect();
        for match_id in timed_out {
            let winner = self.matches.get(&match_id).and_then(Self::leader_by_round_wins);
            self.resolve(&match_id, EndReason::Timeout, winner, ratings, store, events, now);
        }

        let resuming: Vec<(String, u8)> = self
            .matches
            .values_mut()
            .filter(|m| m.is_active() && m.resume_at.is_some_and(|at| now >= at))
            .map(|m| {
                m.resume_at = None;
                (m.id.clone(), m.round)
            })
            .collect();
        for (match_id, round) in resuming {
            let recipients: Vec<String> = self
                .matches
                .get(&match_id)
                .map(|m| m.combatants.iter().map(|c| c.player_id.clone()).collect())
                .unwrap_or_default();
            for id in recipients {
                events.send_to(&id, PushEvent::RoundStarted { match_id: match_id.clone(), round });
            }
        }

        let sweep_due = self
            .last_sweep
            .map(|at| (now - at).num_seconds() >= SWEEP_INTERVAL_SECS)
            .unwrap_or(true);
        if sweep_due {
            self.last_sweep = Some(now);
            self.sweep(ratings, events, now);
        }
    }

    /// Evict stale entries, then pair the first admissible couple found in
    /// outer-loop order. At most one pair per sweep; the next sweep picks up
    /// the rest.
    fn sweep(
        &mut self,
        ratings: &RatingDirectory,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let before = self.queue.len();
        self.queue
            .retain(|e| (now - e.joined_at).num_seconds() < QUEUE_WAIT_CEILING_SECS);
        if self.queue.len() < before {
            debug!(evicted = before - self.queue.len(), "queue wait ceiling evictions");
        }

        let mut pair: Option<(usize, usize)> = None;
        'outer: for i in 0..self.queue.len() {
            for j in (i + 1)..self.queue.len() {
                if (self.queue[i].rating - self.queue[j].rating).abs() <= RATING_BAND {
                    pair = Some((i, j));
                    break 'outer;
                }
            }
        }

        if let Some((i, j)) = pair {
            // Remove the later index first so the earlier stays valid.
            let b = self.queue.remove(j);
            let a = self.queue.remove(i);
            self.start_match(a.into(), b.into(), ratings, events, now);
        }
    }

    /// Daily external trigger: every per-player counter back to zero.
    pub fn reset_daily(&mut self) {
        self.daily_matches.clear();
        info!("daily arena match counters reset");
    }

    pub fn arena_info(
        &self,
        player_id: &str,
        ratings: &RatingDirectory,
    ) -> Option<ArenaInfo> {
        let record = ratings.get(player_id)?.clone();
        let played = self.daily_matches_played(player_id);
        Some(ArenaInfo {
            rank: ratings.rank_of(player_id),
            record,
            daily_matches_played: played,
            daily_matches_remaining: DAILY_MATCH_LIMIT.saturating_sub(played),
        })
    }
}
