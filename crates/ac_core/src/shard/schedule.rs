//! Recurring activation windows for shard echoes.
//!
//! Each shard type cycles on its own interval: a window opens, an instance
//! session spawns for it, and after the active window closes the shard goes
//! dormant until the next interval elapses. All of it is driven from
//! [`InstanceScheduler::tick`], there are no background timers.

use crate::events::{EventSink, PushEvent};
use crate::shard::instance::InstanceCoordinator;
use crate::shard::template::{ShardType, TemplateRegistry};
use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Activation checks run at most this often.
pub const CHECK_INTERVAL_SECS: i64 = 60;

/// Cycle state for one shard type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSchedule {
    pub shard_type: ShardType,
    pub last_activation: DateTime<Utc>,
    /// Time between the starts of consecutive windows.
    pub interval_secs: i64,
    /// How long an opened window stays joinable.
    pub active_window_secs: i64,
    pub active: bool,
    pub deactivate_at: Option<DateTime<Utc>>,
    pub current_instance: Option<String>,
}

impl ShardSchedule {
    pub fn next_activation(&self) -> DateTime<Utc> {
        self.last_activation + Duration::seconds(self.interval_secs)
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        !self.active && now >= self.next_activation()
    }
}

/// Drives the shard echo cycles and spawns instance sessions into the
/// coordinator when a window opens.
#[derive(Debug)]
pub struct InstanceScheduler {
    schedules: BTreeMap<ShardType, ShardSchedule>,
    rng: ChaCha8Rng,
    last_check: Option<DateTime<Utc>>,
}

impl InstanceScheduler {
    /// Seed the standard cycles. Every shard is immediately due, so the
    /// first tick opens all three windows.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::build(now, ChaCha8Rng::from_entropy())
    }

    pub fn with_seed(now: DateTime<Utc>, seed: u64) -> Self {
        Self::build(now, ChaCha8Rng::seed_from_u64(seed))
    }

    fn build(now: DateTime<Utc>, rng: ChaCha8Rng) -> Self {
        let cycles = [
            (ShardType::Water, 24 * 3600, 2 * 3600),
            (ShardType::Fire, 48 * 3600, 3 * 3600),
            (ShardType::Earth, 72 * 3600, 4 * 3600),
        ];
        let mut schedules = BTreeMap::new();
        for (shard_type, interval_secs, active_window_secs) in cycles {
            schedules.insert(
                shard_type,
                ShardSchedule {
                    shard_type,
                    last_activation: now - Duration::seconds(interval_secs),
                    interval_secs,
                    active_window_secs,
                    active: false,
                    deactivate_at: None,
                    current_instance: None,
                },
            );
        }
        Self { schedules, rng, last_check: None }
    }

    pub fn schedule(&self, shard_type: ShardType) -> Option<&ShardSchedule> {
        self.schedules.get(&shard_type)
    }

    pub fn schedules(&self) -> impl Iterator<Item = &ShardSchedule> {
        self.schedules.values()
    }

    /// Close expired windows, then open due ones. Gated to once per
    /// [`CHECK_INTERVAL_SECS`] so hosts can call this every tick.
    pub fn tick(
        &mut self,
        templates: &mut TemplateRegistry,
        instances: &mut InstanceCoordinator,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        if let Some(last) = self.last_check {
            if (now - last).num_seconds() < CHECK_INTERVAL_SECS {
                return;
            }
        }
        self.last_check = Some(now);

        for schedule in self.schedules.values_mut() {
            if schedule.active && schedule.deactivate_at.is_some_and(|at| now >= at) {
                schedule.active = false;
                schedule.deactivate_at = None;
                let instance_id = schedule.current_instance.take().unwrap_or_default();
                info!(shard = schedule.shard_type.key(), "shard echo window closed");
                events.broadcast(PushEvent::ShardEchoDeactivated {
                    shard_type: schedule.shard_type,
                    instance_id,
                    next_activation: schedule.next_activation(),
                });
            }
        }

        let due: Vec<ShardType> = self
            .schedules
            .values()
            .filter(|s| s.due(now))
            .map(|s| s.shard_type)
            .collect();
        for shard_type in due {
            self.activate(shard_type, templates, instances, events, now);
        }
    }

    fn activate(
        &mut self,
        shard_type: ShardType,
        templates: &mut TemplateRegistry,
        instances: &mut InstanceCoordinator,
        events: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) {
        let template = match templates.for_shard(shard_type) {
            Some(template) => template.clone(),
            None => {
                // Registry gaps never block the cycle.
                warn!(shard = shard_type.key(), "no template registered, generating one");
                templates.generate_for(shard_type, &mut self.rng).clone()
            }
        };
        let instance_id = instances.spawn_session(&template, now);

        // The shard type is always present; schedules are fixed at startup.
        let Some(schedule) = self.schedules.get_mut(&shard_type) else {
            return;
        };
        schedule.last_activation = now;
        schedule.active = true;
        schedule.deactivate_at = Some(now + Duration::seconds(schedule.active_window_secs));
        schedule.current_instance = Some(instance_id.clone());

        info!(
            shard = shard_type.key(),
            instance = %instance_id,
            window_secs = schedule.active_window_secs,
            "shard echo window opened"
        );
        events.broadcast(PushEvent::ShardEchoActivated {
            shard_type,
            instance_id,
            duration_ms: schedule.active_window_secs * 1000,
            ends_at: now + Duration::seconds(schedule.active_window_secs),
        });
    }
}
