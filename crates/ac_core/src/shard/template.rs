//! Shard echo instance templates.

use crate::error::Rejection;
use crate::store::PlayerProfile;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Themed recurring encounter category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardType {
    Water,
    Fire,
    Earth,
}

impl ShardType {
    pub const ALL: [ShardType; 3] = [ShardType::Water, ShardType::Fire, ShardType::Earth];

    pub fn key(&self) -> &'static str {
        match self {
            ShardType::Water => "water",
            ShardType::Fire => "fire",
            ShardType::Earth => "earth",
        }
    }

    pub fn template_id(&self) -> String {
        format!("shard_echo_{}", self.key())
    }

    fn enemy_pool(&self) -> &'static [&'static str] {
        match self {
            ShardType::Water => &["water_elemental", "corrupted_naiad", "tidal_guardian"],
            ShardType::Fire => &["fire_elemental", "lava_behemoth", "inferno_dragon"],
            ShardType::Earth => &["stone_golem", "crystal_beast", "mountain_titan"],
        }
    }

    fn item_pool(&self) -> &'static [&'static str] {
        match self {
            ShardType::Water => &["water_shard_fragment", "tidal_trident", "aetherial_pearl"],
            ShardType::Fire => &["fire_shard_fragment", "inferno_blade", "molten_core"],
            ShardType::Earth => &["earth_shard_fragment", "stone_hammer", "crystal_shard"],
        }
    }

    pub fn legendary_item(&self) -> String {
        format!("{}_shard_legendary", self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Normal,
    Hard,
    Elite,
}

/// One entry in a template's enemy pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemySpec {
    pub enemy_type: String,
    pub count: u32,
    pub level: u32,
}

/// Base rewards and loot odds for one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTemplate {
    pub experience: i64,
    pub currency: i64,
    pub ascension_points: i64,
    pub item_pool: Vec<String>,
    pub epic_chance: f64,
    pub legendary_chance: f64,
}

/// Entry gate predicate, checked in order on every join attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requirement", rename_all = "snake_case")]
pub enum EntryRequirement {
    MinLevel { level: u32 },
}

impl EntryRequirement {
    pub fn check(&self, profile: &PlayerProfile) -> Result<(), Rejection> {
        match self {
            EntryRequirement::MinLevel { level } => {
                if profile.level < *level {
                    Err(Rejection::LevelTooLow { required: *level })
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Blueprint an instance session is spawned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceTemplate {
    pub id: String,
    pub name: String,
    pub shard_type: ShardType,
    pub level: u32,
    pub max_players: u32,
    pub duration_secs: i64,
    pub difficulty: Difficulty,
    pub stages: u32,
    pub enemies: Vec<EnemySpec>,
    pub rewards: RewardTemplate,
    pub requirements: Vec<EntryRequirement>,
}

/// Registry of known templates, keyed by template id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, InstanceTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the standing water and fire echoes. Earth has no
    /// standing template and exercises dynamic generation on first
    /// activation.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(InstanceTemplate {
            id: ShardType::Water.template_id(),
            name: "Echo of the Water Shard".to_string(),
            shard_type: ShardType::Water,
            level: 10,
            max_players: 5,
            duration_secs: 1800,
            difficulty: Difficulty::Normal,
            stages: 3,
            enemies: vec![
                EnemySpec { enemy_type: "water_elemental".into(), count: 15, level: 10 },
                EnemySpec { enemy_type: "corrupted_naiad".into(), count: 8, level: 12 },
                EnemySpec { enemy_type: "tidal_guardian".into(), count: 1, level: 15 },
            ],
            rewards: RewardTemplate {
                experience: 5000,
                currency: 2000,
                ascension_points: 100,
                item_pool: ShardType::Water.item_pool().iter().map(|s| s.to_string()).collect(),
                epic_chance: 0.10,
                legendary_chance: 0.01,
            },
            requirements: vec![EntryRequirement::MinLevel { level: 10 }],
        });
        registry.insert(InstanceTemplate {
            id: ShardType::Fire.template_id(),
            name: "Echo of the Fire Shard".to_string(),
            shard_type: ShardType::Fire,
            level: 15,
            max_players: 5,
            duration_secs: 2100,
            difficulty: Difficulty::Hard,
            stages: 4,
            enemies: vec![
                EnemySpec { enemy_type: "fire_elemental".into(), count: 20, level: 15 },
                EnemySpec { enemy_type: "lava_behemoth".into(), count: 3, level: 18 },
                EnemySpec { enemy_type: "inferno_dragon".into(), count: 1, level: 25 },
            ],
            rewards: RewardTemplate {
                experience: 8000,
                currency: 3500,
                ascension_points: 150,
                item_pool: ShardType::Fire.item_pool().iter().map(|s| s.to_string()).collect(),
                epic_chance: 0.15,
                legendary_chance: 0.02,
            },
            requirements: vec![EntryRequirement::MinLevel { level: 15 }],
        });
        registry
    }

    pub fn insert(&mut self, template: InstanceTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, template_id: &str) -> Option<&InstanceTemplate> {
        self.templates.get(template_id)
    }

    pub fn for_shard(&self, shard_type: ShardType) -> Option<&InstanceTemplate> {
        self.templates.get(&shard_type.template_id())
    }

    /// Build and register a template on the fly for a shard type that has
    /// none. Scheduled activations fall back to this instead of failing.
    pub fn generate_for(
        &mut self,
        shard_type: ShardType,
        rng: &mut impl Rng,
    ) -> &InstanceTemplate {
        let level = 10 + rng.gen_range(0..10);
        let difficulty =
            *[Difficulty::Normal, Difficulty::Hard, Difficulty::Elite].choose(rng).unwrap();
        let enemies = shard_type
            .enemy_pool()
            .iter()
            .map(|enemy_type| EnemySpec {
                enemy_type: enemy_type.to_string(),
                count: 10 + rng.gen_range(0..10),
                level: 10 + rng.gen_range(0..10),
            })
            .collect();

        let template = InstanceTemplate {
            id: shard_type.template_id(),
            name: format!("Echo of the {} shard", shard_type.key()),
            shard_type,
            level,
            max_players: 5,
            duration_secs: 1800,
            difficulty,
            stages: 3 + rng.gen_range(0..2),
            enemies,
            rewards: RewardTemplate {
                experience: 5000 + rng.gen_range(0..5000),
                currency: 2000 + rng.gen_range(0..2000),
                ascension_points: 100 + rng.gen_range(0..100),
                item_pool: shard_type.item_pool().iter().map(|s| s.to_string()).collect(),
                epic_chance: 0.1 + rng.gen::<f64>() * 0.1,
                legendary_chance: 0.01 + rng.gen::<f64>() * 0.01,
            },
            requirements: vec![EntryRequirement::MinLevel { level }],
        };
        let id = template.id.clone();
        self.templates.insert(id.clone(), template);
        &self.templates[&id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_defaults_cover_water_and_fire_only() {
        let registry = TemplateRegistry::with_defaults();
        assert!(registry.for_shard(ShardType::Water).is_some());
        assert!(registry.for_shard(ShardType::Fire).is_some());
        assert!(registry.for_shard(ShardType::Earth).is_none());
    }

    #[test]
    fn test_generate_fills_missing_shard() {
        let mut registry = TemplateRegistry::with_defaults();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let template = registry.generate_for(ShardType::Earth, &mut rng).clone();
        assert_eq!(template.shard_type, ShardType::Earth);
        assert!(template.level >= 10 && template.level < 20);
        assert!(template.stages >= 3 && template.stages <= 4);
        assert_eq!(template.enemies.len(), 3);
        assert!(registry.for_shard(ShardType::Earth).is_some());
        // The minimum level gate tracks the generated level.
        assert_eq!(
            template.requirements,
            vec![EntryRequirement::MinLevel { level: template.level }]
        );
    }

    #[test]
    fn test_min_level_requirement() {
        let req = EntryRequirement::MinLevel { level: 10 };
        let mut profile = crate::store::PlayerProfile::new("p1", "Kael", "mage", 9, Utc::now());
        assert_eq!(req.check(&profile), Err(Rejection::LevelTooLow { required: 10 }));
        profile.level = 10;
        assert!(req.check(&profile).is_ok());
    }
}
