//! World content
//!
//! Static data the world is built from: mob stats, loot tables, consumables
//! and every placement (npcs, mobs, areas, items, chests). Loaded once at
//! startup from a TOML file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::entity::Position;
use super::loot::LootTable;
use super::map::Area;

/// Stats of a mob kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobKind {
    /// Max health
    pub hp: i32,
    /// Maximum damage of a single hit
    pub damage: i32,
}

impl Default for MobKind {
    fn default() -> Self {
        Self { hp: 10, damage: 2 }
    }
}

/// A single entity placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub kind: String,
    pub x: i32,
    pub y: i32,
}

impl Placement {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Mobs of one kind spawned at random positions inside an area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobAreaConfig {
    pub kind: String,
    pub count: usize,
    pub area: Area,
}

/// Area whose mobs guard a chest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestAreaConfig {
    pub area: Area,
    pub chest_x: i32,
    pub chest_y: i32,
    pub items: Vec<String>,
}

/// A chest placed at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestConfig {
    pub x: i32,
    pub y: i32,
    pub items: Vec<String>,
}

/// Everything the world is populated with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldContent {
    /// Mob kinds by name
    pub mobs: HashMap<String, MobKind>,
    /// Loot tables by mob kind
    pub loot: HashMap<String, LootTable>,
    /// Heal amount per consumable item kind
    pub consumables: HashMap<String, i32>,
    pub npcs: Vec<Placement>,
    pub static_mobs: Vec<Placement>,
    pub mob_areas: Vec<MobAreaConfig>,
    pub chest_areas: Vec<ChestAreaConfig>,
    pub static_items: Vec<Placement>,
    pub static_chests: Vec<ChestConfig>,
}

impl WorldContent {
    /// Load content from a TOML file; a missing file yields an empty world
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Content file not found at {}, starting with an empty world",
                path.display()
            );
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read content file: {}", path.display()))?;
        let content = Self::parse(&raw)
            .with_context(|| format!("Failed to parse content file: {}", path.display()))?;

        info!(
            mob_kinds = content.mobs.len(),
            static_mobs = content.static_mobs.len(),
            mob_areas = content.mob_areas.len(),
            chest_areas = content.chest_areas.len(),
            "Loaded world content"
        );
        Ok(content)
    }

    /// Parse content from TOML text
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Stats of a mob kind, defaults for unknown kinds
    pub fn mob_kind(&self, kind: &str) -> MobKind {
        match self.mobs.get(kind) {
            Some(stats) => *stats,
            None => {
                warn!(kind = %kind, "Unknown mob kind, using default stats");
                MobKind::default()
            }
        }
    }

    pub fn loot_table(&self, kind: &str) -> Option<&LootTable> {
        self.loot.get(kind)
    }

    /// Heal amount of a consumable, `None` for other items
    pub fn heal_amount(&self, item: &str) -> Option<i32> {
        self.consumables.get(item).copied()
    }
}
