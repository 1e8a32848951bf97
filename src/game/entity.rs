//! Entity module
//!
//! Every live object of the world is an [`Entity`]: a common header (id,
//! kind name, position, group membership) plus per-variant data in the
//! closed [`EntityData`] enumeration. Behaviour only diverges at the few
//! points that match on the variant (combat resolution, despawn policy).

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::map::GroupId;
use crate::protocol::EntitySnapshot;

/// Unique entity identifier
pub type EntityId = u32;

/// Position on the world grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance in tiles
    pub fn distance_to(&self, other: &Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Check if `other` is one tile away horizontally or vertically
    pub fn is_next_to(&self, other: &Position) -> bool {
        (self.x - other.x).abs() + (self.y - other.y).abs() == 1
    }

    /// The four non-diagonal neighbours of this position
    pub fn neighbours(&self) -> [Position; 4] {
        [
            Position::new(self.x, self.y - 1),
            Position::new(self.x, self.y + 1),
            Position::new(self.x - 1, self.y),
            Position::new(self.x + 1, self.y),
        ]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Closed set of entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Mob,
    Npc,
    Item,
    Chest,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Mob => "mob",
            EntityKind::Npc => "npc",
            EntityKind::Item => "item",
            EntityKind::Chest => "chest",
        }
    }

    /// Check if this kind has health and takes part in combat
    pub fn is_character(&self) -> bool {
        matches!(self, EntityKind::Player | EntityKind::Mob)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Current and maximum hit points of a character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Subtract damage, returns true when the hit was lethal
    pub fn take(&mut self, amount: i32) -> bool {
        self.current -= amount;
        self.is_dead()
    }

    /// Heal by `amount`, capped at max
    pub fn heal(&mut self, amount: i32) {
        self.current = (self.current + amount).min(self.max);
    }

    /// Regenerate a fixed fraction of max health
    pub fn regenerate(&mut self) -> bool {
        if self.is_full() || self.is_dead() {
            return false;
        }
        self.heal(self.max / 25);
        true
    }
}

/// Player-specific state
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub name: String,
    pub health: Health,
    /// Mobs currently targeting this player
    pub attackers: BTreeSet<EntityId>,
    /// Mobs holding hate for this player
    pub haters: BTreeSet<EntityId>,
    /// Last checkpoint reached
    pub checkpoint: Option<Position>,
}

/// A single hatelist entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HateEntry {
    pub player: EntityId,
    pub hate: u32,
}

/// Mob-specific state
#[derive(Debug, Clone)]
pub struct MobState {
    pub health: Health,
    /// Hate per player, in order of first discovery
    pub hatelist: Vec<HateEntry>,
    /// Current target
    pub target: Option<EntityId>,
    /// Spawn position the mob returns to
    pub spawn: Position,
    /// Owning mob area
    pub area: Option<usize>,
    /// Owning chest area
    pub chest_area: Option<usize>,
    /// Players forgotten until the given tick
    pub forgotten: HashMap<EntityId, u64>,
}

impl MobState {
    pub fn new(max_health: i32, spawn: Position) -> Self {
        Self {
            health: Health::new(max_health),
            hatelist: Vec::new(),
            target: None,
            spawn,
            area: None,
            chest_area: None,
            forgotten: HashMap::new(),
        }
    }

    /// Add hate for a player, creating the entry if needed
    pub fn increase_hate(&mut self, player: EntityId, points: u32) {
        match self.hatelist.iter_mut().find(|e| e.player == player) {
            Some(entry) => entry.hate = entry.hate.saturating_add(points),
            None => self.hatelist.push(HateEntry {
                player,
                hate: points,
            }),
        }
    }

    pub fn hate_for(&self, player: EntityId) -> Option<u32> {
        self.hatelist
            .iter()
            .find(|e| e.player == player)
            .map(|e| e.hate)
    }

    /// Player with the given hate rank (1 = most hated).
    ///
    /// Ties keep the order in which players were first discovered.
    pub fn player_with_hate_rank(&self, rank: usize) -> Option<EntityId> {
        if rank == 0 {
            return None;
        }
        let mut ranked: Vec<&HateEntry> = self.hatelist.iter().collect();
        ranked.sort_by(|a, b| b.hate.cmp(&a.hate));
        ranked.get(rank - 1).map(|e| e.player)
    }

    /// Drop a player's hate entry and ignore new hate until `until_tick`.
    ///
    /// An `until_tick` of zero forgets the player for good, so nothing is kept.
    pub fn forget(&mut self, player: EntityId, until_tick: u64) {
        self.hatelist.retain(|e| e.player != player);
        if until_tick > 0 {
            self.forgotten.insert(player, until_tick);
        } else {
            self.forgotten.remove(&player);
        }
    }

    /// Drop forget windows that ended before `tick`
    pub fn prune_forgotten(&mut self, tick: u64) {
        self.forgotten.retain(|_, until| *until > tick);
    }

    pub fn is_forgetting(&self, player: EntityId, tick: u64) -> bool {
        self.forgotten
            .get(&player)
            .map(|&until| tick < until)
            .unwrap_or(false)
    }
}

/// Where a ground item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    /// Static placement, respawns after pickup
    Placed,
    /// Dropped by a killed mob, announced with a drop message
    KillDrop { mob: EntityId },
    /// Spawned by opening a chest
    ChestLoot,
}

/// Item-specific state
#[derive(Debug, Clone)]
pub struct ItemState {
    pub origin: ItemOrigin,
    pub blinking: bool,
}

/// Chest-specific state
#[derive(Debug, Clone)]
pub struct ChestState {
    /// Item kinds the chest may yield
    pub items: Vec<String>,
    /// Static chests respawn after being opened
    pub is_static: bool,
}

/// Per-variant entity data
#[derive(Debug, Clone)]
pub enum EntityData {
    Player(PlayerState),
    Mob(MobState),
    Npc,
    Item(ItemState),
    Chest(ChestState),
}

/// A live entity
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    /// Kind name from content data (e.g. "rat", "burger")
    pub kind_name: String,
    pub position: Position,
    /// Primary zone group
    pub group: Option<GroupId>,
    /// Groups left on the last membership change, consumed once
    pub recently_left_groups: Vec<GroupId>,
    pub data: EntityData,
}

impl Entity {
    fn with_data(id: EntityId, kind_name: impl Into<String>, position: Position, data: EntityData) -> Self {
        Self {
            id,
            kind_name: kind_name.into(),
            position,
            group: None,
            recently_left_groups: Vec::new(),
            data,
        }
    }

    pub fn player(id: EntityId, name: impl Into<String>, position: Position, max_health: i32) -> Self {
        let name = name.into();
        Self::with_data(
            id,
            "warrior",
            position,
            EntityData::Player(PlayerState {
                name,
                health: Health::new(max_health),
                attackers: BTreeSet::new(),
                haters: BTreeSet::new(),
                checkpoint: None,
            }),
        )
    }

    pub fn mob(id: EntityId, kind_name: impl Into<String>, position: Position, max_health: i32) -> Self {
        Self::with_data(
            id,
            kind_name,
            position,
            EntityData::Mob(MobState::new(max_health, position)),
        )
    }

    pub fn npc(id: EntityId, kind_name: impl Into<String>, position: Position) -> Self {
        Self::with_data(id, kind_name, position, EntityData::Npc)
    }

    pub fn item(id: EntityId, kind_name: impl Into<String>, position: Position, origin: ItemOrigin) -> Self {
        Self::with_data(
            id,
            kind_name,
            position,
            EntityData::Item(ItemState {
                origin,
                blinking: false,
            }),
        )
    }

    pub fn chest(id: EntityId, position: Position, items: Vec<String>, is_static: bool) -> Self {
        Self::with_data(
            id,
            "chest",
            position,
            EntityData::Chest(ChestState { items, is_static }),
        )
    }

    pub fn kind(&self) -> EntityKind {
        match self.data {
            EntityData::Player(_) => EntityKind::Player,
            EntityData::Mob(_) => EntityKind::Mob,
            EntityData::Npc => EntityKind::Npc,
            EntityData::Item(_) => EntityKind::Item,
            EntityData::Chest(_) => EntityKind::Chest,
        }
    }

    /// Kill drops are announced with a dedicated drop message, never a spawn
    pub fn is_kill_drop(&self) -> bool {
        matches!(
            self.data,
            EntityData::Item(ItemState {
                origin: ItemOrigin::KillDrop { .. },
                ..
            })
        )
    }

    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.data {
            EntityData::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.data {
            EntityData::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_mob(&self) -> Option<&MobState> {
        match &self.data {
            EntityData::Mob(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mob_mut(&mut self) -> Option<&mut MobState> {
        match &mut self.data {
            EntityData::Mob(m) => Some(m),
            _ => None,
        }
    }

    /// Health of a character, `None` for other kinds
    pub fn health(&self) -> Option<&Health> {
        match &self.data {
            EntityData::Player(p) => Some(&p.health),
            EntityData::Mob(m) => Some(&m.health),
            _ => None,
        }
    }

    pub fn health_mut(&mut self) -> Option<&mut Health> {
        match &mut self.data {
            EntityData::Player(p) => Some(&mut p.health),
            EntityData::Mob(m) => Some(&mut m.health),
            _ => None,
        }
    }

    /// Client-facing view of this entity for spawn messages
    pub fn snapshot(&self) -> EntitySnapshot {
        let (name, target) = match &self.data {
            EntityData::Player(p) => (Some(p.name.clone()), None),
            EntityData::Mob(m) => (None, m.target),
            _ => (None, None),
        };
        EntitySnapshot {
            id: self.id,
            kind: self.kind(),
            kind_name: self.kind_name.clone(),
            x: self.position.x,
            y: self.position.y,
            name,
            target,
        }
    }
}
