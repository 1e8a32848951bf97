//! Spawn areas
//!
//! Mob areas and chest areas own a roster of the mobs living inside their
//! rectangle. When a roster drains to zero the area reports itself empty and
//! the world applies the area's restock policy:
//! - mob areas take no action (their mobs respawn through their own timers)
//! - chest areas spawn a chest seeded with the area's item set, unless the
//!   previous one is still unopened

use std::collections::BTreeSet;

use tracing::debug;

use super::entity::{EntityId, Position};
use super::map::Area;

/// What happened to an area roster after a removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChange {
    /// The id was not part of the roster
    NotMember,
    Removed,
    /// The last member left
    Emptied,
}

/// Roster shared by both area kinds
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: BTreeSet<EntityId>,
}

impl Roster {
    pub fn add(&mut self, id: EntityId) {
        self.members.insert(id);
    }

    pub fn remove(&mut self, id: EntityId) -> RosterChange {
        if !self.members.remove(&id) {
            return RosterChange::NotMember;
        }
        if self.members.is_empty() {
            RosterChange::Emptied
        } else {
            RosterChange::Removed
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }
}

/// Area in which a number of mobs of one kind are spawned at random positions
#[derive(Debug, Clone)]
pub struct MobArea {
    pub index: usize,
    pub area: Area,
    /// Mob kind spawned here
    pub kind: String,
    /// Number of mobs spawned at startup
    pub count: usize,
    pub roster: Roster,
}

impl MobArea {
    pub fn new(index: usize, area: Area, kind: impl Into<String>, count: usize) -> Self {
        Self {
            index,
            area,
            kind: kind.into(),
            count,
            roster: Roster::default(),
        }
    }

    pub fn on_empty(&self) {
        debug!(area = self.index, kind = %self.kind, "Mob area is empty");
    }
}

/// Area whose mobs guard a chest: clearing it spawns the chest
#[derive(Debug, Clone)]
pub struct ChestArea {
    pub index: usize,
    pub area: Area,
    /// Where the reward chest appears
    pub chest_position: Position,
    /// Item kinds the chest may yield
    pub items: Vec<String>,
    pub roster: Roster,
    /// Last chest spawned by this area
    pub chest: Option<EntityId>,
}

impl ChestArea {
    pub fn new(index: usize, area: Area, chest_position: Position, items: Vec<String>) -> Self {
        Self {
            index,
            area,
            chest_position,
            items,
            roster: Roster::default(),
            chest: None,
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.area.contains(pos)
    }
}
