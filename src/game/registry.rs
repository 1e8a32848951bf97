//! Entity registry
//!
//! Owns every live entity, keyed by id and indexed by kind. Other structures
//! hold ids only and resolve them here; a missing id means the entity is
//! already gone.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use super::entity::{Entity, EntityId, EntityKind, MobState, PlayerState};
use crate::error::GameError;

/// Registry of all live entities
#[derive(Debug, Default)]
pub struct EntityRegistry {
    /// All entities by id
    entities: HashMap<EntityId, Entity>,
    players: BTreeSet<EntityId>,
    mobs: BTreeSet<EntityId>,
    npcs: BTreeSet<EntityId>,
    /// Items and chests
    items: BTreeSet<EntityId>,
    /// Next id to hand out
    next_id: EntityId,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Allocate a fresh id, never handed out before
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Insert an entity under its id
    pub fn insert(&mut self, entity: Entity) -> Result<(), GameError> {
        let id = entity.id;
        if self.entities.contains_key(&id) {
            return Err(GameError::AlreadyInWorld(id));
        }
        if id >= self.next_id {
            self.next_id = id + 1;
        }

        self.index_for(entity.kind()).insert(id);
        trace!(id = id, kind = %entity.kind(), "Entity registered");
        self.entities.insert(id, entity);
        Ok(())
    }

    /// Remove an entity, returning it if it was present
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.index_for(entity.kind()).remove(&id);
        debug!(id = id, kind = %entity.kind(), name = %entity.kind_name, "Entity removed from registry");
        Some(entity)
    }

    fn index_for(&mut self, kind: EntityKind) -> &mut BTreeSet<EntityId> {
        match kind {
            EntityKind::Player => &mut self.players,
            EntityKind::Mob => &mut self.mobs,
            EntityKind::Npc => &mut self.npcs,
            EntityKind::Item | EntityKind::Chest => &mut self.items,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Resolve an id, reporting a miss as an error
    pub fn require(&self, id: EntityId) -> Result<&Entity, GameError> {
        self.entities.get(&id).ok_or(GameError::EntityNotFound(id))
    }

    pub fn require_mut(&mut self, id: EntityId) -> Result<&mut Entity, GameError> {
        self.entities
            .get_mut(&id)
            .ok_or(GameError::EntityNotFound(id))
    }

    /// Resolve an id and check its kind
    pub fn require_kind(&self, id: EntityId, expected: EntityKind) -> Result<&Entity, GameError> {
        let entity = self.require(id)?;
        if entity.kind() != expected {
            return Err(GameError::WrongKind {
                id,
                expected,
                actual: entity.kind(),
            });
        }
        Ok(entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn player_ids(&self) -> Vec<EntityId> {
        self.players.iter().copied().collect()
    }

    pub fn mob_ids(&self) -> Vec<EntityId> {
        self.mobs.iter().copied().collect()
    }

    pub fn npc_ids(&self) -> Vec<EntityId> {
        self.npcs.iter().copied().collect()
    }

    pub fn item_ids(&self) -> Vec<EntityId> {
        self.items.iter().copied().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn mob_count(&self) -> usize {
        self.mobs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn player(&self, id: EntityId) -> Result<&PlayerState, GameError> {
        let entity = self.require(id)?;
        entity.as_player().ok_or(GameError::WrongKind {
            id,
            expected: EntityKind::Player,
            actual: entity.kind(),
        })
    }

    pub fn player_mut(&mut self, id: EntityId) -> Result<&mut PlayerState, GameError> {
        let entity = self.require_mut(id)?;
        let actual = entity.kind();
        entity.as_player_mut().ok_or(GameError::WrongKind {
            id,
            expected: EntityKind::Player,
            actual,
        })
    }

    pub fn mob(&self, id: EntityId) -> Result<&MobState, GameError> {
        let entity = self.require(id)?;
        entity.as_mob().ok_or(GameError::WrongKind {
            id,
            expected: EntityKind::Mob,
            actual: entity.kind(),
        })
    }

    pub fn mob_mut(&mut self, id: EntityId) -> Result<&mut MobState, GameError> {
        let entity = self.require_mut(id)?;
        let actual = entity.kind();
        entity.as_mob_mut().ok_or(GameError::WrongKind {
            id,
            expected: EntityKind::Mob,
            actual,
        })
    }
}
