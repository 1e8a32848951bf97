//! Zone groups and interest management
//!
//! Each entity is replicated into the `entities` roster of every group in the
//! halo of its primary group. A player sees an entity when the entity's id is
//! in the roster of the player's own group, so visibility is a single set
//! lookup instead of pairwise distance checks.

use std::collections::{BTreeSet, HashMap};

use tracing::{trace, warn};

use super::entity::{Entity, EntityId, EntityKind};
use super::map::{GroupId, SpatialPartition};

/// Result of a membership update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Unchanged,
    Changed,
}

/// Per-group roster
#[derive(Debug, Clone)]
pub struct ZoneGroup {
    pub id: GroupId,
    /// Entities replicated into this group
    pub entities: BTreeSet<EntityId>,
    /// Players whose primary group is this one, in arrival order
    pub players: Vec<EntityId>,
    /// Entities pending a spawn announcement to this group
    pub incoming: Vec<EntityId>,
}

impl ZoneGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            entities: BTreeSet::new(),
            players: Vec::new(),
            incoming: Vec::new(),
        }
    }
}

/// All zone groups of the map
#[derive(Debug, Default)]
pub struct ZoneTable {
    groups: HashMap<GroupId, ZoneGroup>,
}

impl ZoneTable {
    /// Create one empty group per map group
    pub fn new(map: &dyn SpatialPartition) -> Self {
        let groups = map
            .groups()
            .into_iter()
            .map(|id| (id, ZoneGroup::new(id)))
            .collect();
        Self { groups }
    }

    pub fn get(&self, id: GroupId) -> Option<&ZoneGroup> {
        self.groups.get(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Players whose primary group is `id`
    pub fn players_in(&self, id: GroupId) -> &[EntityId] {
        self.groups
            .get(&id)
            .map(|g| g.players.as_slice())
            .unwrap_or(&[])
    }

    /// Groups that currently have pending arrivals
    pub fn groups_with_incoming(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self
            .groups
            .values()
            .filter(|g| !g.incoming.is_empty())
            .map(|g| g.id)
            .collect();
        ids.sort();
        ids
    }

    /// Take the pending arrivals of a group, leaving the buffer empty
    pub fn take_incoming(&mut self, id: GroupId) -> Vec<EntityId> {
        self.groups
            .get_mut(&id)
            .map(|g| std::mem::take(&mut g.incoming))
            .unwrap_or_default()
    }

    /// Ids visible from a group, excluding one id (usually the viewer)
    pub fn relevant_entity_ids(&self, id: GroupId, exclude: EntityId) -> Vec<EntityId> {
        self.groups
            .get(&id)
            .map(|g| {
                g.entities
                    .iter()
                    .copied()
                    .filter(|&e| e != exclude)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recompute the group membership of an entity after a position change.
    ///
    /// On a group change the entity is queued as incoming in its new halo
    /// (kill drops excepted), moved between rosters, and the groups that no
    /// longer carry it are stored in `recently_left_groups`.
    pub fn update_membership(&mut self, map: &dyn SpatialPartition, entity: &mut Entity) -> Membership {
        let new_group = map.group_id_for_position(entity.position);
        if entity.group == Some(new_group) {
            return Membership::Unchanged;
        }

        let new_halo = map.adjacent_groups(new_group);

        if !entity.is_kill_drop() {
            for gid in &new_halo {
                if let Some(group) = self.groups.get_mut(gid) {
                    group.incoming.push(entity.id);
                }
            }
        }

        let old_groups = self.leave_halo(map, entity);

        let mut new_groups = Vec::with_capacity(new_halo.len());
        for gid in new_halo {
            match self.groups.get_mut(&gid) {
                Some(group) => {
                    group.entities.insert(entity.id);
                    new_groups.push(gid);
                }
                None => warn!(group = %gid, "Unknown group in halo"),
            }
        }
        if entity.kind() == EntityKind::Player {
            if let Some(group) = self.groups.get_mut(&new_group) {
                group.players.push(entity.id);
            }
        }
        entity.group = Some(new_group);

        entity.recently_left_groups = old_groups
            .into_iter()
            .filter(|g| !new_groups.contains(g))
            .collect();
        // A pending arrival in a group that no longer carries the entity is stale
        for gid in &entity.recently_left_groups {
            if let Some(group) = self.groups.get_mut(gid) {
                group.incoming.retain(|&id| id != entity.id);
            }
        }

        trace!(
            id = entity.id,
            group = %new_group,
            left = entity.recently_left_groups.len(),
            "Entity changed group"
        );
        Membership::Changed
    }

    /// Remove an entity from every group it is replicated into.
    ///
    /// Returns the groups it was removed from and clears its group.
    pub fn remove_from_groups(&mut self, map: &dyn SpatialPartition, entity: &mut Entity) -> Vec<GroupId> {
        let old_groups = self.leave_halo(map, entity);
        for group in self.groups.values_mut() {
            group.incoming.retain(|&id| id != entity.id);
        }
        entity.group = None;
        old_groups
    }

    /// Drop the entity from its current halo, returning the groups it left
    fn leave_halo(&mut self, map: &dyn SpatialPartition, entity: &Entity) -> Vec<GroupId> {
        let Some(old_group) = entity.group else {
            return Vec::new();
        };

        let mut old_groups = Vec::new();
        for gid in map.adjacent_groups(old_group) {
            if let Some(group) = self.groups.get_mut(&gid) {
                if group.entities.remove(&entity.id) {
                    old_groups.push(gid);
                }
            }
        }
        if entity.kind() == EntityKind::Player {
            if let Some(group) = self.groups.get_mut(&old_group) {
                group.players.retain(|&id| id != entity.id);
            }
        }
        old_groups
    }
}
