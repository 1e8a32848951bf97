//! Aggro and combat
//!
//! Aggro links are kept symmetric: `mob.target == Some(p)` exactly when the
//! mob is in `p.attackers`. Links are only created by [`World::choose_target`]
//! and only severed by `clear_target`, so the invariant lives in two places.
//! Hate is mirrored the same way through each player's `haters` set.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::area::RosterChange;
use super::entity::{Entity, EntityId, EntityKind, ItemOrigin};
use super::timers::TimerEvent;
use super::world::World;
use super::zone::Membership;
use crate::error::GameError;
use crate::protocol::Message;

impl World {
    /// Add hate from `player` to `mob` and re-evaluate the mob's target
    pub fn register_hate(&mut self, mob: EntityId, player: EntityId, points: u32) -> Result<(), GameError> {
        self.registry.player(player)?;
        let tick = self.tick;
        let state = self.registry.mob_mut(mob)?;
        state.prune_forgotten(tick);
        if state.is_forgetting(player, tick) {
            trace!(mob = mob, player = player, "Hate ignored, player is forgotten");
            return Ok(());
        }

        state.increase_hate(player, points);
        let alive = !state.health.is_dead();
        self.registry.player_mut(player)?.haters.insert(mob);

        if alive {
            self.choose_target(mob, 1)?;
        }
        Ok(())
    }

    /// Target the player with the given hate rank (1 = most hated).
    ///
    /// Returns the targeted player, if the rank exists.
    pub fn choose_target(&mut self, mob: EntityId, rank: usize) -> Result<Option<EntityId>, GameError> {
        let Some(player) = self.registry.mob(mob)?.player_with_hate_rank(rank) else {
            return Ok(None);
        };
        if self.registry.player(player)?.attackers.contains(&mob) {
            return Ok(Some(player));
        }

        self.clear_target(mob);
        self.registry.mob_mut(mob)?.target = Some(player);
        self.registry.player_mut(player)?.attackers.insert(mob);

        self.move_next_to(mob, player)?;
        self.push_around(
            mob,
            Message::Attack {
                attacker: mob,
                target: player,
            },
            None,
        );
        debug!(mob = mob, player = player, rank = rank, "Mob chose target");
        Ok(Some(player))
    }

    /// Sever a mob's aggro link, returning the player it targeted
    pub(crate) fn clear_target(&mut self, mob: EntityId) -> Option<EntityId> {
        let previous = self.registry.mob_mut(mob).ok()?.target.take()?;
        if let Ok(player) = self.registry.player_mut(previous) {
            player.attackers.remove(&mob);
        }
        Some(previous)
    }

    /// Step a mob onto a free tile next to a player
    fn move_next_to(&mut self, mob: EntityId, player: EntityId) -> Result<(), GameError> {
        let target = self.registry.require(player)?.position;
        let current = self.registry.require(mob)?.position;
        if current.is_next_to(&target) {
            return Ok(());
        }

        let candidate = target
            .neighbours()
            .into_iter()
            .filter(|pos| self.map.is_valid_position(*pos))
            .min_by_key(|pos| pos.distance_to(&current));
        match candidate {
            Some(pos) => {
                self.relocate(mob, pos)?;
            }
            None => debug!(mob = mob, player = player, "No free tile next to target"),
        }
        Ok(())
    }

    /// Subtract health and resolve death
    pub fn apply_damage(&mut self, target: EntityId, attacker: EntityId, amount: i32) -> Result<(), GameError> {
        let entity = self.registry.require_mut(target)?;
        let kind = entity.kind();
        let Some(health) = entity.health_mut() else {
            return Err(GameError::WrongKind {
                id: target,
                expected: EntityKind::Mob,
                actual: kind,
            });
        };
        if health.is_dead() {
            return Ok(());
        }
        let lethal = health.take(amount);
        let points = health.current;

        match kind {
            EntityKind::Player => self.outbox.push_to_player(
                target,
                Message::Health {
                    points,
                    regen: false,
                },
            ),
            EntityKind::Mob => self.outbox.push_to_player(
                attacker,
                Message::Damage {
                    id: target,
                    points: amount,
                },
            ),
            _ => {}
        }

        if lethal {
            match kind {
                EntityKind::Mob => self.kill_mob(target, attacker)?,
                EntityKind::Player => self.kill_player(target)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn kill_mob(&mut self, mob: EntityId, killer: EntityId) -> Result<(), GameError> {
        let entity = self.registry.require(mob)?;
        let kind = entity.kind_name.clone();
        let position = entity.position;
        let state = self.registry.mob(mob)?;
        let spawn = state.spawn;
        let area = state.area;
        let haters: Vec<EntityId> = state.hatelist.iter().map(|e| e.player).collect();

        let loot = self
            .content
            .loot_table(&kind)
            .and_then(|table| table.roll_with(&mut self.rng))
            .map(str::to_string);
        info!(mob = mob, kind = %kind, killer = killer, loot = ?loot, "Mob killed");

        self.outbox
            .push_to_player(killer, Message::Kill { mob_kind: kind.clone() });
        self.push_around(mob, Message::Despawn { id: mob }, None);

        if let Some(item_kind) = loot {
            let item = self.spawn_item(&item_kind, position, ItemOrigin::KillDrop { mob })?;
            self.push_around(
                mob,
                Message::Drop {
                    mob,
                    item,
                    kind: item_kind,
                    haters,
                },
                None,
            );
            self.schedule_item_despawn(item);
        }

        self.remove_entity(mob);
        let delay = Duration::from_millis(self.settings.timing.mob_respawn_ms);
        self.timers
            .schedule(self.now, delay, TimerEvent::RespawnMob { kind, spawn, area });
        Ok(())
    }

    fn kill_player(&mut self, player: EntityId) -> Result<(), GameError> {
        let name = self.registry.player(player)?.name.clone();
        info!(player = player, name = %name, "Player died");

        let cooldown = self
            .settings
            .timing
            .ticks_for(self.settings.timing.forget_cooldown_ms);
        self.release_player(player, self.tick + cooldown);

        // Checkpoint, else somewhere in the starting area
        let respawn = self
            .checkpoint(player)
            .or_else(|| self.map.random_position_in(&self.settings.starting_area, &mut self.rng));
        if let Some(pos) = respawn {
            let entity = self.registry.require_mut(player)?;
            entity.position = pos;
            if self.zones.update_membership(self.map.as_ref(), entity) == Membership::Changed {
                self.outbox
                    .push_to_previous_groups(&self.zones, entity, Message::Destroy { id: player });
            }
        }

        self.push_around(player, Message::Despawn { id: player }, Some(player));
        self.remove_entity(player);
        Ok(())
    }

    /// Retarget every attacker of a player and drop it from every hatelist.
    ///
    /// Mobs ignore new hate from the player until `forget_until`.
    fn release_player(&mut self, player: EntityId, forget_until: u64) {
        let (attackers, haters) = match self.registry.player(player) {
            Ok(state) => (
                state.attackers.iter().copied().collect::<Vec<_>>(),
                state.haters.iter().copied().collect::<Vec<_>>(),
            ),
            Err(_) => return,
        };

        for &mob in &attackers {
            let rank = match self.registry.mob(mob) {
                Ok(state) if state.player_with_hate_rank(1) == Some(player) => 2,
                Ok(_) => 1,
                Err(e) => {
                    debug!(mob = mob, error = %e, "Attacker already gone");
                    continue;
                }
            };
            if let Err(e) = self.choose_target(mob, rank) {
                debug!(mob = mob, error = %e, "Retarget failed");
            }
            if self.registry.mob(mob).map(|m| m.target) == Ok(Some(player)) {
                self.clear_target(mob);
            }
        }

        for mob in attackers.into_iter().chain(haters) {
            if let Ok(state) = self.registry.mob_mut(mob) {
                state.forget(player, forget_until);
            }
        }
        if let Ok(state) = self.registry.player_mut(player) {
            state.attackers.clear();
            state.haters.clear();
        }
    }

    /// Remove an entity from the world, clearing every link to it first
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let Some(kind) = self.registry.get(id).map(|e| e.kind()) else {
            debug!(id = id, "Entity already gone");
            return None;
        };

        match kind {
            EntityKind::Mob => {
                self.clear_target(id);
                let haters: Vec<EntityId> = self
                    .registry
                    .mob(id)
                    .map(|m| m.hatelist.iter().map(|e| e.player).collect())
                    .unwrap_or_default();
                for player in haters {
                    if let Ok(state) = self.registry.player_mut(player) {
                        state.haters.remove(&id);
                    }
                }
            }
            EntityKind::Player => self.release_player(id, 0),
            _ => {}
        }

        let mut entity = self.registry.remove(id)?;
        self.zones.remove_from_groups(self.map.as_ref(), &mut entity);
        if let Some(state) = entity.as_mob() {
            self.leave_areas(id, state.area, state.chest_area);
        }
        Some(entity)
    }

    fn leave_areas(&mut self, mob: EntityId, area: Option<usize>, chest_area: Option<usize>) {
        if let Some(a) = area.and_then(|i| self.mob_areas.get_mut(i)) {
            if a.roster.remove(mob) == RosterChange::Emptied {
                a.on_empty();
            }
        }

        let restock = chest_area
            .and_then(|i| self.chest_areas.get_mut(i))
            .and_then(|a| match a.roster.remove(mob) {
                RosterChange::Emptied => Some((a.index, a.chest_position, a.items.clone(), a.chest)),
                _ => None,
            });
        let Some((index, position, items, previous)) = restock else {
            return;
        };
        if previous.is_some_and(|chest| self.registry.contains(chest)) {
            debug!(area = index, "Area chest still unopened, no restock");
            return;
        }

        info!(area = index, pos = %position, "Chest area cleared, spawning chest");
        match self.spawn_chest(position, items, false) {
            Ok(chest) => {
                if let Some(a) = self.chest_areas.get_mut(index) {
                    a.chest = Some(chest);
                }
            }
            Err(e) => warn!(area = index, error = %e, "Failed to spawn area chest"),
        }
    }

    /// Send every attacker that strayed too far from home back to its spawn
    pub(crate) fn check_leash(&mut self, player: EntityId) -> Result<(), GameError> {
        let position = self.registry.require(player)?.position;
        let attackers: Vec<EntityId> = self.registry.player(player)?.attackers.iter().copied().collect();
        let leash = self.settings.combat.leash_distance;

        for mob in attackers {
            let Ok(spawn) = self.registry.mob(mob).map(|m| m.spawn) else {
                continue;
            };
            if spawn.distance_to(&position) > leash {
                self.return_to_spawn(mob)?;
            }
        }
        Ok(())
    }

    /// Forget everyone and walk back to the spawn point
    fn return_to_spawn(&mut self, mob: EntityId) -> Result<(), GameError> {
        self.clear_target(mob);
        let state = self.registry.mob_mut(mob)?;
        let spawn = state.spawn;
        let forgotten: Vec<EntityId> = state.hatelist.drain(..).map(|e| e.player).collect();
        for player in forgotten {
            if let Ok(p) = self.registry.player_mut(player) {
                p.haters.remove(&mob);
            }
        }
        self.relocate(mob, spawn)?;
        debug!(mob = mob, spawn = %spawn, "Mob gave up the chase");
        Ok(())
    }
}
