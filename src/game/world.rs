//! World module
//!
//! The world is the single owner of all simulation state:
//! - Entity registry and zone groups
//! - Outbound message queues
//! - Deferred timers (blink, despawn, respawn)
//! - Spawn areas and world content
//!
//! Every mutation goes through `&mut World`, so one logical operation is
//! never interleaved with another.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use super::area::{ChestArea, MobArea};
use super::content::WorldContent;
use super::entity::{Entity, EntityData, EntityId, EntityKind, ItemOrigin, Position};
use super::map::{Area, GridMap, SpatialPartition};
use super::outbound::{Outbox, Transport};
use super::registry::EntityRegistry;
use super::timers::{TimerEvent, TimerQueue};
use super::zone::{Membership, ZoneTable};
use crate::config::{CombatConfig, ServerConfig, TimingConfig};
use crate::error::{GameError, NetworkError, ProtocolError, Result};
use crate::protocol::inbound::MAX_CHAT_LENGTH;
use crate::protocol::{ClientMessage, Message};

/// Maximum player name length in characters
pub const MAX_NAME_LENGTH: usize = 15;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// World ID (1-255)
    pub world_id: u8,
    /// World name
    pub name: String,
    /// Maximum connected players
    pub max_players: usize,
    /// Where new players appear
    pub starting_area: Area,
    pub timing: TimingConfig,
    pub combat: CombatConfig,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl WorldSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            world_id: config.world_id,
            name: config.server_name.clone(),
            max_players: config.max_players as usize,
            starting_area: config.map.starting_area,
            timing: config.timing.clone(),
            combat: config.combat.clone(),
        }
    }

    fn delay(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }
}

/// Authoritative world state
pub struct World {
    pub settings: WorldSettings,
    pub(crate) map: Box<dyn SpatialPartition>,
    pub(crate) registry: EntityRegistry,
    pub(crate) zones: ZoneTable,
    pub(crate) outbox: Outbox,
    pub(crate) timers: TimerQueue,
    pub(crate) rng: StdRng,
    pub(crate) content: WorldContent,
    pub(crate) mob_areas: Vec<MobArea>,
    pub(crate) chest_areas: Vec<ChestArea>,
    /// Last checkpoint per connection, survives death
    checkpoints: HashMap<EntityId, Position>,
    /// Ticks processed so far
    pub(crate) tick: u64,
    /// Clock used to schedule timers
    pub(crate) now: Instant,
    /// Ticks between two regen passes
    regen_every: u64,
}

impl World {
    /// Create a world on top of a map and populate it from content
    pub fn new(settings: WorldSettings, map: Box<dyn SpatialPartition>, content: WorldContent) -> Self {
        let rng = match settings.combat.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let zones = ZoneTable::new(map.as_ref());
        let regen_every = settings.timing.ticks_for(settings.timing.regen_interval_ms);

        info!(
            world_id = settings.world_id,
            name = %settings.name,
            groups = zones.len(),
            "Creating game world"
        );

        let mut world = Self {
            settings,
            map,
            registry: EntityRegistry::new(),
            zones,
            outbox: Outbox::new(),
            timers: TimerQueue::new(),
            rng,
            content,
            mob_areas: Vec::new(),
            chest_areas: Vec::new(),
            checkpoints: HashMap::new(),
            tick: 0,
            now: Instant::now(),
            regen_every,
        };
        world.populate();
        world
    }

    /// Create a world with a grid map built from configuration
    pub fn from_config(config: &ServerConfig, content: WorldContent) -> Self {
        let map = GridMap::from_config(&config.map);
        Self::new(WorldSettings::from_config(config), Box::new(map), content)
    }

    /// Spawn every placement of the world content
    fn populate(&mut self) {
        let content = self.content.clone();

        for (index, cfg) in content.chest_areas.iter().enumerate() {
            self.chest_areas.push(ChestArea::new(
                index,
                cfg.area,
                Position::new(cfg.chest_x, cfg.chest_y),
                cfg.items.clone(),
            ));
        }

        for npc in &content.npcs {
            if let Err(e) = self.spawn_npc(&npc.kind, npc.position()) {
                warn!(kind = %npc.kind, error = %e, "Failed to place npc");
            }
        }

        for mob in &content.static_mobs {
            if let Err(e) = self.spawn_mob(&mob.kind, mob.position(), None) {
                warn!(kind = %mob.kind, error = %e, "Failed to place mob");
            }
        }

        for (index, cfg) in content.mob_areas.iter().enumerate() {
            self.mob_areas
                .push(MobArea::new(index, cfg.area, cfg.kind.clone(), cfg.count));
            for _ in 0..cfg.count {
                let Some(pos) = self.map.random_position_in(&cfg.area, &mut self.rng) else {
                    warn!(area = index, kind = %cfg.kind, "Mob area has no free position");
                    break;
                };
                if let Err(e) = self.spawn_mob(&cfg.kind, pos, Some(index)) {
                    warn!(area = index, error = %e, "Failed to spawn area mob");
                }
            }
        }

        for item in &content.static_items {
            if let Err(e) = self.spawn_item(&item.kind, item.position(), ItemOrigin::Placed) {
                warn!(kind = %item.kind, error = %e, "Failed to place item");
            }
        }

        for chest in &content.static_chests {
            if let Err(e) = self.spawn_chest(Position::new(chest.x, chest.y), chest.items.clone(), true) {
                warn!(error = %e, "Failed to place chest");
            }
        }

        info!(
            entities = self.registry.count(),
            mobs = self.registry.mob_count(),
            "World populated"
        );
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn map(&self) -> &dyn SpatialPartition {
        self.map.as_ref()
    }

    pub fn mob_areas(&self) -> &[MobArea] {
        &self.mob_areas
    }

    pub fn chest_areas(&self) -> &[ChestArea] {
        &self.chest_areas
    }

    /// Get the current tick number
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Deadline of the earliest pending timer
    pub fn next_timer_due(&self) -> Option<Instant> {
        self.timers.next_due()
    }

    /// Clock used to schedule new timers
    pub fn clock(&self) -> Instant {
        self.now
    }

    /// Advance the clock used to schedule new timers
    pub fn set_clock(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    pub fn checkpoint(&self, player: EntityId) -> Option<Position> {
        self.checkpoints.get(&player).copied()
    }

    // ---- Spawning ----

    /// Register an entity and place it in its zone groups
    pub(crate) fn add_entity(&mut self, mut entity: Entity) -> std::result::Result<EntityId, GameError> {
        let id = entity.id;
        if self.registry.contains(id) {
            return Err(GameError::AlreadyInWorld(id));
        }
        self.zones.update_membership(self.map.as_ref(), &mut entity);
        entity.recently_left_groups.clear();
        self.registry.insert(entity)?;
        Ok(id)
    }

    pub fn spawn_npc(&mut self, kind: &str, pos: Position) -> std::result::Result<EntityId, GameError> {
        let id = self.registry.allocate_id();
        self.add_entity(Entity::npc(id, kind, pos))
    }

    /// Spawn a mob, joining its mob area and any chest area it stands in
    pub fn spawn_mob(
        &mut self,
        kind: &str,
        pos: Position,
        area: Option<usize>,
    ) -> std::result::Result<EntityId, GameError> {
        let stats = self.content.mob_kind(kind);
        let id = self.registry.allocate_id();
        let chest_area = self.chest_areas.iter().position(|a| a.contains(pos));

        let mut mob = Entity::mob(id, kind, pos, stats.hp);
        if let Some(state) = mob.as_mob_mut() {
            state.area = area;
            state.chest_area = chest_area;
        }
        self.add_entity(mob)?;

        if let Some(a) = area.and_then(|i| self.mob_areas.get_mut(i)) {
            a.roster.add(id);
        }
        if let Some(a) = chest_area.and_then(|i| self.chest_areas.get_mut(i)) {
            a.roster.add(id);
        }
        trace!(id = id, kind = %kind, pos = %pos, "Spawned mob");
        Ok(id)
    }

    pub fn spawn_item(
        &mut self,
        kind: &str,
        pos: Position,
        origin: ItemOrigin,
    ) -> std::result::Result<EntityId, GameError> {
        let id = self.registry.allocate_id();
        self.add_entity(Entity::item(id, kind, pos, origin))
    }

    pub fn spawn_chest(
        &mut self,
        pos: Position,
        items: Vec<String>,
        is_static: bool,
    ) -> std::result::Result<EntityId, GameError> {
        let id = self.registry.allocate_id();
        self.add_entity(Entity::chest(id, pos, items, is_static))
    }

    /// Start the blink then despawn timers of a dropped item
    pub(crate) fn schedule_item_despawn(&mut self, item: EntityId) {
        let blink = WorldSettings::delay(self.settings.timing.item_blink_delay_ms);
        let gone = blink + WorldSettings::delay(self.settings.timing.item_blink_duration_ms);
        self.timers
            .schedule(self.now, blink, TimerEvent::ItemBlink { item });
        self.timers
            .schedule(self.now, gone, TimerEvent::ItemDespawn { item });
    }

    /// Move an entity, announcing the move and any loss of visibility
    pub(crate) fn relocate(&mut self, id: EntityId, pos: Position) -> std::result::Result<Membership, GameError> {
        let entity = self.registry.require_mut(id)?;
        entity.position = pos;
        let membership = self.zones.update_membership(self.map.as_ref(), entity);

        if let Some(group) = entity.group {
            self.outbox.push_to_adjacent_groups(
                &self.zones,
                self.map.as_ref(),
                group,
                Message::Move {
                    id,
                    x: pos.x,
                    y: pos.y,
                },
                Some(id),
            );
        }
        if membership == Membership::Changed {
            self.outbox
                .push_to_previous_groups(&self.zones, entity, Message::Destroy { id });
        }
        Ok(membership)
    }

    /// Announce to an entity's halo
    pub(crate) fn push_around(&mut self, id: EntityId, msg: Message, ignored: Option<EntityId>) {
        match self.registry.get(id).and_then(|e| e.group) {
            Some(group) => {
                self.outbox
                    .push_to_adjacent_groups(&self.zones, self.map.as_ref(), group, msg, ignored)
            }
            None => debug!(id = id, message = msg.name(), "Entity has no group, nothing announced"),
        }
    }

    fn population(&self) -> Message {
        Message::Population {
            world: self.registry.player_count(),
            total: self.outbox.connected_count(),
        }
    }

    // ---- Connections ----

    /// Open an outbound queue for a new connection and return its player id
    pub fn connect_player(&mut self) -> std::result::Result<EntityId, NetworkError> {
        if self.outbox.connected_count() >= self.settings.max_players {
            warn!(max = self.settings.max_players, "World is full, connection refused");
            return Err(NetworkError::WorldFull);
        }
        let id = self.registry.allocate_id();
        self.outbox.add_player(id);
        info!(player = id, "Player connected");
        Ok(id)
    }

    /// Tear down a connection, removing its player entity if in game
    pub fn disconnect_player(&mut self, player: EntityId) {
        if self.registry.contains(player) {
            self.push_around(player, Message::Despawn { id: player }, Some(player));
            self.remove_entity(player);
        }
        // Connection ids are never reused
        for mob in self.registry.mob_ids() {
            if let Ok(state) = self.registry.mob_mut(mob) {
                state.forgotten.remove(&player);
            }
        }
        self.outbox.remove_player(player);
        self.checkpoints.remove(&player);
        info!(player = player, "Player disconnected");

        let population = self.population();
        self.outbox.push_broadcast(population, None);
    }

    // ---- Client commands ----

    /// Apply one client command
    pub fn handle_client_message(&mut self, player: EntityId, msg: ClientMessage) -> Result<()> {
        if !self.outbox.is_connected(player) {
            return Err(GameError::NotConnected(player).into());
        }
        if !matches!(msg, ClientMessage::Hello { .. }) && !self.registry.contains(player) {
            return Err(ProtocolError::NotInGame.into());
        }

        match msg {
            ClientMessage::Hello { name } => self.enter_game(player, &name)?,
            ClientMessage::Move { x, y } => self.move_player(player, Position::new(x, y))?,
            ClientMessage::Attack { mob } => {
                self.registry.require_kind(mob, EntityKind::Mob)?;
                self.push_around(
                    player,
                    Message::Attack {
                        attacker: player,
                        target: mob,
                    },
                    Some(player),
                );
            }
            ClientMessage::Hit { mob } => {
                self.registry.require_kind(mob, EntityKind::Mob)?;
                let combat = &self.settings.combat;
                let damage = self
                    .rng
                    .gen_range(combat.player_min_damage..=combat.player_max_damage);
                self.register_hate(mob, player, damage.max(0) as u32)?;
                self.apply_damage(mob, player, damage)?;
            }
            ClientMessage::Hurt { mob } => {
                let kind = self.registry.require_kind(mob, EntityKind::Mob)?.kind_name.clone();
                let max = self.content.mob_kind(&kind).damage.max(1);
                let damage = self.rng.gen_range(1..=max);
                self.apply_damage(player, mob, damage)?;
            }
            ClientMessage::Loot { item } => self.loot_item(player, item)?,
            ClientMessage::Open { chest } => self.open_chest(chest)?,
            ClientMessage::Who { ids } => {
                for id in ids {
                    if id == player {
                        continue;
                    }
                    match self.registry.get(id) {
                        Some(entity) => {
                            let entity = entity.snapshot();
                            self.outbox.push_to_player(player, Message::Spawn { entity });
                        }
                        None => trace!(player = player, id = id, "Requested entity is gone"),
                    }
                }
            }
            ClientMessage::Chat { text } => {
                let text: String = text.trim().chars().take(MAX_CHAT_LENGTH).collect();
                if !text.is_empty() {
                    self.push_around(player, Message::Chat { id: player, text }, None);
                }
            }
            ClientMessage::Check { x, y } => {
                let pos = Position::new(x, y);
                if !self.map.is_valid_position(pos) {
                    return Err(GameError::InvalidPosition { x, y }.into());
                }
                self.registry.player_mut(player)?.checkpoint = Some(pos);
                self.checkpoints.insert(player, pos);
                debug!(player = player, pos = %pos, "Checkpoint reached");
            }
        }
        Ok(())
    }

    fn enter_game(&mut self, player: EntityId, name: &str) -> std::result::Result<(), GameError> {
        if self.registry.contains(player) {
            return Err(GameError::AlreadyInWorld(player));
        }

        let name: String = name.trim().chars().take(MAX_NAME_LENGTH).collect();
        let name = if name.is_empty() {
            format!("player{}", player)
        } else {
            name
        };

        let pos = match self.checkpoints.get(&player) {
            Some(&pos) => pos,
            None => self
                .map
                .random_position_in(&self.settings.starting_area, &mut self.rng)
                .ok_or(GameError::NoValidPosition)?,
        };

        let max_health = self.settings.combat.player_max_health;
        let mut entity = Entity::player(player, name.clone(), pos, max_health);
        if let Some(state) = entity.as_player_mut() {
            state.checkpoint = self.checkpoints.get(&player).copied();
        }
        self.add_entity(entity)?;

        info!(player = player, name = %name, pos = %pos, "Player entered the game");
        self.outbox.push_to_player(
            player,
            Message::Welcome {
                id: player,
                name,
                x: pos.x,
                y: pos.y,
                hp: max_health,
            },
        );
        self.send_entity_list(player);

        let population = self.population();
        self.outbox.push_broadcast(population, None);
        Ok(())
    }

    /// Send a player the ids visible from its group
    fn send_entity_list(&mut self, player: EntityId) {
        if let Some(group) = self.registry.get(player).and_then(|e| e.group) {
            let ids = self.zones.relevant_entity_ids(group, player);
            self.outbox.push_to_player(player, Message::List { ids });
        }
    }

    fn move_player(&mut self, player: EntityId, pos: Position) -> std::result::Result<(), GameError> {
        if !self.map.is_valid_position(pos) {
            return Err(GameError::InvalidPosition { x: pos.x, y: pos.y });
        }
        if self.relocate(player, pos)? == Membership::Changed {
            self.send_entity_list(player);
        }
        self.check_leash(player)
    }

    fn loot_item(&mut self, player: EntityId, item: EntityId) -> std::result::Result<(), GameError> {
        let entity = self.registry.require_kind(item, EntityKind::Item)?;
        let kind = entity.kind_name.clone();
        let position = entity.position;
        let placed = matches!(
            entity.data,
            EntityData::Item(ref state) if state.origin == ItemOrigin::Placed
        );

        self.push_around(item, Message::Despawn { id: item }, None);
        self.remove_entity(item);

        if let Some(amount) = self.content.heal_amount(&kind) {
            let health = &mut self.registry.player_mut(player)?.health;
            health.heal(amount);
            let points = health.current;
            self.outbox.push_to_player(
                player,
                Message::Health {
                    points,
                    regen: false,
                },
            );
        }
        if placed {
            let delay = WorldSettings::delay(self.settings.timing.item_respawn_ms);
            self.timers
                .schedule(self.now, delay, TimerEvent::RespawnItem { kind: kind.clone(), position });
        }
        debug!(player = player, item = item, kind = %kind, "Item looted");
        Ok(())
    }

    fn open_chest(&mut self, chest: EntityId) -> std::result::Result<(), GameError> {
        let entity = self.registry.require_kind(chest, EntityKind::Chest)?;
        let position = entity.position;
        let (items, is_static) = match &entity.data {
            EntityData::Chest(state) => (state.items.clone(), state.is_static),
            _ => (Vec::new(), false),
        };

        self.push_around(chest, Message::Despawn { id: chest }, None);
        self.remove_entity(chest);

        if !items.is_empty() {
            let kind = &items[self.rng.gen_range(0..items.len())];
            let item = self.spawn_item(kind, position, ItemOrigin::ChestLoot)?;
            self.schedule_item_despawn(item);
            debug!(chest = chest, item = item, kind = %kind, "Chest opened");
        }
        if is_static {
            let delay = WorldSettings::delay(self.settings.timing.item_respawn_ms);
            self.timers
                .schedule(self.now, delay, TimerEvent::RespawnChest { position, items });
        }
        Ok(())
    }

    // ---- Tick and timers ----

    /// Run one tick: regen when due, announce arrivals, flush every queue
    pub fn tick(&mut self, transport: &mut dyn Transport) {
        self.tick += 1;

        if self.tick % 1000 == 0 {
            debug!(
                tick = self.tick,
                players = self.registry.player_count(),
                entities = self.registry.count(),
                "Game tick milestone"
            );
        }

        if self.tick % self.regen_every == 0 {
            self.regenerate();
        }

        self.outbox.flush_incoming(&mut self.zones, &self.registry);
        self.outbox.flush_queues(transport);
    }

    /// Regenerate every damaged character and expire old forget windows
    fn regenerate(&mut self) {
        let tick = self.tick;
        for id in self.registry.mob_ids() {
            if let Ok(state) = self.registry.mob_mut(id) {
                state.health.regenerate();
                state.prune_forgotten(tick);
            }
        }
        for id in self.registry.player_ids() {
            let Ok(state) = self.registry.player_mut(id) else {
                continue;
            };
            if state.health.regenerate() {
                let points = state.health.current;
                self.outbox
                    .push_to_player(id, Message::Health { points, regen: true });
            }
        }
    }

    /// Fire every timer due at `now`
    pub fn fire_due_timers(&mut self, now: Instant) {
        self.set_clock(now);
        while let Some(event) = self.timers.pop_due(now) {
            self.fire(event);
        }
    }

    fn fire(&mut self, event: TimerEvent) {
        trace!(?event, "Timer fired");
        match event {
            TimerEvent::ItemBlink { item } => {
                let Some(entity) = self.registry.get_mut(item) else {
                    debug!(item = item, "Blink timer for a removed item");
                    return;
                };
                if let EntityData::Item(state) = &mut entity.data {
                    state.blinking = true;
                }
                self.push_around(item, Message::Blink { id: item }, None);
            }
            TimerEvent::ItemDespawn { item } => {
                if !self.registry.contains(item) {
                    debug!(item = item, "Despawn timer for a removed item");
                    return;
                }
                self.push_around(item, Message::Destroy { id: item }, None);
                self.remove_entity(item);
            }
            TimerEvent::RespawnItem { kind, position } => {
                if let Err(e) = self.spawn_item(&kind, position, ItemOrigin::Placed) {
                    warn!(kind = %kind, error = %e, "Failed to respawn item");
                }
            }
            TimerEvent::RespawnChest { position, items } => {
                if let Err(e) = self.spawn_chest(position, items, true) {
                    warn!(error = %e, "Failed to respawn chest");
                }
            }
            TimerEvent::RespawnMob { kind, spawn, area } => {
                let pos = area
                    .and_then(|i| self.mob_areas.get(i))
                    .map(|a| a.area)
                    .and_then(|a| self.map.random_position_in(&a, &mut self.rng))
                    .unwrap_or(spawn);
                if let Err(e) = self.spawn_mob(&kind, pos, area) {
                    warn!(kind = %kind, error = %e, "Failed to respawn mob");
                }
            }
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("settings", &self.settings)
            .field("tick", &self.tick)
            .field("entities", &self.registry.count())
            .field("players", &self.registry.player_count())
            .field("connected", &self.outbox.connected_count())
            .field("timers", &self.timers.len())
            .finish()
    }
}
