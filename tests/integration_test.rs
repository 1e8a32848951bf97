//! Integration tests for the world simulation
//!
//! These tests drive a whole world through client commands and ticks and
//! verify the end-to-end behavior of:
//! - Kill, despawn and drop ordering
//! - Aggro link symmetry and hate reverse links
//! - Retargeting on player death
//! - Item timers, respawns and area rosters
//! - Per-tick batching

use std::time::Duration;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rustquest_server::game::content::WorldContent;
use rustquest_server::game::entity::{EntityData, EntityId, EntityKind, Position};
use rustquest_server::game::map::{Area, GridMap};
use rustquest_server::game::outbound::CollectingTransport;
use rustquest_server::game::world::{World, WorldSettings};
use rustquest_server::protocol::{ClientMessage, Message};

const CONTENT: &str = r#"
    [mobs]
    rat = { hp = 10, damage = 2 }
    ogre = { hp = 1000, damage = 30 }

    [loot]
    rat = [{ item = "burger", chance = 100 }]

    [consumables]
    burger = 30

    [[chest_areas]]
    area = { x = 30, y = 30, width = 5, height = 5 }
    chest_x = 32
    chest_y = 32
    items = ["sword2"]

    [[npcs]]
    kind = "guard"
    x = 40
    y = 40

    [[static_mobs]]
    kind = "rat"
    x = 31
    y = 31

    [[mob_areas]]
    kind = "rat"
    count = 3
    area = { x = 60, y = 60, width = 6, height = 6 }
"#;

fn settings() -> WorldSettings {
    let mut settings = WorldSettings::default();
    settings.combat.rng_seed = Some(42);
    settings.combat.player_min_damage = 50;
    settings.combat.player_max_damage = 50;
    settings.starting_area = Area::new(20, 20, 1, 1);
    settings
}

fn new_world(content: WorldContent) -> World {
    World::new(
        settings(),
        Box::new(GridMap::with_zone_size(120, 120, 12, 12)),
        content,
    )
}

fn sample_world() -> World {
    new_world(WorldContent::parse(CONTENT).unwrap())
}

fn enter(world: &mut World, name: &str) -> EntityId {
    let id = world.connect_player().unwrap();
    world
        .handle_client_message(id, ClientMessage::Hello { name: name.to_string() })
        .unwrap();
    id
}

/// Flush pending output and forget it
fn settle(world: &mut World) {
    let mut transport = CollectingTransport::new();
    world.tick(&mut transport);
}

fn assert_links_consistent(world: &World) {
    let registry = world.registry();
    for mob in registry.mob_ids() {
        let state = registry.mob(mob).unwrap();
        if let Some(target) = state.target {
            let player = registry
                .player(target)
                .unwrap_or_else(|_| panic!("mob {} targets missing player {}", mob, target));
            assert!(player.attackers.contains(&mob));
        }
        for entry in &state.hatelist {
            if let Ok(player) = registry.player(entry.player) {
                assert!(player.haters.contains(&mob), "missing hater {} on {}", mob, entry.player);
            }
        }
    }
    for id in registry.player_ids() {
        let player = registry.player(id).unwrap();
        for &mob in &player.attackers {
            assert_eq!(registry.mob(mob).unwrap().target, Some(id));
        }
        for &mob in &player.haters {
            assert!(registry.mob(mob).unwrap().hate_for(id).is_some());
        }
    }
}

/// Test that content placements are all spawned at startup
#[test]
fn test_world_populated_from_content() {
    let world = sample_world();
    let registry = world.registry();

    assert_eq!(registry.npc_ids().len(), 1);
    assert_eq!(registry.mob_count(), 4);
    assert!(registry.item_ids().is_empty());
    assert_eq!(registry.player_count(), 0);
    assert_eq!(world.mob_areas().len(), 1);
    assert_eq!(world.chest_areas().len(), 1);

    let guard = registry.get(registry.npc_ids()[0]).unwrap();
    assert_eq!(guard.kind(), EntityKind::Npc);
    assert_eq!(guard.position, Position::new(40, 40));
}

/// Test that a kill reaches the killer before the despawn and the drop
#[test]
fn test_kill_despawn_drop_ordering() {
    let mut world = new_world(WorldContent::parse(CONTENT).unwrap());
    let p = enter(&mut world, "Ana");
    let mob = world.spawn_mob("rat", Position::new(22, 20), None).unwrap();
    settle(&mut world);

    world
        .handle_client_message(p, ClientMessage::Hit { mob })
        .unwrap();
    assert!(!world.registry().contains(mob));
    let drops: Vec<EntityId> = world
        .registry()
        .iter()
        .filter(|e| e.kind() == EntityKind::Item && e.position == Position::new(21, 20))
        .map(|e| e.id)
        .collect();
    assert_eq!(drops.len(), 1);
    let item = drops[0];

    let mut transport = CollectingTransport::new();
    world.tick(&mut transport);

    assert_eq!(
        transport.messages_for(p),
        vec![
            Message::Move { id: mob, x: 21, y: 20 },
            Message::Attack { attacker: mob, target: p },
            Message::Damage { id: mob, points: 50 },
            Message::Kill { mob_kind: "rat".to_string() },
            Message::Despawn { id: mob },
            Message::Drop {
                mob,
                item,
                kind: "burger".to_string(),
                haters: vec![p],
            },
        ]
    );
    assert_eq!(transport.batches.len(), 1);
}

/// Test that an untouched drop blinks and is then destroyed
#[test]
fn test_dropped_item_blinks_then_despawns() {
    let mut world = sample_world();
    let p = enter(&mut world, "Ana");
    let mob = world.spawn_mob("rat", Position::new(21, 20), None).unwrap();
    world
        .handle_client_message(p, ClientMessage::Hit { mob })
        .unwrap();
    settle(&mut world);

    let item = world
        .registry()
        .iter()
        .find(|e| e.kind() == EntityKind::Item && e.position == Position::new(21, 20))
        .map(|e| e.id)
        .unwrap();
    let t0 = world.clock();

    world.fire_due_timers(t0 + Duration::from_millis(10_001));
    assert_eq!(world.outbox().pending(p), &[Message::Blink { id: item }]);
    let blinking = matches!(
        world.registry().get(item).map(|e| &e.data),
        Some(EntityData::Item(state)) if state.blinking
    );
    assert!(blinking);

    world.fire_due_timers(t0 + Duration::from_millis(14_001));
    assert_eq!(
        world.outbox().pending(p),
        &[Message::Blink { id: item }, Message::Destroy { id: item }]
    );
    assert!(!world.registry().contains(item));
}

/// Test that timers of an item looted early do nothing
#[test]
fn test_timers_are_noops_after_pickup() {
    let mut world = sample_world();
    let p = enter(&mut world, "Ana");
    let mob = world.spawn_mob("rat", Position::new(21, 20), None).unwrap();
    world
        .handle_client_message(p, ClientMessage::Hit { mob })
        .unwrap();
    let item = world
        .registry()
        .iter()
        .find(|e| e.kind() == EntityKind::Item && e.position == Position::new(21, 20))
        .map(|e| e.id)
        .unwrap();
    world
        .handle_client_message(p, ClientMessage::Loot { item })
        .unwrap();
    settle(&mut world);

    let mobs_before = world.registry().mob_count();
    world.fire_due_timers(world.clock() + Duration::from_secs(60));

    assert!(!world
        .outbox()
        .pending(p)
        .iter()
        .any(|m| matches!(m, Message::Blink { .. } | Message::Destroy { .. })));
    assert!(!world.registry().contains(item));
    // only the mob respawn remained meaningful
    assert_eq!(world.registry().mob_count(), mobs_before + 1);
    assert_eq!(world.pending_timers(), 0);
}

/// Test that a mob switches to its second most hated player when its target dies
#[test]
fn test_player_death_retargets_and_forgets() {
    let mut world = sample_world();
    let a = enter(&mut world, "A");
    let b = enter(&mut world, "B");
    let ogre = world.spawn_mob("ogre", Position::new(21, 20), None).unwrap();

    world.handle_client_message(a, ClientMessage::Hit { mob: ogre }).unwrap();
    world.handle_client_message(a, ClientMessage::Hit { mob: ogre }).unwrap();
    world.handle_client_message(b, ClientMessage::Hit { mob: ogre }).unwrap();
    assert_eq!(world.registry().mob(ogre).unwrap().target, Some(a));
    settle(&mut world);

    world.apply_damage(a, ogre, 10_000).unwrap();

    assert!(!world.registry().contains(a));
    let state = world.registry().mob(ogre).unwrap();
    assert_eq!(state.target, Some(b));
    assert_eq!(state.hate_for(a), None);
    assert_links_consistent(&world);

    let to_b = world.outbox().pending(b);
    assert!(to_b.contains(&Message::Attack { attacker: ogre, target: b }));
    assert!(to_b.contains(&Message::Despawn { id: a }));
    assert!(world.outbox().is_connected(a));

    // the dead player can come back on the same connection
    world
        .handle_client_message(a, ClientMessage::Hello { name: "A".to_string() })
        .unwrap();
    assert!(world.registry().contains(a));
}

#[test]
fn test_disconnect_while_attacked() {
    let mut world = sample_world();
    let a = enter(&mut world, "A");
    let b = enter(&mut world, "B");
    let ogre = world.spawn_mob("ogre", Position::new(21, 20), None).unwrap();
    world.handle_client_message(a, ClientMessage::Hit { mob: ogre }).unwrap();
    world.handle_client_message(b, ClientMessage::Hit { mob: ogre }).unwrap();

    world.disconnect_player(a);

    assert_eq!(world.registry().mob(ogre).unwrap().target, Some(b));
    assert_links_consistent(&world);
}

/// Test that aggro and hate links stay mirrored under random play
#[test]
fn test_aggro_links_stay_symmetric() {
    let mut world = sample_world();
    let players: Vec<EntityId> = (0..4).map(|i| enter(&mut world, &format!("P{}", i))).collect();
    for i in 0..4 {
        world
            .spawn_mob("ogre", Position::new(15 + i * 3, 25), None)
            .unwrap();
    }

    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..300 {
        let mobs = world.registry().mob_ids();
        let alive: Vec<EntityId> = players
            .iter()
            .copied()
            .filter(|&p| world.registry().contains(p))
            .collect();
        let op = rng.gen_range(0..10);

        if op == 9 || alive.is_empty() {
            for &p in &players {
                if !world.registry().contains(p) {
                    world
                        .handle_client_message(p, ClientMessage::Hello { name: "again".into() })
                        .unwrap();
                }
            }
        } else if mobs.is_empty() {
            break;
        } else {
            let mob = mobs[rng.gen_range(0..mobs.len())];
            let player = alive[rng.gen_range(0..alive.len())];
            match op {
                0..=6 => {
                    world.register_hate(mob, player, rng.gen_range(1..20)).unwrap();
                }
                7 => world.apply_damage(player, mob, 10_000).unwrap(),
                _ => {
                    let x = rng.gen_range(0..120);
                    let y = rng.gen_range(0..120);
                    world
                        .handle_client_message(player, ClientMessage::Move { x, y })
                        .unwrap();
                }
            }
        }

        assert_links_consistent(&world);
        for mob in world.registry().mob_ids() {
            let holders = world
                .registry()
                .player_ids()
                .into_iter()
                .filter(|&p| world.registry().player(p).unwrap().attackers.contains(&mob))
                .count();
            assert!(holders <= 1, "mob {} has {} targets", mob, holders);
        }
    }
}

/// Test that clearing a chest area spawns its chest
#[test]
fn test_chest_area_spawns_chest_when_cleared() {
    let mut world = sample_world();
    let p = enter(&mut world, "Ana");
    assert_eq!(world.chest_areas()[0].roster.len(), 1);
    let guard = world
        .registry()
        .iter()
        .find(|e| e.position == Position::new(31, 31))
        .map(|e| e.id)
        .unwrap();

    world
        .handle_client_message(p, ClientMessage::Hit { mob: guard })
        .unwrap();

    assert!(world.chest_areas()[0].roster.is_empty());
    let chest = world
        .registry()
        .iter()
        .find(|e| e.kind() == EntityKind::Chest)
        .map(|e| (e.id, e.position, e.data.clone()))
        .unwrap();
    assert_eq!(chest.1, Position::new(32, 32));
    assert!(matches!(chest.2, EntityData::Chest(ref state) if !state.is_static));

    world
        .handle_client_message(p, ClientMessage::Open { chest: chest.0 })
        .unwrap();
    assert!(world
        .registry()
        .iter()
        .any(|e| e.kind_name == "sword2" && e.position == Position::new(32, 32)));

    // the guard comes back and rejoins the roster
    world.fire_due_timers(world.clock() + Duration::from_secs(31));
    assert_eq!(world.chest_areas()[0].roster.len(), 1);
    assert!(!world
        .registry()
        .iter()
        .any(|e| e.kind() == EntityKind::Chest));
}

/// Test that clearing a chest area again does not stack an unopened chest
#[test]
fn test_chest_area_keeps_one_unopened_chest() {
    let mut world = sample_world();
    let p = enter(&mut world, "Ana");

    for round in 0..3 {
        let guard = world
            .registry()
            .mob_ids()
            .into_iter()
            .find(|&m| world.registry().mob(m).unwrap().chest_area == Some(0))
            .unwrap();
        world
            .handle_client_message(p, ClientMessage::Hit { mob: guard })
            .unwrap();

        let chests: Vec<EntityId> = world
            .registry()
            .iter()
            .filter(|e| e.kind() == EntityKind::Chest && e.position == Position::new(32, 32))
            .map(|e| e.id)
            .collect();
        assert_eq!(chests.len(), 1, "round {}", round);
        assert_eq!(world.chest_areas()[0].chest, Some(chests[0]));

        world.fire_due_timers(world.clock() + Duration::from_secs(31));
        assert_eq!(world.chest_areas()[0].roster.len(), 1);
    }

    // once opened, the next clear restocks
    let chest = world.chest_areas()[0].chest.unwrap();
    world
        .handle_client_message(p, ClientMessage::Open { chest })
        .unwrap();
    let guard = world
        .registry()
        .mob_ids()
        .into_iter()
        .find(|&m| world.registry().mob(m).unwrap().chest_area == Some(0))
        .unwrap();
    world
        .handle_client_message(p, ClientMessage::Hit { mob: guard })
        .unwrap();
    let restocked = world.chest_areas()[0].chest.unwrap();
    assert_ne!(restocked, chest);
    assert!(world.registry().contains(restocked));
}

#[test]
fn test_mob_area_respawns_inside_area() {
    let mut world = sample_world();
    let p = enter(&mut world, "Ana");
    let area = world.mob_areas()[0].area;
    assert_eq!(world.mob_areas()[0].roster.len(), 3);

    let victim = world
        .registry()
        .mob_ids()
        .into_iter()
        .find(|&m| world.registry().mob(m).unwrap().area == Some(0))
        .unwrap();
    world
        .handle_client_message(p, ClientMessage::Hit { mob: victim })
        .unwrap();
    assert_eq!(world.mob_areas()[0].roster.len(), 2);

    world.fire_due_timers(world.clock() + Duration::from_secs(31));
    assert_eq!(world.mob_areas()[0].roster.len(), 3);
    for mob in world.registry().mob_ids() {
        let entity = world.registry().get(mob).unwrap();
        if world.registry().mob(mob).unwrap().area == Some(0) {
            assert!(area.contains(entity.position));
        }
    }
}

/// Test that a tick hands each player a single ordered batch
#[test]
fn test_one_batch_per_player_per_tick() {
    let mut world = sample_world();
    let a = enter(&mut world, "A");
    let b = enter(&mut world, "B");
    settle(&mut world);

    for text in ["one", "two", "three"] {
        world
            .handle_client_message(b, ClientMessage::Chat { text: text.to_string() })
            .unwrap();
    }
    let mut transport = CollectingTransport::new();
    world.tick(&mut transport);

    let batches: Vec<&Vec<Message>> = transport
        .batches
        .iter()
        .filter(|(id, _)| *id == a)
        .map(|(_, batch)| batch)
        .collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        &vec![
            Message::Chat { id: b, text: "one".to_string() },
            Message::Chat { id: b, text: "two".to_string() },
            Message::Chat { id: b, text: "three".to_string() },
        ]
    );
    assert!(world.outbox().pending(a).is_empty());
}

#[test]
fn test_who_returns_spawns_for_live_ids() {
    let mut world = sample_world();
    let a = enter(&mut world, "A");
    let mob = world.spawn_mob("rat", Position::new(25, 25), None).unwrap();
    settle(&mut world);

    world
        .handle_client_message(a, ClientMessage::Who { ids: vec![mob, 9999, a] })
        .unwrap();
    let pending = world.outbox().pending(a);
    assert_eq!(pending.len(), 1);
    assert!(matches!(&pending[0], Message::Spawn { entity } if entity.id == mob && entity.kind_name == "rat"));
}

/// Test that an attack is only an announcement and a hurt lands on the player
#[test]
fn test_attack_and_hurt() {
    let mut world = sample_world();
    let a = enter(&mut world, "A");
    let b = enter(&mut world, "B");
    let ogre = world.spawn_mob("ogre", Position::new(21, 20), None).unwrap();
    settle(&mut world);

    world
        .handle_client_message(a, ClientMessage::Attack { mob: ogre })
        .unwrap();
    assert!(world.outbox().pending(a).is_empty());
    assert_eq!(
        world.outbox().pending(b),
        &[Message::Attack { attacker: a, target: ogre }]
    );
    assert!(world.registry().mob(ogre).unwrap().hatelist.is_empty());

    world
        .handle_client_message(a, ClientMessage::Hurt { mob: ogre })
        .unwrap();
    let hp = world.registry().player(a).unwrap().health.current;
    assert!((50..80).contains(&hp), "hp {}", hp);
    assert_eq!(
        world.outbox().pending(a),
        &[Message::Health { points: hp, regen: false }]
    );
}
