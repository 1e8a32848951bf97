//! Lifecycle scheduler
//!
//! One tokio task owns the [`World`] and is the only writer of world state.
//! It interleaves three event sources one at a time:
//! - the fixed-rate tick (regen, spawn announcements, queue flush)
//! - the earliest due timer, independent of the tick cadence
//! - commands sent by connection tasks through a [`WorldHandle`]

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::entity::EntityId;
use super::world::World;
use crate::error::NetworkError;
use crate::net::transport::{BatchSender, ChannelTransport};
use crate::protocol::ClientMessage;

/// Capacity of the command channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Commands processed by the world task
#[derive(Debug)]
pub enum WorldCommand {
    /// A new connection wants a player id
    Connect {
        outbound: BatchSender,
        reply: oneshot::Sender<Result<EntityId, NetworkError>>,
    },
    /// A connection went away
    Disconnect { player: EntityId },
    /// A parsed client command
    Client {
        player: EntityId,
        message: ClientMessage,
    },
}

/// Cloneable handle used by connection tasks to reach the world
#[derive(Debug, Clone)]
pub struct WorldHandle {
    commands: mpsc::Sender<WorldCommand>,
}

impl WorldHandle {
    /// Register a connection and get its player id
    pub async fn connect(&self, outbound: BatchSender) -> Result<EntityId, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(WorldCommand::Connect { outbound, reply })
            .await
            .map_err(|_| NetworkError::WorldUnavailable)?;
        rx.await.map_err(|_| NetworkError::WorldUnavailable)?
    }

    pub async fn disconnect(&self, player: EntityId) {
        if self
            .commands
            .send(WorldCommand::Disconnect { player })
            .await
            .is_err()
        {
            debug!(player = player, "World already stopped, disconnect ignored");
        }
    }

    /// Forward a client command to the world
    pub async fn send(&self, player: EntityId, message: ClientMessage) -> Result<(), NetworkError> {
        self.commands
            .send(WorldCommand::Client { player, message })
            .await
            .map_err(|_| NetworkError::WorldUnavailable)
    }
}

/// Start the world task, returning its handle and join handle
pub fn spawn_world(world: World, shutdown: broadcast::Receiver<()>) -> (WorldHandle, JoinHandle<World>) {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let task = tokio::spawn(run(world, rx, shutdown));
    (WorldHandle { commands: tx }, task)
}

/// Run the world loop until shutdown or until every handle is dropped
pub async fn run(
    mut world: World,
    mut commands: mpsc::Receiver<WorldCommand>,
    mut shutdown: broadcast::Receiver<()>,
) -> World {
    let mut transport = ChannelTransport::new();
    let tick_interval = world.settings.timing.tick_interval();

    info!(
        world_id = world.settings.world_id,
        tick_interval_ms = tick_interval.as_millis() as u64,
        "Starting game world"
    );

    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let next_timer = world.next_timer_due();
        let timer_deadline =
            tokio::time::Instant::from_std(next_timer.unwrap_or_else(clock_now));

        tokio::select! {
            _ = ticker.tick() => {
                world.set_clock(clock_now());
                world.tick(&mut transport);
            }
            _ = sleep_until(timer_deadline), if next_timer.is_some() => {
                world.fire_due_timers(clock_now());
            }
            command = commands.recv() => {
                match command {
                    Some(command) => handle_command(&mut world, &mut transport, command),
                    None => {
                        info!("All world handles dropped");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!(
        total_ticks = world.tick_count(),
        players = world.registry().player_count(),
        "Game world stopped"
    );
    world
}

/// Current time on the runtime clock, so paused test time drives timers too
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn handle_command(world: &mut World, transport: &mut ChannelTransport, command: WorldCommand) {
    world.set_clock(clock_now());
    match command {
        WorldCommand::Connect { outbound, reply } => {
            let result = world.connect_player();
            let player = result.as_ref().ok().copied();
            if let Some(player) = player {
                transport.attach(player, outbound);
            }
            if reply.send(result).is_err() {
                // The connection gave up before getting its id
                if let Some(player) = player {
                    world.disconnect_player(player);
                    transport.detach(player);
                }
            }
        }
        WorldCommand::Disconnect { player } => {
            world.disconnect_player(player);
            transport.detach(player);
        }
        WorldCommand::Client { player, message } => {
            let name = message.name();
            if let Err(e) = world.handle_client_message(player, message) {
                warn!(player = player, command = name, error = %e, "Client command rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::game::content::{MobKind, WorldContent};
    use crate::game::entity::Position;
    use crate::game::loot::LootTable;
    use crate::game::map::GridMap;
    use crate::game::world::WorldSettings;
    use crate::protocol::Message;

    fn world() -> World {
        let mut settings = WorldSettings::default();
        settings.combat.rng_seed = Some(1);
        World::new(settings, Box::new(GridMap::new(112, 48)), WorldContent::default())
    }

    #[tokio::test]
    async fn test_hello_round_trip_through_world_task() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = spawn_world(world(), shutdown_rx);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = assert_ok!(handle.connect(tx).await);
        assert_ok!(
            handle
                .send(player, ClientMessage::Hello { name: "Ana".to_string() })
                .await
        );

        let batch = assert_ok!(tokio::time::timeout(Duration::from_secs(2), rx.recv()).await);
        assert!(matches!(
            batch.as_deref().and_then(|b| b.first()),
            Some(Message::Welcome { id, name, .. }) if *id == player && name == "Ana"
        ));

        assert_ok!(shutdown_tx.send(()));
        let world = assert_ok!(task.await);
        assert_eq!(world.registry().player_count(), 1);
        assert!(world.tick_count() > 0);
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = spawn_world(world(), shutdown_rx);

        let (tx, _rx) = mpsc::unbounded_channel();
        let player = assert_ok!(handle.connect(tx).await);
        assert_ok!(
            handle
                .send(player, ClientMessage::Hello { name: "Bo".to_string() })
                .await
        );
        handle.disconnect(player).await;

        assert_ok!(shutdown_tx.send(()));
        let world = assert_ok!(task.await);
        assert!(!world.registry().contains(player));
        assert!(!world.outbox().is_connected(player));
    }

    #[tokio::test]
    async fn test_rejected_command_does_not_stop_world() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = spawn_world(world(), shutdown_rx);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = assert_ok!(handle.connect(tx).await);
        // Not in game yet
        assert_ok!(handle.send(player, ClientMessage::Move { x: 1, y: 1 }).await);
        assert_ok!(
            handle
                .send(player, ClientMessage::Hello { name: "Cy".to_string() })
                .await
        );

        let batch = assert_ok!(tokio::time::timeout(Duration::from_secs(2), rx.recv()).await);
        assert!(matches!(
            batch.as_deref().and_then(|b| b.first()),
            Some(Message::Welcome { .. })
        ));

        assert_ok!(shutdown_tx.send(()));
        assert_ok!(task.await);
    }

    #[tokio::test]
    async fn test_dropped_handles_stop_world() {
        let (_shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let (handle, task) = spawn_world(world(), shutdown_rx);
        drop(handle);

        let world = assert_ok!(assert_ok!(tokio::time::timeout(Duration::from_secs(2), task).await));
        assert_eq!(world.registry().player_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timers_fire_from_world_loop() {
        let mut settings = WorldSettings::default();
        settings.combat.rng_seed = Some(3);
        settings.combat.player_min_damage = 50;
        settings.combat.player_max_damage = 50;
        let mut content = WorldContent::default();
        content.mobs.insert("rat".to_string(), MobKind { hp: 10, damage: 1 });
        content
            .loot
            .insert("rat".to_string(), LootTable::from_pairs([("burger", 100)]));
        let mut world = World::new(settings, Box::new(GridMap::new(112, 48)), content);
        let mob = assert_ok!(world.spawn_mob("rat", Position::new(4, 4), None));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = spawn_world(world, shutdown_rx);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = assert_ok!(handle.connect(tx).await);
        assert_ok!(
            handle
                .send(player, ClientMessage::Hello { name: "Di".to_string() })
                .await
        );
        assert_ok!(handle.send(player, ClientMessage::Hit { mob }).await);

        let started = tokio::time::Instant::now();
        let mut dropped = None;
        let blinked = loop {
            let batch = assert_ok!(tokio::time::timeout(Duration::from_secs(60), rx.recv()).await)
                .expect("world stopped before the blink");
            let mut blink = None;
            for msg in batch {
                match msg {
                    Message::Drop { item, .. } => dropped = Some(item),
                    Message::Blink { id } => blink = Some(id),
                    _ => {}
                }
            }
            if let Some(id) = blink {
                break id;
            }
        };
        assert_eq!(Some(blinked), dropped);
        assert!(started.elapsed() >= Duration::from_secs(10));

        assert_ok!(shutdown_tx.send(()));
        assert_ok!(task.await);
    }
}
