//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::map::{Area, ZONE_HEIGHT, ZONE_WIDTH};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed to players
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// World ID (1-255)
    #[serde(default = "default_world_id")]
    pub world_id: u8,

    /// WebSocket port for clients
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// Maximum number of connected players
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Path to the world content file (spawns, loot tables, mob stats)
    #[serde(default = "default_content_path")]
    pub content_path: PathBuf,

    /// Map layout
    #[serde(default)]
    pub map: MapConfig,

    /// Tick rate and timer durations
    #[serde(default)]
    pub timing: TimingConfig,

    /// Combat tuning
    #[serde(default)]
    pub combat: CombatConfig,
}

/// Map configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Map width in tiles
    #[serde(default = "default_map_width")]
    pub width: i32,

    /// Map height in tiles
    #[serde(default = "default_map_height")]
    pub height: i32,

    /// Zone group width in tiles
    #[serde(default = "default_zone_width")]
    pub zone_width: u16,

    /// Zone group height in tiles
    #[serde(default = "default_zone_height")]
    pub zone_height: u16,

    /// Colliding tiles as `[x, y]` pairs
    #[serde(default)]
    pub collisions: Vec<[i32; 2]>,

    /// Where new players appear
    #[serde(default = "default_starting_area")]
    pub starting_area: Area,
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Simulation ticks per second
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,

    /// Interval between health regeneration passes
    #[serde(default = "default_regen_interval")]
    pub regen_interval_ms: u64,

    /// Delay before a dropped item starts blinking
    #[serde(default = "default_item_blink_delay")]
    pub item_blink_delay_ms: u64,

    /// How long a dropped item blinks before it despawns
    #[serde(default = "default_item_blink_duration")]
    pub item_blink_duration_ms: u64,

    /// Respawn delay of static items and chests
    #[serde(default = "default_item_respawn")]
    pub item_respawn_ms: u64,

    /// Respawn delay of killed mobs
    #[serde(default = "default_mob_respawn")]
    pub mob_respawn_ms: u64,

    /// How long a mob ignores a player it forgot
    #[serde(default = "default_forget_cooldown")]
    pub forget_cooldown_ms: u64,
}

/// Combat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Player max health
    #[serde(default = "default_player_health")]
    pub player_max_health: i32,

    /// Minimum damage of a player hit
    #[serde(default = "default_player_min_damage")]
    pub player_min_damage: i32,

    /// Maximum damage of a player hit
    #[serde(default = "default_player_max_damage")]
    pub player_max_damage: i32,

    /// Distance from its spawn point at which a mob gives up the chase
    #[serde(default = "default_leash_distance")]
    pub leash_distance: i32,

    /// Fixed RNG seed (random when unset)
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

// Default value functions
fn default_server_name() -> String {
    "Rustquest".to_string()
}

fn default_world_id() -> u8 {
    1
}

fn default_websocket_port() -> u16 {
    8000
}

fn default_max_players() -> u32 {
    200
}

fn default_content_path() -> PathBuf {
    PathBuf::from("./data/world.toml")
}

fn default_map_width() -> i32 {
    ZONE_WIDTH as i32 * 8
}

fn default_map_height() -> i32 {
    ZONE_HEIGHT as i32 * 8
}

fn default_zone_width() -> u16 {
    ZONE_WIDTH
}

fn default_zone_height() -> u16 {
    ZONE_HEIGHT
}

fn default_starting_area() -> Area {
    Area::new(2, 2, 6, 6)
}

fn default_tick_rate() -> u32 {
    50
}

fn default_regen_interval() -> u64 {
    2000
}

fn default_item_blink_delay() -> u64 {
    10_000
}

fn default_item_blink_duration() -> u64 {
    4000
}

fn default_item_respawn() -> u64 {
    30_000
}

fn default_mob_respawn() -> u64 {
    30_000
}

fn default_forget_cooldown() -> u64 {
    1000
}

fn default_player_health() -> i32 {
    80
}

fn default_player_min_damage() -> i32 {
    3
}

fn default_player_max_damage() -> i32 {
    8
}

fn default_leash_distance() -> i32 {
    50
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_map_width(),
            height: default_map_height(),
            zone_width: default_zone_width(),
            zone_height: default_zone_height(),
            collisions: Vec::new(),
            starting_area: default_starting_area(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            regen_interval_ms: default_regen_interval(),
            item_blink_delay_ms: default_item_blink_delay(),
            item_blink_duration_ms: default_item_blink_duration(),
            item_respawn_ms: default_item_respawn(),
            mob_respawn_ms: default_mob_respawn(),
            forget_cooldown_ms: default_forget_cooldown(),
        }
    }
}

impl TimingConfig {
    /// Interval between two ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate.max(1) as u64)
    }

    /// Number of ticks covering `ms` milliseconds (at least one)
    pub fn ticks_for(&self, ms: u64) -> u64 {
        (ms * self.tick_rate as u64 / 1000).max(1)
    }
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            player_max_health: default_player_health(),
            player_min_damage: default_player_min_damage(),
            player_max_damage: default_player_max_damage(),
            leash_distance: default_leash_distance(),
            rng_seed: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            world_id: default_world_id(),
            websocket_port: default_websocket_port(),
            max_players: default_max_players(),
            content_path: default_content_path(),
            map: MapConfig::default(),
            timing: TimingConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("RUSTQUEST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RUSTQUEST_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("RUSTQUEST_WORLD_ID") {
            if let Ok(id) = val.parse() {
                self.world_id = id;
            }
        }
        if let Ok(val) = env::var("RUSTQUEST_WEBSOCKET_PORT") {
            if let Ok(port) = val.parse() {
                self.websocket_port = port;
            }
        }
        if let Ok(val) = env::var("RUSTQUEST_MAX_PLAYERS") {
            if let Ok(max) = val.parse() {
                self.max_players = max;
            }
        }
        if let Ok(val) = env::var("RUSTQUEST_CONTENT_PATH") {
            self.content_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("RUSTQUEST_TICK_RATE") {
            if let Ok(rate) = val.parse() {
                self.timing.tick_rate = rate;
            }
        }
        if let Ok(val) = env::var("RUSTQUEST_RNG_SEED") {
            if let Ok(seed) = val.parse() {
                self.combat.rng_seed = Some(seed);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // World ID must be 1-255
        if self.world_id == 0 {
            anyhow::bail!("World ID must be between 1 and 255");
        }

        // Max players must be reasonable
        if self.max_players == 0 || self.max_players > 10000 {
            anyhow::bail!("Max players must be between 1 and 10000");
        }

        // Tick rate must be reasonable
        if self.timing.tick_rate == 0 || self.timing.tick_rate > 1000 {
            anyhow::bail!("Tick rate must be between 1 and 1000 ticks per second");
        }
        if self.timing.regen_interval_ms == 0 {
            anyhow::bail!("Regen interval must be positive");
        }

        if self.map.width <= 0 || self.map.height <= 0 {
            anyhow::bail!("Map dimensions must be positive");
        }
        if self.map.zone_width == 0 || self.map.zone_height == 0 {
            anyhow::bail!("Zone dimensions must be positive");
        }
        let groups_x = div_ceil(self.map.width as i64, self.map.zone_width as i64);
        let groups_y = div_ceil(self.map.height as i64, self.map.zone_height as i64);
        if groups_x > u16::MAX as i64 || groups_y > u16::MAX as i64 {
            anyhow::bail!(
                "Map needs {}x{} zone groups, at most {} per axis",
                groups_x,
                groups_y,
                u16::MAX
            );
        }
        if self.map.starting_area.width <= 0 || self.map.starting_area.height <= 0 {
            anyhow::bail!("Starting area must not be empty");
        }

        if self.combat.player_max_health <= 0 {
            anyhow::bail!("Player max health must be positive");
        }
        if self.combat.player_min_damage < 0
            || self.combat.player_min_damage > self.combat.player_max_damage
        {
            anyhow::bail!("Player damage range is invalid");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Rustquest");
        assert_eq!(config.world_id, 1);
        assert_eq!(config.websocket_port, 8000);
        assert_eq!(config.timing.tick_rate, 50);
        assert_eq!(config.timing.regen_interval_ms, 2000);
        assert_eq!(config.map.zone_width, 28);
        assert_eq!(config.map.zone_height, 12);
    }

    #[test]
    fn test_tick_helpers() {
        let timing = TimingConfig::default();
        assert_eq!(timing.tick_interval(), Duration::from_millis(20));
        assert_eq!(timing.ticks_for(2000), 100);
        assert_eq!(timing.ticks_for(1), 1);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid world ID
        config.world_id = 0;
        assert!(config.validate().is_err());
        config.world_id = 1;

        // Tick rate out of range
        config.timing.tick_rate = 0;
        assert!(config.validate().is_err());
        config.timing.tick_rate = 50;

        // Inverted damage range
        config.combat.player_min_damage = 10;
        config.combat.player_max_damage = 2;
        assert!(config.validate().is_err());
        config.combat.player_min_damage = 3;
        config.combat.player_max_damage = 8;

        // Too many zone groups along one axis
        config.map.width = i32::MAX;
        config.map.zone_width = 1;
        assert!(config.validate().is_err());
        config.map.zone_width = u16::MAX;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
            server_name = "Test"

            [map]
            width = 100
            height = 60
            collisions = [[3, 4], [5, 6]]

            [timing]
            tick_rate = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.server_name, "Test");
        assert_eq!(config.map.width, 100);
        assert_eq!(config.map.collisions, vec![[3, 4], [5, 6]]);
        assert_eq!(config.map.zone_width, 28);
        assert_eq!(config.timing.tick_rate, 20);
        assert_eq!(config.timing.mob_respawn_ms, 30_000);
        assert!(config.validate().is_ok());
    }
}
