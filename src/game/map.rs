//! Map module
//!
//! The world map is an external collaborator of the simulation core. The core
//! only consumes it through [`SpatialPartition`]:
//! - Mapping positions to zone groups
//! - Adjacency (halo) queries between groups
//! - Bounds and collision checks for position validation
//! - Random placement inside rectangular areas
//!
//! [`GridMap`] is the concrete provider built from configuration.

use std::collections::HashSet;
use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::entity::Position;
use crate::config::MapConfig;

/// Default zone width in tiles
pub const ZONE_WIDTH: u16 = 28;

/// Default zone height in tiles
pub const ZONE_HEIGHT: u16 = 12;

/// Attempts made before giving up on a random position in an area
pub const RANDOM_POSITION_ATTEMPTS: usize = 64;

/// Identifier of a zone group (a fixed spatial partition cell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId {
    /// Group column
    pub x: u16,
    /// Group row
    pub y: u16,
}

impl GroupId {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

/// A rectangular area of the map, in tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Area {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check if a position lies inside this area
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.x
            && pos.y >= self.y
            && pos.x < self.x + self.width
            && pos.y < self.y + self.height
    }
}

/// Spatial partition provider consumed by the simulation core
pub trait SpatialPartition: Send {
    /// Group containing a position
    fn group_id_for_position(&self, pos: Position) -> GroupId;

    /// The halo of a group: the group itself plus every adjacent group
    fn adjacent_groups(&self, group: GroupId) -> Vec<GroupId>;

    /// Every group of the map
    fn groups(&self) -> Vec<GroupId>;

    fn is_out_of_bounds(&self, pos: Position) -> bool;

    fn is_colliding(&self, pos: Position) -> bool;

    /// A position is valid when it is inside the map and not colliding
    fn is_valid_position(&self, pos: Position) -> bool {
        !self.is_out_of_bounds(pos) && !self.is_colliding(pos)
    }

    /// A random valid position inside `area`, if one can be found
    fn random_position_in(&self, area: &Area, rng: &mut dyn RngCore) -> Option<Position> {
        if area.width <= 0 || area.height <= 0 {
            return None;
        }
        for _ in 0..RANDOM_POSITION_ATTEMPTS {
            let pos = Position::new(
                area.x + rng.gen_range(0..area.width),
                area.y + rng.gen_range(0..area.height),
            );
            if self.is_valid_position(pos) {
                return Some(pos);
            }
        }
        warn!(?area, "No valid position found in area");
        None
    }
}

/// Grid map made of fixed-size zones
#[derive(Debug, Clone)]
pub struct GridMap {
    /// Map width in tiles
    width: i32,
    /// Map height in tiles
    height: i32,
    /// Zone width in tiles
    zone_width: u16,
    /// Zone height in tiles
    zone_height: u16,
    /// Number of group columns
    groups_x: u16,
    /// Number of group rows
    groups_y: u16,
    /// Colliding tiles
    collisions: HashSet<Position>,
}

impl GridMap {
    /// Create a map with default zone dimensions
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_zone_size(width, height, ZONE_WIDTH, ZONE_HEIGHT)
    }

    /// Create a map with custom zone dimensions
    pub fn with_zone_size(width: i32, height: i32, zone_width: u16, zone_height: u16) -> Self {
        let zone_width = zone_width.max(1);
        let zone_height = zone_height.max(1);
        let groups_x = div_ceil(width.max(1), zone_width as i32).min(u16::MAX as i32) as u16;
        let groups_y = div_ceil(height.max(1), zone_height as i32).min(u16::MAX as i32) as u16;

        debug!(
            width = width,
            height = height,
            groups_x = groups_x,
            groups_y = groups_y,
            "Created grid map"
        );

        Self {
            width,
            height,
            zone_width,
            zone_height,
            groups_x,
            groups_y,
            collisions: HashSet::new(),
        }
    }

    /// Build a map from configuration
    pub fn from_config(config: &MapConfig) -> Self {
        let mut map = Self::with_zone_size(
            config.width,
            config.height,
            config.zone_width,
            config.zone_height,
        );
        for &[x, y] in &config.collisions {
            map.add_collision(Position::new(x, y));
        }
        map
    }

    /// Mark a tile as colliding
    pub fn add_collision(&mut self, pos: Position) {
        self.collisions.insert(pos);
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Number of groups in the map
    pub fn group_count(&self) -> usize {
        self.groups_x as usize * self.groups_y as usize
    }
}

fn div_ceil(a: i32, b: i32) -> i32 {
    ((a as i64 + b as i64 - 1) / b as i64) as i32
}

impl SpatialPartition for GridMap {
    fn group_id_for_position(&self, pos: Position) -> GroupId {
        let gx = (pos.x.max(0) / self.zone_width as i32).min(self.groups_x as i32 - 1);
        let gy = (pos.y.max(0) / self.zone_height as i32).min(self.groups_y as i32 - 1);
        GroupId::new(gx as u16, gy as u16)
    }

    fn adjacent_groups(&self, group: GroupId) -> Vec<GroupId> {
        let mut halo = Vec::with_capacity(9);
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let x = group.x as i32 + dx;
                let y = group.y as i32 + dy;
                if x >= 0 && y >= 0 && x < self.groups_x as i32 && y < self.groups_y as i32 {
                    halo.push(GroupId::new(x as u16, y as u16));
                }
            }
        }
        halo
    }

    fn groups(&self) -> Vec<GroupId> {
        let mut groups = Vec::with_capacity(self.group_count());
        for y in 0..self.groups_y {
            for x in 0..self.groups_x {
                groups.push(GroupId::new(x, y));
            }
        }
        groups
    }

    fn is_out_of_bounds(&self, pos: Position) -> bool {
        pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height
    }

    fn is_colliding(&self, pos: Position) -> bool {
        self.collisions.contains(&pos)
    }
}
