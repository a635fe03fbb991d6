//! Tile and block tables for the spaceship grammar.
//!
//! Tiles are the placeable units of the high-level grammar; each has
//! integer dimensions (the `y` axis is the growth axis) and a connector
//! block offset used by the rotation-offset formulas. Blocks are the
//! terminal units of the low-level grammar that fill the voxel grid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Integer tile dimensions in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDims {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl TileDims {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

/// A placeable tile: dimensions plus its connector block offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileInfo {
    pub dims: TileDims,
    pub block_offset: i64,
}

/// The tile dimension table used by the high-to-mid-level translator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSet {
    entries: BTreeMap<String, TileInfo>,
}

impl TileSet {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, dims: TileDims, block_offset: i64) {
        self.entries.insert(name.into(), TileInfo { dims, block_offset });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn dims(&self, name: &str) -> Option<TileDims> {
        self.entries.get(name).map(|t| t.dims)
    }

    pub fn block_offset(&self, name: &str) -> Option<i64> {
        self.entries.get(name).map(|t| t.block_offset)
    }

    /// Tile names, longest first so prefix-sharing names match correctly.
    pub fn names_longest_first(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        names
    }
}

impl Default for TileSet {
    /// The default spaceship tile table.
    fn default() -> Self {
        let mut tiles = Self::new();
        tiles.insert("cockpit", TileDims::new(3, 2, 3), 1);
        tiles.insert("corridorsimple", TileDims::new(2, 2, 2), 1);
        tiles.insert("corridorcargo", TileDims::new(3, 2, 3), 2);
        tiles.insert("corridorgun", TileDims::new(2, 2, 2), 1);
        tiles.insert("thrusters", TileDims::new(3, 2, 3), 1);
        tiles.insert("corridorwall", TileDims::new(2, 1, 2), 1);
        tiles.insert("intersection", TileDims::new(2, 2, 2), 1);
        tiles
    }
}

/// The twelve rotation kinds of the branch connector grammar.
///
/// The first axis letter is the rotation axis; `cw`/`ccw` the direction;
/// the trailing letter the axis the branch extends toward. Each kind has
/// its own connector-offset formula in the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rotation {
    ZccwX,
    ZcwX,
    ZcwY,
    ZccwY,
    XcwY,
    XccwY,
    XcwZ,
    XccwZ,
    YcwX,
    YccwX,
    YcwZ,
    YccwZ,
}

impl Rotation {
    /// All rotation kinds in token order.
    pub const ALL: [Rotation; 12] = [
        Rotation::ZccwX,
        Rotation::ZcwX,
        Rotation::ZcwY,
        Rotation::ZccwY,
        Rotation::XcwY,
        Rotation::XccwY,
        Rotation::XcwZ,
        Rotation::XccwZ,
        Rotation::YcwX,
        Rotation::YccwX,
        Rotation::YcwZ,
        Rotation::YccwZ,
    ];

    /// The token spelling used in grammar strings.
    pub fn token(&self) -> &'static str {
        match self {
            Rotation::ZccwX => "RotZccwX",
            Rotation::ZcwX => "RotZcwX",
            Rotation::ZcwY => "RotZcwY",
            Rotation::ZccwY => "RotZccwY",
            Rotation::XcwY => "RotXcwY",
            Rotation::XccwY => "RotXccwY",
            Rotation::XcwZ => "RotXcwZ",
            Rotation::XccwZ => "RotXccwZ",
            Rotation::YcwX => "RotYcwX",
            Rotation::YccwX => "RotYccwX",
            Rotation::YcwZ => "RotYcwZ",
            Rotation::YccwZ => "RotYccwZ",
        }
    }

    /// Match a rotation token at the start of `s`.
    pub fn match_prefix(s: &str) -> Option<Rotation> {
        Rotation::ALL
            .iter()
            .copied()
            .find(|r| s.starts_with(r.token()))
    }

    /// The 90-degree rotation matrix applied to cursor orientation.
    ///
    /// `cw` is -90 degrees and `ccw` +90 degrees about the rotation axis,
    /// right-hand rule.
    pub fn matrix(&self) -> [[i64; 3]; 3] {
        match self {
            // About X
            Rotation::XcwY | Rotation::XcwZ => [[1, 0, 0], [0, 0, 1], [0, -1, 0]],
            Rotation::XccwY | Rotation::XccwZ => [[1, 0, 0], [0, 0, -1], [0, 1, 0]],
            // About Y
            Rotation::YcwX | Rotation::YcwZ => [[0, 0, -1], [0, 1, 0], [1, 0, 0]],
            Rotation::YccwX | Rotation::YccwZ => [[0, 0, 1], [0, 1, 0], [-1, 0, 0]],
            // About Z
            Rotation::ZcwX | Rotation::ZcwY => [[0, 1, 0], [-1, 0, 0], [0, 0, 1]],
            Rotation::ZccwX | Rotation::ZccwY => [[0, -1, 0], [1, 0, 0], [0, 0, 1]],
        }
    }
}

/// Terminal block kinds of the low-level grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockKind {
    Bridge,
    Armor,
    Cargo,
    Turret,
    Engine,
    Wall,
    Gyro,
}

impl BlockKind {
    /// All block kinds in token order.
    pub const ALL: [BlockKind; 7] = [
        BlockKind::Bridge,
        BlockKind::Armor,
        BlockKind::Cargo,
        BlockKind::Turret,
        BlockKind::Engine,
        BlockKind::Wall,
        BlockKind::Gyro,
    ];

    /// The token spelling used in low-level strings.
    pub fn token(&self) -> &'static str {
        match self {
            BlockKind::Bridge => "bridgeblock",
            BlockKind::Armor => "armorblock",
            BlockKind::Cargo => "cargoblock",
            BlockKind::Turret => "turretblock",
            BlockKind::Engine => "engineblock",
            BlockKind::Wall => "wallblock",
            BlockKind::Gyro => "gyroblock",
        }
    }

    /// Match a block token at the start of `s`.
    pub fn match_prefix(s: &str) -> Option<BlockKind> {
        BlockKind::ALL
            .iter()
            .copied()
            .find(|b| s.starts_with(b.token()))
    }

    /// Occupied extent in grid units.
    pub fn dims(&self) -> TileDims {
        match self {
            BlockKind::Bridge => TileDims::new(3, 2, 3),
            BlockKind::Armor => TileDims::new(2, 2, 2),
            BlockKind::Cargo => TileDims::new(3, 2, 3),
            BlockKind::Turret => TileDims::new(1, 1, 1),
            BlockKind::Engine => TileDims::new(3, 2, 3),
            BlockKind::Wall => TileDims::new(2, 1, 2),
            BlockKind::Gyro => TileDims::new(2, 2, 2),
        }
    }

    /// Block mass in abstract units.
    pub fn mass(&self) -> f64 {
        match self {
            BlockKind::Bridge => 8.0,
            BlockKind::Armor => 4.0,
            BlockKind::Cargo => 10.0,
            BlockKind::Turret => 2.0,
            BlockKind::Engine => 12.0,
            BlockKind::Wall => 2.0,
            BlockKind::Gyro => 6.0,
        }
    }

    /// Functional blocks are everything that is not plain hull plating.
    pub fn is_functional(&self) -> bool {
        !matches!(self, BlockKind::Armor | BlockKind::Wall)
    }
}
