//! Voxel structure materialization from low-level placement strings.
//!
//! The interpreter walks the fully expanded block language with a
//! cursor (position + orientation), a bracket stack for branches, and
//! an occupancy grid. Movement tokens are `+`/`-` (x), `!`/`?` (y) and
//! `>`/`<` (z), each with a parenthesized signed distance, applied in
//! the cursor's rotated frame.

use std::collections::{HashMap, HashSet};

use crate::schema::tiles::{BlockKind, Rotation};

use super::grammar::GrammarError;

/// A placed block: kind plus anchor position in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedBlock {
    pub kind: BlockKind,
    pub position: [i64; 3],
}

/// A materialized voxel spaceship structure.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    blocks: Vec<PlacedBlock>,
    occupancy: HashSet<[i64; 3]>,
    /// Voxels that were already occupied when a block claimed them.
    collisions: usize,
}

impl Structure {
    /// Interpret a low-level placement string into a structure.
    pub fn from_ll_string(ll_string: &str) -> Result<Self, GrammarError> {
        let mut structure = Structure::default();
        let mut position = [0i64; 3];
        let mut orientation = IDENTITY;
        let mut stack: Vec<([i64; 3], [[i64; 3]; 3])> = Vec::new();

        let mut i = 0;
        while i < ll_string.len() {
            let rest = &ll_string[i..];
            if let Some(rot) = Rotation::match_prefix(rest) {
                orientation = mat_mul(orientation, rot.matrix());
                i += rot.token().len();
            } else if let Some(kind) = BlockKind::match_prefix(rest) {
                structure.place(kind, position, orientation);
                i += kind.token().len();
            } else if let Some(axis) = movement_axis(rest) {
                let (delta, len) = parse_distance(ll_string, i)?;
                let local = scale(axis, delta);
                let world = mat_apply(orientation, local);
                for d in 0..3 {
                    position[d] += world[d];
                }
                i += len;
            } else if rest.starts_with('[') {
                stack.push((position, orientation));
                i += 1;
            } else if rest.starts_with(']') {
                let (pos, orient) =
                    stack
                        .pop()
                        .ok_or_else(|| GrammarError::UnbalancedBrackets {
                            context: ll_string.to_string(),
                        })?;
                position = pos;
                orientation = orient;
                i += 1;
            } else {
                i += rest.chars().next().map_or(1, char::len_utf8);
            }
        }

        Ok(structure)
    }

    fn place(&mut self, kind: BlockKind, position: [i64; 3], orientation: [[i64; 3]; 3]) {
        let dims = kind.dims();
        for dx in 0..dims.x {
            for dy in 0..dims.y {
                for dz in 0..dims.z {
                    let local = [dx, dy, dz];
                    let world = mat_apply(orientation, local);
                    let voxel = [
                        position[0] + world[0],
                        position[1] + world[1],
                        position[2] + world[2],
                    ];
                    if !self.occupancy.insert(voxel) {
                        self.collisions += 1;
                    }
                }
            }
        }
        self.blocks.push(PlacedBlock { kind, position });
    }

    pub fn blocks(&self) -> &[PlacedBlock] {
        &self.blocks
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Occupied voxel count.
    pub fn volume(&self) -> usize {
        self.occupancy.len()
    }

    /// Total mass of all placed blocks.
    pub fn mass(&self) -> f64 {
        self.blocks.iter().map(|b| b.kind.mass()).sum()
    }

    /// Overlapping voxel claims recorded during placement.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn has_kind(&self, kind: BlockKind) -> bool {
        self.blocks.iter().any(|b| b.kind == kind)
    }

    /// Share of blocks that are functional (non-plating).
    pub fn functional_share(&self) -> f64 {
        if self.blocks.is_empty() {
            return 0.0;
        }
        let functional = self.blocks.iter().filter(|b| b.kind.is_functional()).count();
        functional as f64 / self.blocks.len() as f64
    }

    /// Inclusive min/max voxel bounds, or None when empty.
    pub fn bounds(&self) -> Option<([i64; 3], [i64; 3])> {
        let mut iter = self.occupancy.iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for voxel in iter {
            for d in 0..3 {
                min[d] = min[d].min(voxel[d]);
                max[d] = max[d].max(voxel[d]);
            }
        }
        Some((min, max))
    }

    /// Bounding-box extent per axis in voxels.
    pub fn max_dims(&self) -> [i64; 3] {
        match self.bounds() {
            Some((min, max)) => [
                max[0] - min[0] + 1,
                max[1] - min[1] + 1,
                max[2] - min[2] + 1,
            ],
            None => [0, 0, 0],
        }
    }

    /// Bounding-box extents sorted descending (major, medium, minor).
    pub fn principal_extents(&self) -> [f64; 3] {
        let dims = self.max_dims();
        let mut extents = [dims[0] as f64, dims[1] as f64, dims[2] as f64];
        extents.sort_by(|a, b| b.partial_cmp(a).unwrap());
        extents
    }

    /// Major-to-medium principal axis ratio.
    pub fn mame(&self) -> f64 {
        let [major, medium, _] = self.principal_extents();
        if medium == 0.0 { 1.0 } else { major / medium }
    }

    /// Major-to-minor principal axis ratio.
    pub fn mami(&self) -> f64 {
        let [major, _, minor] = self.principal_extents();
        if minor == 0.0 { 1.0 } else { major / minor }
    }

    /// Occupied fraction of the bounding box.
    pub fn filling(&self) -> f64 {
        let dims = self.max_dims();
        let box_volume = dims[0] * dims[1] * dims[2];
        if box_volume == 0 {
            return 0.0;
        }
        self.volume() as f64 / box_volume as f64
    }

    /// Best mirror-symmetry score across the x and z mid-planes.
    ///
    /// For each axis, the score is the fraction of occupied voxels whose
    /// reflection about the bounding-box mid-plane is also occupied.
    pub fn symmetry(&self) -> f64 {
        let Some((min, max)) = self.bounds() else {
            return 0.0;
        };
        let total = self.occupancy.len() as f64;
        let mut best: f64 = 0.0;
        for axis in [0usize, 2] {
            let matched = self
                .occupancy
                .iter()
                .filter(|v| {
                    let mut mirror = **v;
                    mirror[axis] = min[axis] + max[axis] - v[axis];
                    self.occupancy.contains(&mirror)
                })
                .count();
            best = best.max(matched as f64 / total);
        }
        best
    }

    /// Block counts per kind, for UI readouts.
    pub fn block_counts(&self) -> HashMap<BlockKind, usize> {
        let mut counts = HashMap::new();
        for block in &self.blocks {
            *counts.entry(block.kind).or_insert(0) += 1;
        }
        counts
    }
}

const IDENTITY: [[i64; 3]; 3] = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];

fn movement_axis(rest: &str) -> Option<[i64; 3]> {
    match rest.chars().next()? {
        '+' => Some([1, 0, 0]),
        '-' => Some([-1, 0, 0]),
        '!' => Some([0, 1, 0]),
        '?' => Some([0, -1, 0]),
        '>' => Some([0, 0, 1]),
        '<' => Some([0, 0, -1]),
        _ => None,
    }
}

/// Parse the `(n)` distance after a movement character at byte `i`.
/// Returns the signed distance and total token length.
fn parse_distance(s: &str, i: usize) -> Result<(i64, usize), GrammarError> {
    let after = &s[i + 1..];
    if !after.starts_with('(') {
        return Err(GrammarError::InvalidParameter {
            text: s[i..].chars().take(4).collect(),
        });
    }
    let close = after
        .find(')')
        .ok_or(GrammarError::UnterminatedParameter { position: i + 1 })?;
    let digits = &after[1..close];
    let n: i64 = digits.parse().map_err(|_| GrammarError::InvalidParameter {
        text: digits.to_string(),
    })?;
    // Movement char + '(' + digits + ')'.
    Ok((n, close + 2))
}

fn scale(v: [i64; 3], k: i64) -> [i64; 3] {
    [v[0] * k, v[1] * k, v[2] * k]
}

fn mat_apply(m: [[i64; 3]; 3], v: [i64; 3]) -> [i64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn mat_mul(a: [[i64; 3]; 3], b: [[i64; 3]; 3]) -> [[i64; 3]; 3] {
    let mut out = [[0i64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}
