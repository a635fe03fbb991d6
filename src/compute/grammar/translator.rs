//! High- to mid-level translation of tile strings.
//!
//! The translator tokenizes an expanded high-level string into atoms,
//! emits one placement token per unit of tile multiplicity with
//! dimension-derived spacing, computes connector offsets for branch
//! rotations, and finally inserts intersection tokens at branch closes,
//! merging the rotation tags of textually adjacent sibling branches.

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::tiles::{Rotation, TileDims, TileSet};

use super::GrammarError;

/// A lexical atom of the high-level tile language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub kind: AtomKind,
    /// Multiplicity; present only for placeable tiles (defaults to 1).
    pub n: Option<u32>,
    /// Byte span in the source string.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomKind {
    Tile(String),
    Open,
    Close,
    Rot(Rotation),
}

impl Atom {
    /// The atom's textual form (without any parameter suffix).
    pub fn text(&self) -> &str {
        match &self.kind {
            AtomKind::Tile(name) => name,
            AtomKind::Open => "[",
            AtomKind::Close => "]",
            AtomKind::Rot(rot) => rot.token(),
        }
    }

    pub fn is_tile(&self) -> bool {
        matches!(self.kind, AtomKind::Tile(_))
    }
}

/// Tokenize a high-level string into atoms.
///
/// Rotation tokens, brackets, and tile names (longest first) are
/// recognized; any other character is skipped. A parenthesized integer
/// directly after an atom is consumed as its multiplicity, recorded
/// only for placeable tiles.
pub fn tokenize(string: &str, tiles: &TileSet) -> Result<Vec<Atom>, GrammarError> {
    let tile_names = tiles.names_longest_first();
    let mut atoms = Vec::new();
    let mut i = 0;

    while i < string.len() {
        let rest = &string[i..];
        let (kind, len) = if let Some(rot) = Rotation::match_prefix(rest) {
            (AtomKind::Rot(rot), rot.token().len())
        } else if rest.starts_with('[') {
            (AtomKind::Open, 1)
        } else if rest.starts_with(']') {
            (AtomKind::Close, 1)
        } else if let Some(name) = tile_names.iter().find(|n| rest.starts_with(**n)) {
            (AtomKind::Tile(name.to_string()), name.len())
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        };

        let start = i;
        let mut end = i + len;
        let mut n = None;
        if string[end..].starts_with('(') {
            let close = string[end..]
                .find(')')
                .ok_or(GrammarError::UnterminatedParameter { position: end })?;
            let params = &string[end..end + close + 1];
            let digits = &params[1..params.len() - 1];
            n = Some(
                digits
                    .parse::<u32>()
                    .map_err(|_| GrammarError::InvalidParameter {
                        text: params.to_string(),
                    })?,
            );
            end += params.len();
        }

        let is_tile = matches!(kind, AtomKind::Tile(_));
        atoms.push(Atom {
            kind,
            n: if is_tile { Some(n.unwrap_or(1)) } else { None },
            start,
            end,
        });
        i = end;
    }

    Ok(atoms)
}

/// Translates expanded high-level strings into the mid-level placement
/// language.
pub struct Translator<'a> {
    tiles: &'a TileSet,
}

impl<'a> Translator<'a> {
    pub fn new(tiles: &'a TileSet) -> Self {
        Self { tiles }
    }

    /// Full translation: tokenize, lower to mid-level, add intersections.
    pub fn transform(&self, string: &str) -> Result<String, GrammarError> {
        let atoms = tokenize(string, self.tiles)?;
        let mid = self.to_midlevel(&atoms)?;
        self.add_intersections(&mid)
    }

    fn dims_of(&self, name: &str) -> Result<TileDims, GrammarError> {
        self.tiles.dims(name).ok_or_else(|| GrammarError::UnknownTile {
            name: name.to_string(),
        })
    }

    fn offset_of(&self, name: &str) -> Result<i64, GrammarError> {
        self.tiles
            .block_offset(name)
            .ok_or_else(|| GrammarError::UnknownTile {
                name: name.to_string(),
            })
    }

    /// Lower an atom list to the mid-level placement string.
    fn to_midlevel(&self, atoms: &[Atom]) -> Result<String, GrammarError> {
        let mut last_parents: Vec<String> = Vec::new();
        let mut out = String::new();

        for (i, atom) in atoms.iter().enumerate() {
            match &atom.kind {
                AtomKind::Tile(name) => {
                    let dims = self.dims_of(name)?;
                    let n = atom.n.unwrap_or(1);
                    for _ in 0..n {
                        out.push_str(&format!("{name}!({})", dims.y));
                    }
                    // Corridors abutting a branch close get a capping wall.
                    if name.starts_with("corridor")
                        && matches!(atoms.get(i + 1).map(|a| &a.kind), Some(AtomKind::Close))
                    {
                        out.push_str("corridorwall!(10)");
                    }
                }
                AtomKind::Open => out.push('['),
                AtomKind::Close => out.push(']'),
                AtomKind::Rot(rot) => {
                    let parent = last_parents
                        .last()
                        .ok_or(GrammarError::DanglingRotation)?
                        .clone();
                    let parent_dims = self.dims_of(&parent)?;
                    let next_tile = atoms[i + 1..]
                        .iter()
                        .find(|a| a.n.is_some())
                        .and_then(|a| match &a.kind {
                            AtomKind::Tile(name) => Some(name.as_str()),
                            _ => None,
                        })
                        .ok_or(GrammarError::DanglingRotation)?;
                    let next_dims = self.dims_of(next_tile)?;
                    let next_offset = self.offset_of(next_tile)?;
                    out.push_str(&rotation_offset(*rot, parent_dims, next_dims, next_offset));
                    out.push_str(rot.token());
                }
            }

            if i + 1 < atoms.len() {
                if !matches!(atom.kind, AtomKind::Close)
                    && matches!(atoms[i + 1].kind, AtomKind::Open)
                {
                    last_parents.push(atom.text().to_string());
                }
                if matches!(atom.kind, AtomKind::Close) && atoms[i + 1].n.is_some() {
                    last_parents
                        .pop()
                        .ok_or_else(|| GrammarError::UnbalancedBrackets {
                            context: atom.text().to_string(),
                        })?;
                }
            }
        }

        Ok(out)
    }

    /// Insert intersection tokens at branch closes.
    ///
    /// A branch whose close directly abuts the next branch's open (no
    /// characters between) hands its rotation tag to that neighbour's
    /// close; the tags accumulate and are emitted deduplicated and
    /// sorted ahead of a single intersection token. Non-adjacent
    /// branches get independent tokens.
    fn add_intersections(&self, string: &str) -> Result<String, GrammarError> {
        // Matching bracket pairs, in opening order.
        let mut brackets: Vec<(usize, usize)> = Vec::new();
        for (i, c) in string.char_indices() {
            if c != '[' {
                continue;
            }
            let mut idx_c = find_from(string, ']', i).ok_or_else(|| {
                GrammarError::UnbalancedBrackets {
                    context: string.to_string(),
                }
            })?;
            let mut ni_o = find_from(string, '[', i + 1);
            while let Some(o) = ni_o {
                if o >= idx_c {
                    break;
                }
                idx_c = find_from(string, ']', idx_c + 1).ok_or_else(|| {
                    GrammarError::UnbalancedBrackets {
                        context: string.to_string(),
                    }
                })?;
                ni_o = find_from(string, '[', o + 1);
            }
            brackets.push((i, idx_c));
        }

        let mut to_add: BTreeMap<usize, Vec<&'static str>> = BTreeMap::new();
        // The tag carries over to a branch without its own rotation.
        let mut current_rot: Option<&'static str> = None;
        for (bi, b) in brackets.iter().enumerate() {
            for rot in Rotation::ALL {
                if string[b.0..b.1].contains(rot.token()) {
                    current_rot = Some(rot.token());
                    break;
                }
            }
            let rot = current_rot.ok_or(GrammarError::MissingBranchRotation)?;

            let mut has_neighbours = false;
            for (t0, t1) in &brackets[bi..] {
                if *t0 > 0 && b.1 == t0 - 1 {
                    has_neighbours = true;
                    match to_add.remove(&b.1) {
                        None => {
                            to_add.insert(*t1, vec![rot]);
                        }
                        Some(mut tags) => {
                            tags.push(rot);
                            to_add.insert(*t1, tags);
                        }
                    }
                    break;
                }
            }
            if !has_neighbours {
                to_add.entry(b.1).or_default().push(rot);
            }
        }

        let mut out = string.to_string();
        let mut offset = 0;
        for (pos, tags) in to_add {
            let unique: BTreeSet<&str> = tags.into_iter().collect();
            let tag: String = unique.into_iter().collect();
            let insertion = format!("{tag}intersection!(25)");
            out.insert_str(pos + 1 + offset, &insertion);
            offset += insertion.len();
        }
        Ok(out)
    }
}

/// The twelve connector-offset formulas, one per rotation kind.
///
/// `dims` and `last_dims` are both the parent tile's dimensions, kept
/// separate to mirror the documented formula table. The `ZccwY` case
/// adds the offset: the source formula doubles the subtraction sign
/// (`z - -offset`), reproduced here as documented behavior.
fn rotation_offset(
    rot: Rotation,
    parent_dims: TileDims,
    next_dims: TileDims,
    next_offset: i64,
) -> String {
    let dims = parent_dims;
    let last_dims = parent_dims;
    match rot {
        Rotation::ZccwX => format!("+({})>({})", dims.x, next_dims.x - next_offset),
        Rotation::ZcwX => format!("-({next_offset})"),
        Rotation::ZcwY => format!("?({next_offset})"),
        Rotation::ZccwY => format!("!({})>({})", dims.y, dims.z + next_offset),
        Rotation::XcwY => format!("?({next_offset})"),
        Rotation::XccwY => format!("-({next_offset})"),
        Rotation::XcwZ => format!("-({next_offset})"),
        Rotation::XccwZ => format!("+({})>({})", dims.x, next_dims.x - dims.z),
        Rotation::YcwX => format!("-({next_offset})"),
        Rotation::YccwX => format!("+({})!({})", dims.x, dims.x - next_offset),
        Rotation::YcwZ => format!(">({next_offset})"),
        Rotation::YccwZ => format!("!({})<({})", dims.z - next_offset, last_dims.z),
    }
}

fn find_from(s: &str, needle: char, from: usize) -> Option<usize> {
    s[from..].find(needle).map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiles() -> TileSet {
        TileSet::default()
    }

    #[test]
    fn test_tokenize_tiles_and_brackets() {
        let ts = tiles();
        let atoms = tokenize("cockpit(1)corridorsimple(2)[RotYcwZcorridorsimple]", &ts).unwrap();
        assert_eq!(atoms.len(), 6);
        assert_eq!(atoms[0].text(), "cockpit");
        assert_eq!(atoms[0].n, Some(1));
        assert_eq!(atoms[1].n, Some(2));
        assert_eq!(atoms[2].kind, AtomKind::Open);
        assert_eq!(atoms[3].kind, AtomKind::Rot(Rotation::YcwZ));
        // Tile without explicit parameter defaults to multiplicity 1.
        assert_eq!(atoms[4].n, Some(1));
        assert_eq!(atoms[5].kind, AtomKind::Close);
    }

    #[test]
    fn test_tokenize_rejects_unterminated_parameter() {
        let err = tokenize("cockpit(3", &tiles());
        assert!(matches!(
            err,
            Err(GrammarError::UnterminatedParameter { .. })
        ));
    }

    #[test]
    fn test_multiplicity_emits_repeated_placements() {
        let ts = tiles();
        let translator = Translator::new(&ts);
        let out = translator.transform("corridorsimple(3)").unwrap();
        assert_eq!(
            out,
            "corridorsimple!(2)corridorsimple!(2)corridorsimple!(2)"
        );
    }

    #[test]
    fn test_corridor_before_close_gets_wall() {
        let ts = tiles();
        let translator = Translator::new(&ts);
        let out = translator
            .transform("corridorsimple(2)[RotYcwZcorridorsimple(1)]thrusters(1)")
            .unwrap();
        assert!(out.contains("corridorwall!(10)]"));
        // Branch close carries its rotation tag plus an intersection.
        assert!(out.contains("]RotYcwZintersection!(25)thrusters!(2)"));
        // Connector offset for YcwZ is the next tile's block offset.
        assert!(out.contains("[>(1)RotYcwZ"));
    }

    #[test]
    fn test_rotation_offset_formulas() {
        let parent = TileDims::new(2, 2, 2);
        let next = TileDims::new(3, 2, 3);
        assert_eq!(
            rotation_offset(Rotation::ZccwX, parent, next, 1),
            "+(2)>(2)"
        );
        assert_eq!(rotation_offset(Rotation::ZcwX, parent, next, 1), "-(1)");
        assert_eq!(rotation_offset(Rotation::ZcwY, parent, next, 1), "?(1)");
        // The doubled-minus case: z + offset, not z - offset.
        assert_eq!(
            rotation_offset(Rotation::ZccwY, parent, next, 1),
            "!(2)>(3)"
        );
        assert_eq!(
            rotation_offset(Rotation::XccwZ, parent, next, 1),
            "+(2)>(1)"
        );
        assert_eq!(
            rotation_offset(Rotation::YccwX, parent, next, 1),
            "+(2)!(1)"
        );
        assert_eq!(rotation_offset(Rotation::YcwZ, parent, next, 1), ">(1)");
        assert_eq!(
            rotation_offset(Rotation::YccwZ, parent, next, 1),
            "!(1)<(2)"
        );
    }

    #[test]
    fn test_adjacent_branches_merge_intersections() {
        let ts = tiles();
        let translator = Translator::new(&ts);
        let out = translator
            .transform(
                "corridorsimple(1)[RotYcwZcorridorsimple(1)][RotYccwZcorridorsimple(1)]thrusters(1)",
            )
            .unwrap();
        // One merged intersection after the second close, tags sorted
        // and deduplicated; none after the first close.
        assert_eq!(out.matches("intersection!(25)").count(), 1);
        assert!(out.contains("]RotYccwZRotYcwZintersection!(25)thrusters!(2)"));
        assert!(!out.contains(")][RotYccwZRotYcwZ"));
    }

    #[test]
    fn test_separated_branches_get_independent_intersections() {
        let ts = tiles();
        let translator = Translator::new(&ts);
        let out = translator
            .transform(
                "corridorsimple(1)[RotYcwZcorridorsimple(1)]corridorsimple(1)[RotYccwZcorridorsimple(1)]thrusters(1)",
            )
            .unwrap();
        assert_eq!(out.matches("intersection!(25)").count(), 2);
        assert!(out.contains("]RotYcwZintersection!(25)"));
        assert!(out.contains("]RotYccwZintersection!(25)"));
    }

    #[test]
    fn test_rotation_without_following_tile_is_fatal() {
        let ts = tiles();
        let translator = Translator::new(&ts);
        let err = translator.transform("corridorsimple(1)[RotYcwZ]");
        assert!(matches!(err, Err(GrammarError::DanglingRotation)));
    }

    #[test]
    fn test_unknown_tile_is_fatal() {
        let mut ts = TileSet::new();
        ts.insert("corridorsimple", TileDims::new(2, 2, 2), 1);
        let translator = Translator::new(&ts);
        // 'warpcore' is not in the dimension table, so it never
        // tokenizes as a tile and the rotation finds no target.
        let err = translator.transform("corridorsimple(1)[RotYcwZwarpcore(2)]");
        assert!(err.is_err());
    }
}
