//! Genotype variation: grammar-aware mutation and crossover.
//!
//! Both operators work on tokenized genotype strings so they never
//! split an atom or unbalance a bracket pair. Mutation is restricted to
//! the grammar modules currently flagged mutable.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use crate::compute::grammar::{Atom, AtomKind, GrammarError, tokenize};
use crate::schema::config::VariationConfig;
use crate::schema::tiles::TileSet;

/// Shared context for the variation operators.
pub struct VariationOps<'a> {
    pub rng: &'a mut StdRng,
    pub config: &'a VariationConfig,
    pub tiles: &'a TileSet,
    /// Module (tile) names that may be inserted or perturbed.
    pub active_modules: Vec<String>,
}

impl<'a> VariationOps<'a> {
    pub fn new(
        rng: &'a mut StdRng,
        config: &'a VariationConfig,
        tiles: &'a TileSet,
        active_modules: Vec<String>,
    ) -> Self {
        Self {
            rng,
            config,
            tiles,
            active_modules,
        }
    }

    /// Mutate a genotype: perturb a tile parameter, or insert/drop a
    /// whole module atom at bracket depth zero.
    ///
    /// Returns the genotype unchanged when no eligible mutation site
    /// exists (e.g. every module is toggled off).
    pub fn mutate(&mut self, genotype: &str) -> Result<String, GrammarError> {
        let atoms = tokenize(genotype, self.tiles)?;
        if atoms.is_empty() {
            return Ok(genotype.to_string());
        }

        if self.rng.r#gen::<f64>() < self.config.param_mutation_rate {
            self.perturb_parameter(genotype, &atoms)
        } else if self.rng.gen_bool(0.5) {
            self.insert_module(genotype, &atoms)
        } else {
            self.drop_module(genotype, &atoms)
        }
    }

    /// Nudge the multiplicity of a random mutable tile atom.
    fn perturb_parameter(&mut self, genotype: &str, atoms: &[Atom]) -> Result<String, GrammarError> {
        let sites: Vec<&Atom> = atoms
            .iter()
            .filter(|a| self.is_mutable_tile(a))
            .collect();
        let Some(site) = self.pick(&sites) else {
            return Ok(genotype.to_string());
        };
        let n = site.n.unwrap_or(1) as i64;
        let noise: f64 = self.rng.sample(StandardNormal);
        let delta = (noise * self.config.param_mutation_strength).round() as i64;
        let mutated = (n + delta).max(1);

        let mut out = String::with_capacity(genotype.len() + 4);
        out.push_str(&genotype[..site.start]);
        out.push_str(site.text());
        out.push_str(&format!("({mutated})"));
        out.push_str(&genotype[site.end..]);
        Ok(out)
    }

    /// Insert a fresh module atom at a random depth-zero boundary.
    fn insert_module(&mut self, genotype: &str, atoms: &[Atom]) -> Result<String, GrammarError> {
        if self.active_modules.is_empty() {
            return Ok(genotype.to_string());
        }
        let idx = self.rng.gen_range(0..self.active_modules.len());
        let module = self.active_modules[idx].clone();
        let n = self.rng.gen_range(1..=3u32);
        let boundaries = depth_zero_boundaries(atoms);
        let Some(at) = self.pick(&boundaries) else {
            return Ok(genotype.to_string());
        };

        let mut out = String::with_capacity(genotype.len() + module.len() + 4);
        out.push_str(&genotype[..at]);
        out.push_str(&format!("{module}({n})"));
        out.push_str(&genotype[at..]);
        Ok(out)
    }

    /// Remove a random mutable depth-zero tile atom, respecting the
    /// minimum genotype size.
    fn drop_module(&mut self, genotype: &str, atoms: &[Atom]) -> Result<String, GrammarError> {
        if atoms.len() <= self.config.min_atoms {
            return Ok(genotype.to_string());
        }
        let mut depth = 0usize;
        let mut sites: Vec<&Atom> = Vec::new();
        for atom in atoms {
            match atom.kind {
                AtomKind::Open => depth += 1,
                AtomKind::Close => depth = depth.saturating_sub(1),
                _ => {
                    if depth == 0 && self.is_mutable_tile(atom) {
                        sites.push(atom);
                    }
                }
            }
        }
        let Some(site) = self.pick(&sites) else {
            return Ok(genotype.to_string());
        };
        let mut out = String::with_capacity(genotype.len());
        out.push_str(&genotype[..site.start]);
        out.push_str(&genotype[site.end..]);
        Ok(out)
    }

    /// Single-point crossover at bracket depth-zero atom boundaries.
    ///
    /// The child is a prefix of the first parent joined to a suffix of
    /// the second, so bracket pairs never split across the cut.
    pub fn crossover(&mut self, a: &str, b: &str) -> Result<String, GrammarError> {
        let atoms_a = tokenize(a, self.tiles)?;
        let atoms_b = tokenize(b, self.tiles)?;
        let cuts_a = depth_zero_boundaries(&atoms_a);
        let cuts_b = depth_zero_boundaries(&atoms_b);
        if cuts_a.is_empty() || cuts_b.is_empty() {
            return Ok(a.to_string());
        }
        let i = cuts_a[self.rng.gen_range(0..cuts_a.len())];
        let j = cuts_b[self.rng.gen_range(0..cuts_b.len())];
        Ok(format!("{}{}", &a[..i], &b[j..]))
    }

    fn is_mutable_tile(&self, atom: &Atom) -> bool {
        matches!(&atom.kind, AtomKind::Tile(name) if self.active_modules.iter().any(|m| m == name))
    }

    fn pick<'b, T: Copy>(&mut self, items: &'b [T]) -> Option<T> {
        if items.is_empty() {
            None
        } else {
            Some(items[self.rng.gen_range(0..items.len())])
        }
    }
}

/// Byte offsets where the atom stream sits at bracket depth zero.
///
/// Boundaries fall after each depth-zero atom; the offset before the
/// first atom is excluded so crossover always keeps a non-empty prefix.
fn depth_zero_boundaries(atoms: &[Atom]) -> Vec<usize> {
    let mut depth = 0usize;
    let mut boundaries = Vec::new();
    for atom in atoms {
        match atom.kind {
            AtomKind::Open => depth += 1,
            AtomKind::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    boundaries.push(atom.end);
                }
            }
            _ => {
                if depth == 0 {
                    boundaries.push(atom.end);
                }
            }
        }
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn active() -> Vec<String> {
        ["cockpit", "corridorsimple", "corridorcargo", "corridorgun", "thrusters"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn balanced(s: &str) -> bool {
        let mut depth = 0i64;
        for c in s.chars() {
            match c {
                '[' => depth += 1,
                ']' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    #[test]
    fn test_mutation_keeps_brackets_balanced() {
        let tiles = TileSet::default();
        let config = VariationConfig::default();
        let mut rng = StdRng::seed_from_u64(13);
        let mut ops = VariationOps::new(&mut rng, &config, &tiles, active());
        let genotype = "cockpit(1)corridorsimple(2)[RotYcwZcorridorsimple(1)]thrusters(1)";
        for _ in 0..100 {
            let mutated = ops.mutate(genotype).unwrap();
            assert!(balanced(&mutated), "unbalanced: {mutated}");
            assert!(tokenize(&mutated, &tiles).is_ok());
        }
    }

    #[test]
    fn test_mutation_with_no_active_modules_is_identity() {
        let tiles = TileSet::default();
        let config = VariationConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut ops = VariationOps::new(&mut rng, &config, &tiles, Vec::new());
        let genotype = "cockpit(1)corridorsimple(2)thrusters(1)";
        for _ in 0..50 {
            // No module is mutable, so every mutation path falls back
            // to the unchanged genotype.
            assert_eq!(ops.mutate(genotype).unwrap(), genotype);
        }
    }

    #[test]
    fn test_parameter_perturbation_floors_at_one() {
        let tiles = TileSet::default();
        let config = VariationConfig {
            param_mutation_rate: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(17);
        let mut ops = VariationOps::new(&mut rng, &config, &tiles, active());
        for _ in 0..100 {
            let mutated = ops.mutate("corridorsimple(1)").unwrap();
            let atoms = tokenize(&mutated, &tiles).unwrap();
            assert!(atoms[0].n.unwrap() >= 1, "bad multiplicity in {mutated}");
        }
    }

    #[test]
    fn test_drop_respects_min_atoms() {
        let tiles = TileSet::default();
        let config = VariationConfig {
            param_mutation_rate: 0.0,
            min_atoms: 3,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(29);
        let mut ops = VariationOps::new(&mut rng, &config, &tiles, active());
        let genotype = "cockpit(1)corridorsimple(1)thrusters(1)";
        for _ in 0..50 {
            let mutated = ops.mutate(genotype).unwrap();
            let atoms = tokenize(&mutated, &tiles).unwrap();
            assert!(atoms.len() >= 3, "shrank too far: {mutated}");
        }
    }

    #[test]
    fn test_crossover_keeps_brackets_balanced() {
        let tiles = TileSet::default();
        let config = VariationConfig::default();
        let mut rng = StdRng::seed_from_u64(31);
        let mut ops = VariationOps::new(&mut rng, &config, &tiles, active());
        let a = "cockpit(1)corridorsimple(2)[RotYcwZcorridorsimple(1)]thrusters(1)";
        let b = "cockpit(1)corridorcargo(3)[RotYccwZcorridorgun(2)]thrusters(2)";
        for _ in 0..100 {
            let child = ops.crossover(a, b).unwrap();
            assert!(balanced(&child), "unbalanced: {child}");
            assert!(!child.is_empty());
        }
    }

    #[test]
    fn test_crossover_mixes_parents() {
        let tiles = TileSet::default();
        let config = VariationConfig::default();
        let mut rng = StdRng::seed_from_u64(37);
        let mut ops = VariationOps::new(&mut rng, &config, &tiles, active());
        let a = "cockpit(1)corridorsimple(2)thrusters(1)";
        let b = "corridorcargo(3)corridorgun(2)";
        let mut saw_mix = false;
        for _ in 0..100 {
            let child = ops.crossover(a, b).unwrap();
            if child.contains("cockpit") && child.contains("corridorgun") {
                saw_mix = true;
                break;
            }
        }
        assert!(saw_mix);
    }
}
