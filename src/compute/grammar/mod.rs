//! The two-tier stochastic L-system that grows spaceship hulls.
//!
//! A high-level expander rewrites the axiom into a string of placeable
//! tile atoms, the translator lowers that string into the mid-level
//! placement language, and the low-level expander substitutes terminal
//! block atoms. See [`expander`] and [`translator`] for the rewriting
//! semantics.

pub mod expander;
pub mod translator;

use rand::rngs::StdRng;

use crate::compute::structure::Structure;
use crate::schema::config::ExpansionConfig;
use crate::schema::rules::StochasticRules;
use crate::schema::tiles::TileSet;

pub use expander::{expand_high_level, expand_low_level};
pub use translator::{Atom, AtomKind, Translator, tokenize};

/// Grammar-level failures. Fatal for the expansion being attempted,
/// recoverable for the caller (retry with a fresh genotype).
#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("Unterminated parameter bracket at byte {position}")]
    UnterminatedParameter { position: usize },
    #[error("Invalid integer parameter '{text}'")]
    InvalidParameter { text: String },
    #[error("No rule for left-hand symbol '{lhs}'")]
    NoRuleFor { lhs: String },
    #[error("Rule for '{lhs}' expects a parameter but none was supplied")]
    MissingParameter { lhs: String },
    #[error("Unknown tile '{name}' in dimension table")]
    UnknownTile { name: String },
    #[error("Rotation atom has no following placeable tile")]
    DanglingRotation,
    #[error("Branch contains no rotation tag")]
    MissingBranchRotation,
    #[error("Unbalanced brackets in '{context}'")]
    UnbalancedBrackets { context: String },
}

/// A named grammar module that variation can be restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsModule {
    pub name: String,
    pub active: bool,
}

/// The full two-tier L-system: rules, tile tables, and modules.
#[derive(Debug, Clone)]
pub struct LSystem {
    hl_rules: StochasticRules,
    ll_rules: StochasticRules,
    tiles: TileSet,
    modules: Vec<LsModule>,
    axiom: String,
    expansion: ExpansionConfig,
}

impl LSystem {
    pub fn new(
        hl_rules: StochasticRules,
        ll_rules: StochasticRules,
        tiles: TileSet,
        axiom: impl Into<String>,
        expansion: ExpansionConfig,
    ) -> Self {
        // Placeable tiles double as the mutable module set.
        let modules = ["cockpit", "corridorsimple", "corridorcargo", "corridorgun", "thrusters"]
            .iter()
            .filter(|name| tiles.contains(name))
            .map(|name| LsModule {
                name: name.to_string(),
                active: true,
            })
            .collect();
        Self {
            hl_rules,
            ll_rules,
            tiles,
            modules,
            axiom: axiom.into(),
            expansion,
        }
    }

    /// The default spaceship L-system.
    pub fn spaceship(expansion: ExpansionConfig) -> Self {
        Self::new(
            StochasticRules::default_high_level(),
            StochasticRules::default_low_level(),
            TileSet::default(),
            "begin",
            expansion,
        )
    }

    pub fn tiles(&self) -> &TileSet {
        &self.tiles
    }

    pub fn hl_rules(&self) -> &StochasticRules {
        &self.hl_rules
    }

    /// Replace the high-level rule set. The new set must already be
    /// validated; the previous set stays active on error paths upstream.
    pub fn set_hl_rules(&mut self, rules: StochasticRules) {
        self.hl_rules = rules;
    }

    pub fn modules(&self) -> &[LsModule] {
        &self.modules
    }

    /// Names of modules currently participating in variation.
    pub fn active_modules(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| m.active)
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Flip a module's mutability. Returns false for unknown names.
    pub fn toggle_module(&mut self, name: &str) -> bool {
        match self.modules.iter_mut().find(|m| m.name == name) {
            Some(module) => {
                module.active = !module.active;
                true
            }
            None => false,
        }
    }

    /// Expand the axiom into a fresh tile-level genotype.
    pub fn generate_genotype(&self, rng: &mut StdRng) -> Result<String, GrammarError> {
        expand_high_level(&self.axiom, &self.hl_rules, &self.expansion, rng)
    }

    /// Re-expand a genotype (a no-op fixed point for tile-only strings).
    pub fn expand_genotype(&self, genotype: &str, rng: &mut StdRng) -> Result<String, GrammarError> {
        expand_high_level(genotype, &self.hl_rules, &self.expansion, rng)
    }

    /// Lower a tile-level genotype all the way to a block placement string.
    pub fn derive(&self, genotype: &str, rng: &mut StdRng) -> Result<String, GrammarError> {
        let translator = Translator::new(&self.tiles);
        let mid = translator.transform(genotype)?;
        expand_low_level(&mid, &self.ll_rules, rng)
    }

    /// Materialize a genotype into a voxel structure.
    pub fn materialize(&self, genotype: &str, rng: &mut StdRng) -> Result<(String, Structure), GrammarError> {
        let ll_string = self.derive(genotype, rng)?;
        let structure = Structure::from_ll_string(&ll_string)?;
        Ok((ll_string, structure))
    }
}
