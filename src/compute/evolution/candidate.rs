//! Candidate solutions: the genotype/phenotype pairing.

use rand::rngs::StdRng;

use crate::compute::grammar::{GrammarError, LSystem};
use crate::compute::structure::Structure;
use crate::schema::snapshot::CandidateSnapshot;

/// A candidate spaceship: a symbolic genotype plus its materialized
/// structure and cached scores.
///
/// The genotype string is the candidate's identity. The structure is
/// owned exclusively by the candidate and materialized lazily; cached
/// fitness and behavior values survive serialization so a reloaded
/// archive never has to re-run the grammar.
#[derive(Debug, Clone)]
pub struct CandidateSolution {
    genotype: String,
    ll_string: Option<String>,
    structure: Option<Structure>,
    /// Raw score per configured fitness function.
    pub fitnesses: Vec<f64>,
    /// Weighted-sum aggregate fitness.
    pub aggregate: f64,
    /// Constraint satisfaction in [0, 1]; 1 means feasible.
    pub feasibility: f64,
    pub is_feasible: bool,
    /// Cached value per configured behavior descriptor.
    pub behaviors: Vec<f64>,
    /// Generations survived.
    pub age: usize,
    /// Parent genotype strings.
    pub parents: Vec<String>,
}

impl CandidateSolution {
    /// Create an unscored candidate from a genotype string.
    pub fn new(genotype: impl Into<String>) -> Self {
        Self {
            genotype: genotype.into(),
            ll_string: None,
            structure: None,
            fitnesses: Vec::new(),
            aggregate: 0.0,
            feasibility: 0.0,
            is_feasible: false,
            behaviors: Vec::new(),
            age: 0,
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<String>) -> Self {
        self.parents = parents;
        self
    }

    /// The genotype string; stable identity and grammar input.
    pub fn genotype(&self) -> &str {
        &self.genotype
    }

    /// The derived low-level string, if materialized.
    pub fn ll_string(&self) -> Option<&str> {
        self.ll_string.as_deref()
    }

    /// The materialized structure, if any.
    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    /// Materialize the structure, deriving it on first use.
    ///
    /// A candidate restored from a snapshot rebuilds from its cached
    /// low-level string, which is deterministic; only a fresh candidate
    /// consults the (stochastic) grammar.
    pub fn materialize(
        &mut self,
        lsystem: &LSystem,
        rng: &mut StdRng,
    ) -> Result<&Structure, GrammarError> {
        if self.structure.is_none() {
            let ll_string = match &self.ll_string {
                Some(cached) => cached.clone(),
                None => {
                    let derived = lsystem.derive(&self.genotype, rng)?;
                    self.ll_string = Some(derived.clone());
                    derived
                }
            };
            self.structure = Some(Structure::from_ll_string(&ll_string)?);
        }
        Ok(self.structure.as_ref().unwrap())
    }

    /// Number of placed blocks, 0 if unmaterialized.
    pub fn n_blocks(&self) -> usize {
        self.structure.as_ref().map_or(0, Structure::n_blocks)
    }

    /// Occupied voxel volume, 0 if unmaterialized.
    pub fn volume(&self) -> usize {
        self.structure.as_ref().map_or(0, Structure::volume)
    }

    /// Total block mass, 0 if unmaterialized.
    pub fn mass(&self) -> f64 {
        self.structure.as_ref().map_or(0.0, Structure::mass)
    }

    /// Bounding-box extents, zeroed if unmaterialized.
    pub fn size(&self) -> [i64; 3] {
        self.structure.as_ref().map_or([0, 0, 0], Structure::max_dims)
    }

    /// The fitness used for ranking within a bin population: aggregate
    /// for feasible candidates, constraint closeness for infeasible.
    pub fn rank_fitness(&self) -> f64 {
        if self.is_feasible {
            self.aggregate
        } else {
            self.feasibility
        }
    }

    /// Survive one more generation.
    pub fn age_up(&mut self) {
        self.age += 1;
    }

    /// Serialized form for snapshots.
    pub fn to_snapshot(&self) -> CandidateSnapshot {
        CandidateSnapshot {
            genotype: self.genotype.clone(),
            ll_string: self.ll_string.clone().unwrap_or_default(),
            fitnesses: self.fitnesses.clone(),
            aggregate: self.aggregate,
            feasibility: self.feasibility,
            is_feasible: self.is_feasible,
            behaviors: self.behaviors.clone(),
            age: self.age,
            parents: self.parents.clone(),
        }
    }

    /// Rebuild from a snapshot; the structure stays lazy.
    pub fn from_snapshot(snapshot: CandidateSnapshot) -> Self {
        Self {
            genotype: snapshot.genotype,
            ll_string: (!snapshot.ll_string.is_empty()).then_some(snapshot.ll_string),
            structure: None,
            fitnesses: snapshot.fitnesses,
            aggregate: snapshot.aggregate,
            feasibility: snapshot.feasibility,
            is_feasible: snapshot.is_feasible,
            behaviors: snapshot.behaviors,
            age: snapshot.age,
            parents: snapshot.parents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::config::ExpansionConfig;
    use rand::SeedableRng;

    #[test]
    fn test_materialize_is_lazy_and_cached() {
        let lsystem = LSystem::spaceship(ExpansionConfig::default());
        let mut rng = StdRng::seed_from_u64(9);
        let genotype = lsystem.generate_genotype(&mut rng).unwrap();

        let mut candidate = CandidateSolution::new(genotype);
        assert!(candidate.structure().is_none());
        assert_eq!(candidate.n_blocks(), 0);

        candidate.materialize(&lsystem, &mut rng).unwrap();
        let blocks = candidate.n_blocks();
        assert!(blocks > 0);

        // Second call reuses the cached structure.
        candidate.materialize(&lsystem, &mut rng).unwrap();
        assert_eq!(candidate.n_blocks(), blocks);
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_caches() {
        let lsystem = LSystem::spaceship(ExpansionConfig::default());
        let mut rng = StdRng::seed_from_u64(21);
        let genotype = lsystem.generate_genotype(&mut rng).unwrap();

        let mut candidate = CandidateSolution::new(genotype).with_parents(vec!["begin".into()]);
        candidate.materialize(&lsystem, &mut rng).unwrap();
        candidate.aggregate = 1.25;
        candidate.behaviors = vec![2.0, 3.0];
        candidate.age = 4;

        let volume = candidate.volume();
        let snapshot = candidate.to_snapshot();
        let mut restored = CandidateSolution::from_snapshot(snapshot);

        assert_eq!(restored.genotype(), candidate.genotype());
        assert_eq!(restored.aggregate, 1.25);
        assert_eq!(restored.age, 4);

        // Rebuilding from the cached low-level string reproduces the
        // identical structure without touching the grammar.
        restored.materialize(&lsystem, &mut rng).unwrap();
        assert_eq!(restored.volume(), volume);
    }

    #[test]
    fn test_rank_fitness_switches_on_feasibility() {
        let mut candidate = CandidateSolution::new("cockpit(1)");
        candidate.aggregate = 2.0;
        candidate.feasibility = 0.5;
        candidate.is_feasible = false;
        assert_eq!(candidate.rank_fitness(), 0.5);
        candidate.is_feasible = true;
        assert_eq!(candidate.rank_fitness(), 2.0);
    }
}
