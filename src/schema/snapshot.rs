//! Serialized forms of candidates and bin populations.
//!
//! These types are the stable exchange surface for UI and persistence
//! collaborators: everything needed to rebuild a candidate (genotype,
//! derived string, cached scores) without re-running the grammar.

use serde::{Deserialize, Serialize};

/// A candidate solution in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    /// High-level symbolic string; the candidate's identity.
    pub genotype: String,
    /// Fully expanded low-level placement string.
    pub ll_string: String,
    /// Raw score per configured fitness function.
    pub fitnesses: Vec<f64>,
    /// Weighted-sum aggregate fitness.
    pub aggregate: f64,
    /// Constraint satisfaction in [0, 1]; 1 means feasible.
    pub feasibility: f64,
    /// Whether the candidate satisfies all hard constraints.
    pub is_feasible: bool,
    /// Cached value per configured behavior descriptor.
    pub behaviors: Vec<f64>,
    /// Generations survived.
    pub age: usize,
    /// Parent genotype strings.
    pub parents: Vec<String>,
}

/// One bin's populations in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSnapshot {
    /// (row, column) index into the archive grid.
    pub idx: (usize, usize),
    pub feasible: Vec<CandidateSnapshot>,
    pub infeasible: Vec<CandidateSnapshot>,
}

/// A population-only snapshot: the ships without the archive config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub bins: Vec<BinSnapshot>,
}

impl PopulationSnapshot {
    /// Total number of stored candidates across all bins.
    pub fn len(&self) -> usize {
        self.bins
            .iter()
            .map(|b| b.feasible.len() + b.infeasible.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> CandidateSnapshot {
        CandidateSnapshot {
            genotype: "cockpit(1)corridorsimple(2)".to_string(),
            ll_string: "bridgeblock!(2)armorblock!(2)".to_string(),
            fitnesses: vec![0.5, 0.25],
            aggregate: 0.75,
            feasibility: 1.0,
            is_feasible: true,
            behaviors: vec![1.5, 2.0, 0.8, 0.4],
            age: 2,
            parents: vec!["begin".to_string()],
        }
    }

    #[test]
    fn test_candidate_roundtrip() {
        let snapshot = sample_candidate();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CandidateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_population_len() {
        let population = PopulationSnapshot {
            bins: vec![
                BinSnapshot {
                    idx: (0, 0),
                    feasible: vec![sample_candidate()],
                    infeasible: vec![],
                },
                BinSnapshot {
                    idx: (1, 2),
                    feasible: vec![],
                    infeasible: vec![sample_candidate(), sample_candidate()],
                },
            ],
        };
        assert_eq!(population.len(), 3);
        assert!(!population.is_empty());
    }
}
