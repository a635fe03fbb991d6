//! Fitness functions and hard constraints over materialized structures.

use serde::{Deserialize, Serialize};

use crate::compute::structure::Structure;
use crate::schema::tiles::BlockKind;

/// A deterministic scalar fitness function over a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitnessFunction {
    /// Occupied fraction of the bounding box.
    BoxFilling,
    /// Share of blocks that are functional rather than plating.
    FunctionalShare,
    /// Closeness of the major/medium axis ratio to an elongated hull.
    AxisBalance,
}

/// Target major/medium ratio for [`FitnessFunction::AxisBalance`].
const AXIS_BALANCE_TARGET: f64 = 2.0;

impl FitnessFunction {
    pub const ALL: [FitnessFunction; 3] = [
        FitnessFunction::BoxFilling,
        FitnessFunction::FunctionalShare,
        FitnessFunction::AxisBalance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FitnessFunction::BoxFilling => "box-filling",
            FitnessFunction::FunctionalShare => "functional-share",
            FitnessFunction::AxisBalance => "axis-balance",
        }
    }

    /// Inclusive output bounds.
    pub fn bounds(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    pub fn score(&self, structure: &Structure) -> f64 {
        match self {
            FitnessFunction::BoxFilling => structure.filling(),
            FitnessFunction::FunctionalShare => structure.functional_share(),
            FitnessFunction::AxisBalance => {
                let deviation = (structure.mame() - AXIS_BALANCE_TARGET).abs();
                (1.0 - deviation / AXIS_BALANCE_TARGET).max(0.0)
            }
        }
    }
}

/// Weighted-sum fitness evaluator.
///
/// Raw per-function scores are cached on candidates so reweighting only
/// has to recompute the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessEvaluator {
    functions: Vec<FitnessFunction>,
    weights: Vec<f64>,
}

impl FitnessEvaluator {
    pub fn new(functions: Vec<FitnessFunction>) -> Self {
        let weights = vec![1.0; functions.len()];
        Self { functions, weights }
    }

    pub fn functions(&self) -> &[FitnessFunction] {
        &self.functions
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Replace the weight vector. Extra entries are ignored, missing
    /// entries keep their current value.
    pub fn set_weights(&mut self, weights: &[f64]) {
        for (current, new) in self.weights.iter_mut().zip(weights) {
            *current = *new;
        }
    }

    /// Raw score per function.
    pub fn raw_scores(&self, structure: &Structure) -> Vec<f64> {
        self.functions.iter().map(|f| f.score(structure)).collect()
    }

    /// Weighted-sum aggregate from cached raw scores.
    pub fn aggregate(&self, raw: &[f64]) -> f64 {
        raw.iter()
            .zip(&self.weights)
            .map(|(score, weight)| score * weight)
            .sum()
    }

    /// Upper bound of the aggregate under current weights.
    pub fn max_aggregate(&self) -> f64 {
        self.functions
            .iter()
            .zip(&self.weights)
            .map(|(f, w)| f.bounds().1 * w)
            .sum()
    }
}

impl Default for FitnessEvaluator {
    fn default() -> Self {
        Self::new(FitnessFunction::ALL.to_vec())
    }
}

/// Outcome of checking a structure against the hard constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintReport {
    pub satisfied: usize,
    pub total: usize,
    /// Fraction of constraints satisfied, in [0, 1].
    pub score: f64,
    pub is_feasible: bool,
}

/// Check the hard feasibility constraints.
///
/// A ship is feasible when it has a bridge and an engine, placed no
/// block on top of another, and is at least three blocks large.
pub fn evaluate_constraints(structure: &Structure) -> ConstraintReport {
    let checks = [
        structure.has_kind(BlockKind::Bridge),
        structure.has_kind(BlockKind::Engine),
        structure.collisions() == 0,
        structure.n_blocks() >= 3,
    ];
    let satisfied = checks.iter().filter(|c| **c).count();
    let total = checks.len();
    ConstraintReport {
        satisfied,
        total,
        score: satisfied as f64 / total as f64,
        is_feasible: satisfied == total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ship(ll: &str) -> Structure {
        Structure::from_ll_string(ll).unwrap()
    }

    #[test]
    fn test_scores_within_bounds() {
        let structure = ship("bridgeblock!(2)armorblock!(2)engineblock");
        for f in FitnessFunction::ALL {
            let score = f.score(&structure);
            let (lo, hi) = f.bounds();
            assert!(score >= lo && score <= hi, "{} = {score}", f.name());
        }
    }

    #[test]
    fn test_aggregate_is_weighted_sum() {
        let mut evaluator = FitnessEvaluator::default();
        let raw = vec![0.5, 1.0, 0.25];
        assert!((evaluator.aggregate(&raw) - 1.75).abs() < 1e-9);

        evaluator.set_weights(&[0.0, 2.0, 1.0]);
        assert!((evaluator.aggregate(&raw) - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_set_weights_ignores_extra_entries() {
        let mut evaluator = FitnessEvaluator::default();
        evaluator.set_weights(&[0.5]);
        assert_eq!(evaluator.weights(), &[0.5, 1.0, 1.0]);
        evaluator.set_weights(&[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(evaluator.weights(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_max_aggregate_tracks_weights() {
        let mut evaluator = FitnessEvaluator::default();
        assert!((evaluator.max_aggregate() - 3.0).abs() < 1e-9);
        evaluator.set_weights(&[0.5, 0.5, 0.5]);
        assert!((evaluator.max_aggregate() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_complete_ship_is_feasible() {
        let report = evaluate_constraints(&ship("bridgeblock!(2)armorblock!(2)engineblock"));
        assert!(report.is_feasible);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_missing_engine_is_infeasible() {
        let report = evaluate_constraints(&ship("bridgeblock!(2)armorblock!(2)armorblock"));
        assert!(!report.is_feasible);
        assert_eq!(report.satisfied, 3);
        assert!((report.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_colliding_ship_is_infeasible() {
        let report = evaluate_constraints(&ship("bridgeblock!(1)armorblock!(2)engineblock"));
        assert!(!report.is_feasible);
    }

    #[test]
    fn test_empty_structure_scores_zero() {
        let report = evaluate_constraints(&ship(""));
        assert!(!report.is_feasible);
        assert_eq!(report.satisfied, 1); // only the collision check holds
    }
}
