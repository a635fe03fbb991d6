//! Behavior descriptors and the archive's bin machinery.
//!
//! Descriptor values map to grid cells through right-open intervals
//! over cumulative bin-width boundaries. Out-of-domain values clamp to
//! the nearest edge bin; this lenient policy is deliberate, because
//! interactive descriptor swaps can transiently observe values outside
//! the configured bounds.

use serde::{Deserialize, Serialize};

use crate::compute::structure::Structure;

use super::candidate::CandidateSolution;

/// A measurable behavior characteristic of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorMetric {
    /// Major/medium principal axis ratio.
    MajorMedium,
    /// Major/minor principal axis ratio.
    MajorMinor,
    /// Best mirror-symmetry score.
    Symmetry,
    /// Occupied fraction of the bounding box.
    Filling,
}

impl BehaviorMetric {
    pub fn compute(&self, structure: &Structure) -> f64 {
        match self {
            BehaviorMetric::MajorMedium => structure.mame(),
            BehaviorMetric::MajorMinor => structure.mami(),
            BehaviorMetric::Symmetry => structure.symmetry(),
            BehaviorMetric::Filling => structure.filling(),
        }
    }
}

/// A named, bounded behavior descriptor defining one archive axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDescriptor {
    pub name: String,
    pub metric: BehaviorMetric,
    /// Inclusive domain bounds.
    pub bounds: (f64, f64),
}

impl BehaviorDescriptor {
    pub fn new(name: impl Into<String>, metric: BehaviorMetric, bounds: (f64, f64)) -> Self {
        Self {
            name: name.into(),
            metric,
            bounds,
        }
    }

    pub fn compute(&self, structure: &Structure) -> f64 {
        self.metric.compute(structure)
    }

    /// The default descriptor registry for spaceship hulls.
    pub fn defaults() -> Vec<BehaviorDescriptor> {
        vec![
            BehaviorDescriptor::new("major-medium", BehaviorMetric::MajorMedium, (1.0, 6.0)),
            BehaviorDescriptor::new("major-minor", BehaviorMetric::MajorMinor, (1.0, 12.0)),
            BehaviorDescriptor::new("symmetry", BehaviorMetric::Symmetry, (0.0, 1.0)),
            BehaviorDescriptor::new("filling", BehaviorMetric::Filling, (0.0, 1.0)),
        ]
    }
}

/// Lower bin edges from a domain start and per-bin widths.
pub fn boundaries_from_widths(lo: f64, widths: &[f64]) -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(widths.len());
    let mut edge = lo;
    for width in widths {
        boundaries.push(edge);
        edge += width;
    }
    boundaries
}

/// Map a descriptor value to a bin index over cumulative boundaries.
///
/// Intervals are right-open: a value equal to a boundary belongs to the
/// bin above it. Values below the domain clamp to bin 0; values at or
/// beyond the top clamp to the last bin.
pub fn digitize(value: f64, boundaries: &[f64]) -> usize {
    debug_assert!(!boundaries.is_empty());
    let above = boundaries.iter().filter(|b| value >= **b).count();
    above.saturating_sub(1).min(boundaries.len() - 1)
}

/// Split the bin at `idx` into two equal halves, in place.
///
/// Edge-preserving uniform split: the two children partition the parent
/// width exactly, so total bounds coverage is unchanged. Widths only
/// ever gain entries; bins are refined, never coarsened.
pub fn subdivide_widths(widths: &mut Vec<f64>, idx: usize) {
    let half = widths[idx] / 2.0;
    widths[idx] = half;
    widths.insert(idx + 1, half);
}

/// Which bin metric to read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinMetric {
    Fitness,
    Age,
    Coverage,
}

/// One cell of the archive grid: bounds plus the two populations.
#[derive(Debug, Clone, Default)]
pub struct MapBin {
    /// (row, column) into the archive grid.
    pub idx: (usize, usize),
    /// Inclusive value bounds per axis.
    pub bounds: ((f64, f64), (f64, f64)),
    pub feasible: Vec<CandidateSolution>,
    pub infeasible: Vec<CandidateSolution>,
}

impl MapBin {
    pub fn new(idx: (usize, usize), bounds: ((f64, f64), (f64, f64))) -> Self {
        Self {
            idx,
            bounds,
            feasible: Vec::new(),
            infeasible: Vec::new(),
        }
    }

    /// Insert a candidate into the matching population, enforcing the
    /// population cap. Returns the evicted candidate, if any.
    ///
    /// Eviction removes the worst rank fitness; ties evict the oldest.
    pub fn insert(&mut self, candidate: CandidateSolution, cap: usize) -> Option<CandidateSolution> {
        let population = if candidate.is_feasible {
            &mut self.feasible
        } else {
            &mut self.infeasible
        };
        population.push(candidate);
        if population.len() <= cap {
            return None;
        }
        let worst = population
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.rank_fitness()
                    .partial_cmp(&b.rank_fitness())
                    .unwrap()
                    .then(b.age.cmp(&a.age))
            })
            .map(|(i, _)| i)
            .unwrap();
        Some(population.swap_remove(worst))
    }

    pub fn population(&self, feasible: bool) -> &[CandidateSolution] {
        if feasible { &self.feasible } else { &self.infeasible }
    }

    pub fn non_empty(&self, feasible: bool) -> bool {
        !self.population(feasible).is_empty()
    }

    /// The best-fitness candidate of a population.
    pub fn elite(&self, feasible: bool) -> Option<&CandidateSolution> {
        self.population(feasible)
            .iter()
            .max_by(|a, b| a.rank_fitness().partial_cmp(&b.rank_fitness()).unwrap())
    }

    /// Metric readout over a population, elite-only or population mean.
    pub fn get_metric(&self, metric: BinMetric, use_mean: bool, feasible: bool) -> f64 {
        let population = self.population(feasible);
        if population.is_empty() {
            return 0.0;
        }
        match metric {
            BinMetric::Coverage => population.len() as f64,
            BinMetric::Fitness => {
                if use_mean {
                    population.iter().map(CandidateSolution::rank_fitness).sum::<f64>()
                        / population.len() as f64
                } else {
                    self.elite(feasible).map_or(0.0, CandidateSolution::rank_fitness)
                }
            }
            BinMetric::Age => {
                if use_mean {
                    population.iter().map(|c| c.age as f64).sum::<f64>()
                        / population.len() as f64
                } else {
                    self.elite(feasible).map_or(0.0, |c| c.age as f64)
                }
            }
        }
    }

    /// Age both populations by one generation.
    pub fn age_population(&mut self) {
        for candidate in self.feasible.iter_mut().chain(self.infeasible.iter_mut()) {
            candidate.age_up();
        }
    }

    /// Remove candidates older than `max_age`. Returns how many fell.
    pub fn evict_older_than(&mut self, max_age: usize) -> usize {
        let before = self.feasible.len() + self.infeasible.len();
        self.feasible.retain(|c| c.age <= max_age);
        self.infeasible.retain(|c| c.age <= max_age);
        before - (self.feasible.len() + self.infeasible.len())
    }

    /// Drain every candidate, leaving the bin empty.
    pub fn drain(&mut self) -> Vec<CandidateSolution> {
        let mut all = std::mem::take(&mut self.feasible);
        all.append(&mut self.infeasible);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scored(genotype: &str, aggregate: f64, age: usize, feasible: bool) -> CandidateSolution {
        let mut candidate = CandidateSolution::new(genotype);
        candidate.aggregate = aggregate;
        candidate.feasibility = aggregate;
        candidate.is_feasible = feasible;
        candidate.age = age;
        candidate
    }

    #[test]
    fn test_digitize_right_open_intervals() {
        // Bins: [0, 2), [2, 4), [4, 6), [6, 8), [8, 10).
        let boundaries = boundaries_from_widths(0.0, &[2.0; 5]);
        assert_eq!(digitize(0.0, &boundaries), 0);
        assert_eq!(digitize(1.99, &boundaries), 0);
        // A value on a boundary belongs to the bin above.
        assert_eq!(digitize(2.0, &boundaries), 1);
        assert_eq!(digitize(9.5, &boundaries), 4);
    }

    #[test]
    fn test_digitize_clamps_out_of_domain() {
        let boundaries = boundaries_from_widths(0.0, &[2.0; 5]);
        assert_eq!(digitize(-3.0, &boundaries), 0);
        assert_eq!(digitize(10.0, &boundaries), 4);
        assert_eq!(digitize(1e9, &boundaries), 4);
    }

    #[test]
    fn test_subdivide_halves_width() {
        // 5 uniform bins over [0, 10]; splitting bin 0 yields two bins
        // of half the original width that sum to it.
        let mut widths = vec![2.0; 5];
        subdivide_widths(&mut widths, 0);
        assert_eq!(widths.len(), 6);
        assert_eq!(widths[0], 1.0);
        assert_eq!(widths[1], 1.0);
        assert_eq!(widths[0] + widths[1], 2.0);
        let total: f64 = widths.iter().sum();
        assert!((total - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_insert_respects_cap_and_evicts_worst() {
        let mut bin = MapBin::new((0, 0), ((0.0, 1.0), (0.0, 1.0)));
        bin.insert(scored("a", 0.9, 0, true), 3);
        bin.insert(scored("b", 0.1, 0, true), 3);
        bin.insert(scored("c", 0.7, 0, true), 3);
        let evicted = bin.insert(scored("d", 0.5, 0, true), 3);
        assert_eq!(evicted.unwrap().genotype(), "b");
        assert_eq!(bin.feasible.len(), 3);
        // Everyone left outranks the evicted candidate.
        assert!(bin.feasible.iter().all(|c| c.rank_fitness() >= 0.1));
    }

    #[test]
    fn test_eviction_tie_breaks_on_age() {
        let mut bin = MapBin::new((0, 0), ((0.0, 1.0), (0.0, 1.0)));
        bin.insert(scored("young", 0.5, 1, true), 2);
        bin.insert(scored("old", 0.5, 7, true), 2);
        let evicted = bin.insert(scored("new", 0.9, 0, true), 2);
        assert_eq!(evicted.unwrap().genotype(), "old");
    }

    #[test]
    fn test_populations_are_separate() {
        let mut bin = MapBin::new((0, 0), ((0.0, 1.0), (0.0, 1.0)));
        bin.insert(scored("f", 0.5, 0, true), 1);
        bin.insert(scored("i", 0.5, 0, false), 1);
        assert_eq!(bin.feasible.len(), 1);
        assert_eq!(bin.infeasible.len(), 1);
        assert!(bin.non_empty(true));
        assert!(bin.non_empty(false));
    }

    #[test]
    fn test_metrics() {
        let mut bin = MapBin::new((0, 0), ((0.0, 1.0), (0.0, 1.0)));
        bin.insert(scored("a", 0.2, 2, true), 10);
        bin.insert(scored("b", 0.8, 4, true), 10);
        assert_eq!(bin.get_metric(BinMetric::Coverage, false, true), 2.0);
        assert_eq!(bin.get_metric(BinMetric::Fitness, false, true), 0.8);
        assert!((bin.get_metric(BinMetric::Fitness, true, true) - 0.5).abs() < 1e-9);
        assert_eq!(bin.get_metric(BinMetric::Age, false, true), 4.0);
        assert!((bin.get_metric(BinMetric::Age, true, true) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_age_and_evict() {
        let mut bin = MapBin::new((0, 0), ((0.0, 1.0), (0.0, 1.0)));
        bin.insert(scored("a", 0.5, 4, true), 10);
        bin.insert(scored("b", 0.5, 0, false), 10);
        bin.age_population();
        assert_eq!(bin.evict_older_than(4), 1);
        assert!(bin.feasible.is_empty());
        assert_eq!(bin.infeasible.len(), 1);
    }

    proptest! {
        /// Subdivision preserves total width coverage exactly: the
        /// children partition the parent with no gap and no overlap.
        #[test]
        fn prop_subdivision_preserves_coverage(
            widths in proptest::collection::vec(0.1f64..10.0, 1..10),
            idx_seed in 0usize..100,
        ) {
            let mut widths = widths;
            let idx = idx_seed % widths.len();
            let parent = widths[idx];
            let total_before: f64 = widths.iter().sum();
            subdivide_widths(&mut widths, idx);
            let total_after: f64 = widths.iter().sum();
            prop_assert!((total_before - total_after).abs() < 1e-9);
            prop_assert!((widths[idx] + widths[idx + 1] - parent).abs() < 1e-12);
        }

        /// Every value lands in exactly one bin, and boundary values
        /// land in the bin above.
        #[test]
        fn prop_digitize_total(value in -5.0f64..25.0) {
            let boundaries = boundaries_from_widths(0.0, &[2.0; 5]);
            let idx = digitize(value, &boundaries);
            prop_assert!(idx < 5);
        }
    }
}
