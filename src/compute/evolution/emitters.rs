//! Emitters: pluggable bin-selection and offspring-proposal strategies.
//!
//! An emitter is a tagged variant with a fixed operation set
//! (`select_bins`, `propose_offspring`, `update_from_feedback`);
//! switching strategies is an explicit state transition on the archive.
//! Preference-learning variants serialize their learned state into the
//! archive snapshot.

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use crate::compute::grammar::GrammarError;

use super::candidate::CandidateSolution;
use super::genome::VariationOps;

/// Per-axis resolution of the normalized context grid used by the
/// contextual bandit. Fixed, so learned state survives subdivision.
const CONTEXT_RESOLUTION: usize = 4;

/// Summary of a selectable bin handed to emitters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinInfo {
    pub idx: (usize, usize),
    /// Bin center normalized to [0, 1]^2 over the descriptor domain.
    pub center: (f64, f64),
    /// Best feasible fitness currently in the bin.
    pub elite_fitness: f64,
}

/// Learned weight for one grid cell of the preference matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreferenceCell {
    pub idx: (usize, usize),
    pub weight: f64,
}

/// Beta posterior for one bin of the preference bandit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BanditArm {
    pub idx: (usize, usize),
    pub successes: f64,
    pub failures: f64,
}

/// Pull statistics for one context cell of the contextual bandit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextCell {
    pub pulls: f64,
    pub reward: f64,
}

/// The bin-selection strategy driving a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy")]
pub enum Emitter {
    /// Uniform draw among valid bins.
    Random,
    /// Favor the top-K bins by current elite fitness.
    Greedy { top_k: usize },
    /// Bins are supplied externally by the human in the loop.
    Human,
    /// Decaying per-bin preference counts learned from selections.
    PreferenceMatrix {
        decay: f64,
        cells: Vec<PreferenceCell>,
    },
    /// Thompson sampling over per-bin Beta posteriors.
    PreferenceBandit { arms: Vec<BanditArm> },
    /// UCB1 over a fixed context grid in normalized descriptor space.
    ContextualBandit {
        exploration: f64,
        cells: Vec<ContextCell>,
    },
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter::Random
    }
}

impl Emitter {
    pub fn greedy(top_k: usize) -> Self {
        Emitter::Greedy { top_k }
    }

    pub fn preference_matrix(decay: f64) -> Self {
        Emitter::PreferenceMatrix {
            decay,
            cells: Vec::new(),
        }
    }

    pub fn preference_bandit() -> Self {
        Emitter::PreferenceBandit { arms: Vec::new() }
    }

    pub fn contextual_bandit(exploration: f64) -> Self {
        Emitter::ContextualBandit {
            exploration,
            cells: vec![ContextCell::default(); CONTEXT_RESOLUTION * CONTEXT_RESOLUTION],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Emitter::Random => "random",
            Emitter::Greedy { .. } => "greedy",
            Emitter::Human => "human",
            Emitter::PreferenceMatrix { .. } => "preference-matrix",
            Emitter::PreferenceBandit { .. } => "preference-bandit",
            Emitter::ContextualBandit { .. } => "contextual-bandit",
        }
    }

    /// Pick up to `n` distinct bins to improve this step.
    ///
    /// The human emitter never self-selects; its bins arrive through
    /// the interactive step.
    pub fn select_bins(
        &mut self,
        valid: &[BinInfo],
        n: usize,
        rng: &mut StdRng,
    ) -> Vec<(usize, usize)> {
        if valid.is_empty() || n == 0 {
            return Vec::new();
        }
        match self {
            Emitter::Human => Vec::new(),
            Emitter::Random => {
                let mut pool: Vec<&BinInfo> = valid.iter().collect();
                pool.shuffle(rng);
                pool.into_iter().take(n).map(|b| b.idx).collect()
            }
            Emitter::Greedy { top_k } => {
                let mut ranked: Vec<&BinInfo> = valid.iter().collect();
                ranked.sort_by(|a, b| b.elite_fitness.partial_cmp(&a.elite_fitness).unwrap());
                let k = (*top_k).max(n).min(ranked.len());
                let mut pool = ranked[..k].to_vec();
                pool.shuffle(rng);
                pool.into_iter().take(n).map(|b| b.idx).collect()
            }
            Emitter::PreferenceMatrix { cells, .. } => {
                let weight_of = |idx: (usize, usize)| {
                    1.0 + cells
                        .iter()
                        .find(|c| c.idx == idx)
                        .map_or(0.0, |c| c.weight)
                };
                let mut pool: Vec<&BinInfo> = valid.iter().collect();
                let mut picked = Vec::new();
                while picked.len() < n && !pool.is_empty() {
                    let total: f64 = pool.iter().map(|b| weight_of(b.idx)).sum();
                    let mut target = rng.gen_range(0.0..total);
                    let mut chosen = pool.len() - 1;
                    for (i, info) in pool.iter().enumerate() {
                        target -= weight_of(info.idx);
                        if target < 0.0 {
                            chosen = i;
                            break;
                        }
                    }
                    picked.push(pool.swap_remove(chosen).idx);
                }
                picked
            }
            Emitter::PreferenceBandit { arms } => {
                let mut draws: Vec<((usize, usize), f64)> = valid
                    .iter()
                    .map(|info| {
                        let (s, f) = arms
                            .iter()
                            .find(|a| a.idx == info.idx)
                            .map_or((0.0, 0.0), |a| (a.successes, a.failures));
                        let sample = Beta::new(s + 1.0, f + 1.0)
                            .map(|d| d.sample(rng))
                            .unwrap_or(0.5);
                        (info.idx, sample)
                    })
                    .collect();
                draws.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
                draws.into_iter().take(n).map(|(idx, _)| idx).collect()
            }
            Emitter::ContextualBandit { exploration, cells } => {
                let total_pulls: f64 = cells.iter().map(|c| c.pulls).sum();
                let mut pool: Vec<&BinInfo> = valid.iter().collect();
                pool.shuffle(rng);
                let mut scored: Vec<(&BinInfo, f64)> = pool
                    .into_iter()
                    .map(|info| {
                        let cell = &cells[context_index(info.center)];
                        let score = if cell.pulls == 0.0 {
                            f64::INFINITY
                        } else {
                            cell.reward / cell.pulls
                                + *exploration
                                    * (2.0 * total_pulls.max(1.0).ln() / cell.pulls).sqrt()
                        };
                        (info, score)
                    })
                    .collect();
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
                scored.into_iter().take(n).map(|(info, _)| info.idx).collect()
            }
        }
    }

    /// Learn from a round of (typically human) bin selections.
    ///
    /// Valid-but-unselected bins count as negative evidence for the
    /// bandit variants, which drives convergence toward consistently
    /// preferred regions.
    pub fn update_from_feedback(&mut self, selected: &[(usize, usize)], valid: &[BinInfo]) {
        match self {
            Emitter::Random | Emitter::Greedy { .. } | Emitter::Human => {}
            Emitter::PreferenceMatrix { decay, cells } => {
                for cell in cells.iter_mut() {
                    cell.weight *= *decay;
                }
                for idx in selected {
                    match cells.iter_mut().find(|c| c.idx == *idx) {
                        Some(cell) => cell.weight += 1.0,
                        None => cells.push(PreferenceCell {
                            idx: *idx,
                            weight: 1.0,
                        }),
                    }
                }
            }
            Emitter::PreferenceBandit { arms } => {
                for info in valid {
                    let hit = selected.contains(&info.idx);
                    match arms.iter_mut().find(|a| a.idx == info.idx) {
                        Some(arm) => {
                            if hit {
                                arm.successes += 1.0;
                            } else {
                                arm.failures += 1.0;
                            }
                        }
                        None => arms.push(BanditArm {
                            idx: info.idx,
                            successes: if hit { 1.0 } else { 0.0 },
                            failures: if hit { 0.0 } else { 1.0 },
                        }),
                    }
                }
            }
            Emitter::ContextualBandit { cells, .. } => {
                for info in valid {
                    let cell = &mut cells[context_index(info.center)];
                    cell.pulls += 1.0;
                    if selected.contains(&info.idx) {
                        cell.reward += 1.0;
                    }
                }
            }
        }
    }

    /// Forget bin-indexed state after rebinning or subdivision.
    ///
    /// The contextual bandit keys on normalized descriptor space, so
    /// its statistics survive grid changes.
    pub fn note_grid_changed(&mut self) {
        match self {
            Emitter::PreferenceMatrix { cells, .. } => cells.clear(),
            Emitter::PreferenceBandit { arms } => arms.clear(),
            _ => {}
        }
    }

    /// Produce offspring genotypes from the selected parents.
    ///
    /// The greedy emitter refines the single best parent by mutation;
    /// every other variant crosses random parent pairs before mutating.
    pub fn propose_offspring(
        &self,
        parents: &[&CandidateSolution],
        ops: &mut VariationOps,
        count: usize,
    ) -> Result<Vec<String>, GrammarError> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let mut offspring = Vec::with_capacity(count);
        match self {
            Emitter::Greedy { .. } => {
                let best = parents
                    .iter()
                    .max_by(|a, b| a.rank_fitness().partial_cmp(&b.rank_fitness()).unwrap())
                    .unwrap();
                for _ in 0..count {
                    offspring.push(ops.mutate(best.genotype())?);
                }
            }
            _ => {
                for _ in 0..count {
                    let a = parents[ops.rng.gen_range(0..parents.len())];
                    let genotype = if parents.len() >= 2
                        && ops.rng.r#gen::<f64>() < ops.config.crossover_rate
                    {
                        let b = parents[ops.rng.gen_range(0..parents.len())];
                        ops.crossover(a.genotype(), b.genotype())?
                    } else {
                        a.genotype().to_string()
                    };
                    offspring.push(ops.mutate(&genotype)?);
                }
            }
        }
        Ok(offspring)
    }
}

/// Flattened context-grid index of a normalized bin center.
fn context_index(center: (f64, f64)) -> usize {
    let clamp = |v: f64| {
        ((v.clamp(0.0, 1.0) * CONTEXT_RESOLUTION as f64) as usize).min(CONTEXT_RESOLUTION - 1)
    };
    clamp(center.0) * CONTEXT_RESOLUTION + clamp(center.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(99)
    }

    fn valid_bins() -> Vec<BinInfo> {
        vec![
            BinInfo {
                idx: (0, 0),
                center: (0.1, 0.1),
                elite_fitness: 0.2,
            },
            BinInfo {
                idx: (1, 1),
                center: (0.3, 0.3),
                elite_fitness: 0.9,
            },
            BinInfo {
                idx: (2, 2),
                center: (0.5, 0.5),
                elite_fitness: 0.5,
            },
            BinInfo {
                idx: (3, 3),
                center: (0.9, 0.9),
                elite_fitness: 0.1,
            },
        ]
    }

    #[test]
    fn test_random_selects_distinct_valid_bins() {
        let mut emitter = Emitter::Random;
        let mut rng = rng();
        let bins = valid_bins();
        let selected = emitter.select_bins(&bins, 2, &mut rng);
        assert_eq!(selected.len(), 2);
        assert_ne!(selected[0], selected[1]);
        for idx in &selected {
            assert!(bins.iter().any(|b| b.idx == *idx));
        }
    }

    #[test]
    fn test_random_caps_at_valid_count() {
        let mut emitter = Emitter::Random;
        let selected = emitter.select_bins(&valid_bins(), 10, &mut rng());
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn test_human_never_self_selects() {
        let mut emitter = Emitter::Human;
        assert!(emitter.select_bins(&valid_bins(), 3, &mut rng()).is_empty());
    }

    #[test]
    fn test_greedy_stays_in_top_k() {
        let mut emitter = Emitter::greedy(2);
        let mut rng = rng();
        for _ in 0..50 {
            let selected = emitter.select_bins(&valid_bins(), 1, &mut rng);
            // Top 2 by elite fitness are (1,1) and (2,2).
            assert!(selected[0] == (1, 1) || selected[0] == (2, 2));
        }
    }

    #[test]
    fn test_preference_matrix_biases_toward_feedback() {
        let mut emitter = Emitter::preference_matrix(0.9);
        let bins = valid_bins();
        for _ in 0..30 {
            emitter.update_from_feedback(&[(3, 3)], &bins);
        }
        let mut rng = rng();
        let hits = (0..200)
            .filter(|_| emitter.select_bins(&bins, 1, &mut rng)[0] == (3, 3))
            .count();
        assert!(hits > 120, "only {hits}/200 selections hit the preferred bin");
    }

    #[test]
    fn test_preference_bandit_converges_to_preferred_bin() {
        let mut emitter = Emitter::preference_bandit();
        let bins = valid_bins();
        for _ in 0..50 {
            emitter.update_from_feedback(&[(0, 0)], &bins);
        }
        let mut rng = rng();
        let hits = (0..100)
            .filter(|_| emitter.select_bins(&bins, 1, &mut rng)[0] == (0, 0))
            .count();
        assert!(hits > 90, "only {hits}/100 selections hit the preferred bin");
    }

    #[test]
    fn test_contextual_bandit_prefers_unexplored_then_rewarded() {
        let mut emitter = Emitter::contextual_bandit(1.0);
        let bins = valid_bins();
        let mut rng = rng();
        // All cells unexplored: any valid bin may come back.
        assert_eq!(emitter.select_bins(&bins, 1, &mut rng).len(), 1);

        for _ in 0..40 {
            emitter.update_from_feedback(&[(1, 1)], &bins);
        }
        let hits = (0..100)
            .filter(|_| emitter.select_bins(&bins, 1, &mut rng)[0] == (1, 1))
            .count();
        assert!(hits > 80, "only {hits}/100 selections hit the rewarded context");
    }

    #[test]
    fn test_contextual_bandit_state_survives_grid_change() {
        let mut emitter = Emitter::contextual_bandit(1.0);
        let bins = valid_bins();
        emitter.update_from_feedback(&[(1, 1)], &bins);
        let before = emitter.clone();
        emitter.note_grid_changed();
        assert_eq!(emitter, before);
    }

    #[test]
    fn test_bin_keyed_state_cleared_on_grid_change() {
        let bins = valid_bins();
        let mut matrix = Emitter::preference_matrix(0.9);
        matrix.update_from_feedback(&[(1, 1)], &bins);
        matrix.note_grid_changed();
        assert_eq!(matrix, Emitter::preference_matrix(0.9));

        let mut bandit = Emitter::preference_bandit();
        bandit.update_from_feedback(&[(1, 1)], &bins);
        bandit.note_grid_changed();
        assert_eq!(bandit, Emitter::preference_bandit());
    }

    #[test]
    fn test_emitter_serde_roundtrip_preserves_state() {
        let bins = valid_bins();
        let mut emitter = Emitter::preference_bandit();
        emitter.update_from_feedback(&[(0, 0)], &bins);
        let json = serde_json::to_string(&emitter).unwrap();
        let back: Emitter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, emitter);
        assert_eq!(back.name(), "preference-bandit");
    }
}
