//! The MAP-Elites archive and its interactive control loop.
//!
//! The archive owns the full grid of bins and, transitively, every
//! candidate solution. All stepping is single-threaded and synchronous:
//! a step runs to completion before returning, and long-running resets
//! report coarse progress through a caller-owned callback.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::compute::grammar::{GrammarError, LSystem};
use crate::schema::config::{ConfigError, EngineConfig};
use crate::schema::snapshot::{BinSnapshot, PopulationSnapshot};

use super::binning::{
    BehaviorDescriptor, MapBin, boundaries_from_widths, digitize, subdivide_widths,
};
use super::candidate::CandidateSolution;
use super::emitters::{BinInfo, Emitter};
use super::fitness::{FitnessEvaluator, evaluate_constraints};
use super::genome::VariationOps;

/// Archive-level failures. Structural invariant violations are
/// unrecoverable and surface immediately; selection and lookup errors
/// are recoverable by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Bin index ({0}, {1}) is outside the grid")]
    BinOutOfRange(usize, usize),
    #[error("Unknown behavior descriptor '{0}'")]
    UnknownDescriptor(String),
    #[error("Candidate has no cached behavior values")]
    UnscoredCandidate,
    #[error("Selected bins must be valid when single-bin selection is enforced")]
    InvalidSelection,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// What a single step accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub selected: Vec<(usize, usize)>,
    pub inserted: usize,
    pub age_evicted: usize,
}

/// Full serialized archive state: sufficient to reconstruct bin bounds,
/// populations, and the active configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub bin_widths_x: Vec<f64>,
    pub bin_widths_y: Vec<f64>,
    /// Active descriptor pair, by name.
    pub descriptors: (String, String),
    pub fitness_weights: Vec<f64>,
    /// Active emitter identity and learned state.
    pub emitter: Emitter,
    pub enforce_single_bin: bool,
    pub generation: usize,
    pub seed: u64,
    pub bins: Vec<BinSnapshot>,
}

/// The interactive constrained MAP-Elites archive.
pub struct MapElites {
    config: EngineConfig,
    lsystem: LSystem,
    evaluator: FitnessEvaluator,
    /// Registry of every configured descriptor; candidates cache one
    /// value per entry, enabling cheap axis swaps.
    descriptors: Vec<BehaviorDescriptor>,
    /// Indices of the active descriptor pair.
    active: (usize, usize),
    /// Per-axis bin widths; refined in place by subdivision.
    bin_widths: (Vec<f64>, Vec<f64>),
    /// Row-major grid, rows along the first active axis.
    bins: Vec<MapBin>,
    emitter: Emitter,
    enforce_single_bin: bool,
    generation: usize,
    new_solutions: usize,
    rng: StdRng,
    seed: u64,
}

impl MapElites {
    /// Build an archive with the default spaceship grammar, fitness
    /// functions, and descriptor registry.
    pub fn new(config: EngineConfig) -> Result<Self, ArchiveError> {
        config.validate()?;
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let lsystem = LSystem::spaceship(config.expansion.clone());
        let descriptors = BehaviorDescriptor::defaults();
        let mut archive = Self {
            bin_widths: (Vec::new(), Vec::new()),
            bins: Vec::new(),
            lsystem,
            evaluator: FitnessEvaluator::default(),
            descriptors,
            active: (0, 1),
            emitter: Emitter::default(),
            enforce_single_bin: false,
            generation: 0,
            new_solutions: 0,
            rng: StdRng::seed_from_u64(seed),
            seed,
            config,
        };
        archive.bin_widths = archive.uniform_widths();
        archive.bins = archive.build_bins();
        Ok(archive)
    }

    fn uniform_widths(&self) -> (Vec<f64>, Vec<f64>) {
        let width = |descriptor: &BehaviorDescriptor, count: usize| {
            let (lo, hi) = descriptor.bounds;
            vec![(hi - lo) / count as f64; count]
        };
        (
            width(&self.descriptors[self.active.0], self.config.archive.bins_x),
            width(&self.descriptors[self.active.1], self.config.archive.bins_y),
        )
    }

    fn build_bins(&self) -> Vec<MapBin> {
        let bounds_x = self.axis_boundaries(0);
        let bounds_y = self.axis_boundaries(1);
        let mut bins = Vec::with_capacity(bounds_x.len() * bounds_y.len());
        for (i, &lo_x) in bounds_x.iter().enumerate() {
            for (j, &lo_y) in bounds_y.iter().enumerate() {
                let bin_bounds = (
                    (lo_x, lo_x + self.bin_widths.0[i]),
                    (lo_y, lo_y + self.bin_widths.1[j]),
                );
                bins.push(MapBin::new((i, j), bin_bounds));
            }
        }
        bins
    }

    fn axis_boundaries(&self, axis: usize) -> Vec<f64> {
        let (descriptor, widths) = if axis == 0 {
            (&self.descriptors[self.active.0], &self.bin_widths.0)
        } else {
            (&self.descriptors[self.active.1], &self.bin_widths.1)
        };
        boundaries_from_widths(descriptor.bounds.0, widths)
    }

    /// Grid shape as (rows, columns).
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.bin_widths.0.len(), self.bin_widths.1.len())
    }

    pub fn bins(&self) -> &[MapBin] {
        &self.bins
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Candidates inserted since construction or the last reset.
    pub fn new_solutions(&self) -> usize {
        self.new_solutions
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Switch the active emitter: an explicit state transition.
    pub fn set_emitter(&mut self, emitter: Emitter) {
        info!("emitter switched to {}", emitter.name());
        self.emitter = emitter;
    }

    pub fn enforce_single_bin(&self) -> bool {
        self.enforce_single_bin
    }

    pub fn toggle_single_bin_selection(&mut self) -> bool {
        self.enforce_single_bin = !self.enforce_single_bin;
        self.enforce_single_bin
    }

    pub fn lsystem(&self) -> &LSystem {
        &self.lsystem
    }

    /// Replace the high-level rule set with a pre-validated one.
    pub fn set_hl_rules(&mut self, rules: crate::schema::rules::StochasticRules) {
        self.lsystem.set_hl_rules(rules);
    }

    pub fn descriptors(&self) -> &[BehaviorDescriptor] {
        &self.descriptors
    }

    /// The active descriptor pair.
    pub fn active_descriptors(&self) -> (&BehaviorDescriptor, &BehaviorDescriptor) {
        (
            &self.descriptors[self.active.0],
            &self.descriptors[self.active.1],
        )
    }

    pub fn fitness_weights(&self) -> &[f64] {
        self.evaluator.weights()
    }

    fn flat(&self, idx: (usize, usize)) -> usize {
        idx.0 * self.bin_widths.1.len() + idx.1
    }

    fn check_idx(&self, idx: (usize, usize)) -> Result<(), ArchiveError> {
        let (rows, cols) = self.grid_shape();
        if idx.0 >= rows || idx.1 >= cols {
            return Err(ArchiveError::BinOutOfRange(idx.0, idx.1));
        }
        Ok(())
    }

    pub fn bin(&self, idx: (usize, usize)) -> Result<&MapBin, ArchiveError> {
        self.check_idx(idx)?;
        Ok(&self.bins[self.flat(idx)])
    }

    pub fn non_empty(&self, idx: (usize, usize), feasible: bool) -> bool {
        self.bin(idx).map_or(false, |b| b.non_empty(feasible))
    }

    pub fn get_elite(
        &self,
        idx: (usize, usize),
        feasible: bool,
    ) -> Result<Option<&CandidateSolution>, ArchiveError> {
        Ok(self.bin(idx)?.elite(feasible))
    }

    /// Bins selectable for interactive stepping: those holding at least
    /// one feasible candidate.
    pub fn valid_bins(&self) -> Vec<(usize, usize)> {
        self.bins
            .iter()
            .filter(|b| b.non_empty(true))
            .map(|b| b.idx)
            .collect()
    }

    /// Emitter-facing summaries of the valid bins.
    fn bin_infos(&self) -> Vec<BinInfo> {
        let (d0, d1) = self.active_descriptors();
        let normalize = |value: f64, bounds: (f64, f64)| {
            let span = bounds.1 - bounds.0;
            if span > 0.0 {
                ((value - bounds.0) / span).clamp(0.0, 1.0)
            } else {
                0.5
            }
        };
        self.bins
            .iter()
            .filter(|b| b.non_empty(true))
            .map(|b| BinInfo {
                idx: b.idx,
                center: (
                    normalize((b.bounds.0.0 + b.bounds.0.1) / 2.0, d0.bounds),
                    normalize((b.bounds.1.0 + b.bounds.1.1) / 2.0, d1.bounds),
                ),
                elite_fitness: b.elite(true).map_or(0.0, CandidateSolution::rank_fitness),
            })
            .collect()
    }

    /// Bin index for a candidate's cached behavior values.
    fn bin_index_of(&self, behaviors: &[f64]) -> Result<(usize, usize), ArchiveError> {
        let v0 = *behaviors
            .get(self.active.0)
            .ok_or(ArchiveError::UnscoredCandidate)?;
        let v1 = *behaviors
            .get(self.active.1)
            .ok_or(ArchiveError::UnscoredCandidate)?;
        Ok((
            digitize(v0, &self.axis_boundaries(0)),
            digitize(v1, &self.axis_boundaries(1)),
        ))
    }

    /// Materialize and score a candidate: raw fitnesses, aggregate,
    /// constraints, and one value per registry descriptor.
    fn score(&mut self, candidate: &mut CandidateSolution) -> Result<(), GrammarError> {
        candidate.materialize(&self.lsystem, &mut self.rng)?;
        let (fitnesses, aggregate, report, behaviors) = {
            let structure = candidate.structure().unwrap();
            let report = evaluate_constraints(structure);
            let fitnesses = self.evaluator.raw_scores(structure);
            let aggregate = self.evaluator.aggregate(&fitnesses);
            let behaviors: Vec<f64> = self
                .descriptors
                .iter()
                .map(|d| d.compute(structure))
                .collect();
            (fitnesses, aggregate, report, behaviors)
        };
        candidate.fitnesses = fitnesses;
        candidate.aggregate = aggregate;
        candidate.feasibility = report.score;
        candidate.is_feasible = report.is_feasible;
        candidate.behaviors = behaviors;
        Ok(())
    }

    /// Insert a scored candidate into its bin, enforcing the population
    /// cap. Returns the evicted candidate, if any.
    pub fn insert(
        &mut self,
        candidate: CandidateSolution,
    ) -> Result<Option<CandidateSolution>, ArchiveError> {
        let idx = self.bin_index_of(&candidate.behaviors)?;
        let cap = self.config.archive.bin_pop_size;
        let flat = self.flat(idx);
        let evicted = self.bins[flat].insert(candidate, cap);
        self.new_solutions += 1;
        Ok(evicted)
    }

    /// Re-initialize every bin empty, then generate fresh candidates
    /// until every bin reaches the minimum target population or the
    /// iteration budget runs out. Exhaustion is a soft failure: the
    /// archive is left partially filled and the shortfall is logged.
    pub fn reset(&mut self) -> usize {
        self.reset_with_progress(&mut |_| {})
    }

    /// [`MapElites::reset`] with a caller-owned progress observer that
    /// receives the completed fraction of the iteration budget.
    pub fn reset_with_progress(&mut self, progress: &mut dyn FnMut(f64)) -> usize {
        for bin in &mut self.bins {
            bin.drain();
        }
        self.generation = 0;
        self.new_solutions = 0;

        let budget = self.config.archive.reset_budget;
        let target = self.config.archive.reset_min_population;
        let mut generated = 0;

        for attempt in 0..budget {
            if self.all_bins_filled(target) {
                break;
            }
            match self.generate_fresh() {
                Ok(()) => generated += 1,
                Err(err) => debug!("reset: discarded genotype ({err})"),
            }
            progress((attempt + 1) as f64 / budget as f64);
        }

        if !self.all_bins_filled(target) {
            let underfull = self
                .bins
                .iter()
                .filter(|b| b.feasible.len() + b.infeasible.len() < target)
                .count();
            warn!("reset exhausted its budget: {underfull} bins below target population");
        }
        info!("reset generated {generated} candidates");
        generated
    }

    fn all_bins_filled(&self, target: usize) -> bool {
        target == 0
            || self
                .bins
                .iter()
                .all(|b| b.feasible.len() + b.infeasible.len() >= target)
    }

    fn generate_fresh(&mut self) -> Result<(), ArchiveError> {
        let genotype = self.lsystem.generate_genotype(&mut self.rng)?;
        let mut candidate = CandidateSolution::new(genotype);
        self.score(&mut candidate)?;
        self.insert(candidate)?;
        Ok(())
    }

    /// Run one interactive step on externally selected bins.
    ///
    /// The active emitter learns from the selection, proposes offspring
    /// per bin, and every non-selected survivor ages by one generation;
    /// candidates beyond the maximum age are evicted.
    pub fn interactive_step(
        &mut self,
        bin_idxs: &[(usize, usize)],
        generation: usize,
    ) -> Result<StepOutcome, ArchiveError> {
        for idx in bin_idxs {
            self.check_idx(*idx)?;
        }
        if self.enforce_single_bin {
            let valid = self.valid_bins();
            if !bin_idxs.iter().all(|idx| valid.contains(idx)) {
                return Err(ArchiveError::InvalidSelection);
            }
        }
        let infos = self.bin_infos();
        self.emitter.update_from_feedback(bin_idxs, &infos);
        debug!("interactive step {generation} on {} bins", bin_idxs.len());
        self.step_on_bins(bin_idxs.to_vec(), generation)
    }

    /// Run one autonomous step: the active emitter selects its own bins.
    pub fn emitter_step(&mut self, generation: usize) -> Result<StepOutcome, ArchiveError> {
        let infos = self.bin_infos();
        let n = self.config.archive.emitter_bins_per_step;
        let selected = self.emitter.select_bins(&infos, n, &mut self.rng);
        if selected.is_empty() {
            debug!("emitter {} selected no bins", self.emitter.name());
            return Ok(StepOutcome::default());
        }
        self.step_on_bins(selected, generation)
    }

    /// Autonomous background improvement between interactive steps.
    pub fn shadow_steps(
        &mut self,
        generation: usize,
        n_steps: usize,
    ) -> Result<StepOutcome, ArchiveError> {
        let mut total = StepOutcome::default();
        for _ in 0..n_steps {
            let outcome = self.emitter_step(generation)?;
            total.inserted += outcome.inserted;
            total.age_evicted += outcome.age_evicted;
            total.selected.extend(outcome.selected);
        }
        Ok(total)
    }

    fn step_on_bins(
        &mut self,
        selected: Vec<(usize, usize)>,
        generation: usize,
    ) -> Result<StepOutcome, ArchiveError> {
        let epsilon = self.config.archive.feasibility_epsilon;
        let per_bin = self.config.archive.offspring_per_bin;
        let mut inserted = 0;

        for idx in &selected {
            let bin = &self.bins[self.flat(*idx)];
            // Parent pool: the feasible population plus near-feasible
            // infeasible candidates.
            let pool: Vec<&CandidateSolution> = bin
                .feasible
                .iter()
                .chain(
                    bin.infeasible
                        .iter()
                        .filter(|c| c.feasibility >= epsilon),
                )
                .collect();
            if pool.is_empty() {
                debug!("bin {idx:?} has no eligible parents, skipped");
                continue;
            }
            let lineage: Vec<String> = pool
                .iter()
                .take(2)
                .map(|c| c.genotype().to_string())
                .collect();

            // The variation RNG is split off so the pool borrow ends
            // before scoring mutates the archive.
            let mut variation_rng = StdRng::seed_from_u64(self.rng.r#gen());
            let mut ops = VariationOps::new(
                &mut variation_rng,
                &self.config.variation,
                self.lsystem.tiles(),
                self.lsystem
                    .active_modules()
                    .into_iter()
                    .map(String::from)
                    .collect(),
            );
            let offspring = self.emitter.propose_offspring(&pool, &mut ops, per_bin)?;

            for genotype in offspring {
                let mut child = CandidateSolution::new(genotype).with_parents(lineage.clone());
                match self.score(&mut child) {
                    Ok(()) => {
                        self.insert(child)?;
                        inserted += 1;
                    }
                    Err(err) => debug!("step: discarded offspring ({err})"),
                }
            }
        }

        // Age the survivors everywhere else; old candidates fall off.
        let max_age = self.config.archive.max_age;
        let mut age_evicted = 0;
        for bin in &mut self.bins {
            if selected.contains(&bin.idx) {
                continue;
            }
            bin.age_population();
            age_evicted += bin.evict_older_than(max_age);
        }

        self.generation = generation + 1;
        Ok(StepOutcome {
            selected,
            inserted,
            age_evicted,
        })
    }

    /// Swap the active descriptor axes and re-bucket every candidate.
    ///
    /// The grid returns to its configured uniform shape over the new
    /// axes; candidates re-enter through the standard insertion path,
    /// so overfull bins evict as usual.
    pub fn update_behavior_descriptors(
        &mut self,
        first: &str,
        second: &str,
    ) -> Result<(), ArchiveError> {
        let index_of = |name: &str| {
            self.descriptors
                .iter()
                .position(|d| d.name == name)
                .ok_or_else(|| ArchiveError::UnknownDescriptor(name.to_string()))
        };
        self.active = (index_of(first)?, index_of(second)?);
        info!("descriptor axes set to ({first}, {second})");
        self.bin_widths = self.uniform_widths();
        self.rebucket()
    }

    /// Split the bin's row and column in half, refining the grid, and
    /// redistribute every candidate into the finer bins.
    pub fn subdivide_range(&mut self, idx: (usize, usize)) -> Result<(), ArchiveError> {
        self.check_idx(idx)?;
        subdivide_widths(&mut self.bin_widths.0, idx.0);
        subdivide_widths(&mut self.bin_widths.1, idx.1);
        info!("subdivided bin {idx:?}; grid is now {:?}", self.grid_shape());
        self.rebucket()
    }

    /// Rebuild the grid from current widths and re-insert all drained
    /// candidates by their cached behavior values.
    fn rebucket(&mut self) -> Result<(), ArchiveError> {
        let mut all: Vec<CandidateSolution> = Vec::new();
        for bin in &mut self.bins {
            all.append(&mut bin.drain());
        }
        self.bins = self.build_bins();
        self.emitter.note_grid_changed();
        let previous = self.new_solutions;
        for candidate in all {
            self.insert(candidate)?;
        }
        // Re-insertion is bookkeeping, not discovery.
        self.new_solutions = previous;
        Ok(())
    }

    /// Rescale the weighted-sum aggregate. Raw per-function scores are
    /// cached, so no candidate is re-materialized or re-scored.
    pub fn update_fitness_weights(&mut self, weights: &[f64]) {
        self.evaluator.set_weights(weights);
        for bin in &mut self.bins {
            for candidate in bin.feasible.iter_mut().chain(bin.infeasible.iter_mut()) {
                candidate.aggregate = self.evaluator.aggregate(&candidate.fitnesses);
            }
        }
        info!("fitness weights updated to {:?}", self.evaluator.weights());
    }

    /// Enable or disable a grammar module for offspring variation.
    pub fn toggle_module_mutability(&mut self, module: &str) -> bool {
        let toggled = self.lsystem.toggle_module(module);
        if toggled {
            info!("module '{module}' mutability toggled");
        } else {
            warn!("unknown module '{module}'");
        }
        toggled
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Full archive snapshot; round-trips through [`MapElites::from_snapshot`].
    pub fn to_snapshot(&self) -> ArchiveSnapshot {
        let (d0, d1) = self.active_descriptors();
        ArchiveSnapshot {
            bin_widths_x: self.bin_widths.0.clone(),
            bin_widths_y: self.bin_widths.1.clone(),
            descriptors: (d0.name.clone(), d1.name.clone()),
            fitness_weights: self.evaluator.weights().to_vec(),
            emitter: self.emitter.clone(),
            enforce_single_bin: self.enforce_single_bin,
            generation: self.generation,
            seed: self.seed,
            bins: self.bin_snapshots(),
        }
    }

    fn bin_snapshots(&self) -> Vec<BinSnapshot> {
        self.bins
            .iter()
            .filter(|b| b.non_empty(true) || b.non_empty(false))
            .map(|b| BinSnapshot {
                idx: b.idx,
                feasible: b.feasible.iter().map(CandidateSolution::to_snapshot).collect(),
                infeasible: b
                    .infeasible
                    .iter()
                    .map(CandidateSolution::to_snapshot)
                    .collect(),
            })
            .collect()
    }

    /// Reconstruct an archive from a snapshot.
    ///
    /// Candidates are placed back into their recorded bins directly, so
    /// the restored populations are byte-for-byte the serialized ones.
    pub fn from_snapshot(
        snapshot: ArchiveSnapshot,
        config: EngineConfig,
    ) -> Result<Self, ArchiveError> {
        let mut archive = Self::new(config)?;
        let index_of = |name: &str| {
            archive
                .descriptors
                .iter()
                .position(|d| d.name == name)
                .ok_or_else(|| ArchiveError::UnknownDescriptor(name.to_string()))
        };
        archive.active = (
            index_of(&snapshot.descriptors.0)?,
            index_of(&snapshot.descriptors.1)?,
        );
        archive.bin_widths = (snapshot.bin_widths_x, snapshot.bin_widths_y);
        archive.bins = archive.build_bins();
        archive.evaluator.set_weights(&snapshot.fitness_weights);
        archive.emitter = snapshot.emitter;
        archive.enforce_single_bin = snapshot.enforce_single_bin;
        archive.generation = snapshot.generation;
        archive.seed = snapshot.seed;
        archive.rng = StdRng::seed_from_u64(snapshot.seed);

        for bin_snapshot in snapshot.bins {
            archive.check_idx(bin_snapshot.idx)?;
            let flat = archive.flat(bin_snapshot.idx);
            let bin = &mut archive.bins[flat];
            bin.feasible = bin_snapshot
                .feasible
                .into_iter()
                .map(CandidateSolution::from_snapshot)
                .collect();
            bin.infeasible = bin_snapshot
                .infeasible
                .into_iter()
                .map(CandidateSolution::from_snapshot)
                .collect();
        }
        Ok(archive)
    }

    /// Population-only snapshot: the ships without archive config.
    pub fn to_population_snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            bins: self.bin_snapshots(),
        }
    }

    /// Replace the stored population with a saved one. Candidates are
    /// re-bucketed through the standard insertion path, so a population
    /// saved under a different grid still loads.
    pub fn load_population(&mut self, snapshot: PopulationSnapshot) -> Result<(), ArchiveError> {
        for bin in &mut self.bins {
            bin.drain();
        }
        for bin_snapshot in snapshot.bins {
            for candidate_snapshot in bin_snapshot
                .feasible
                .into_iter()
                .chain(bin_snapshot.infeasible)
            {
                self.insert(CandidateSolution::from_snapshot(candidate_snapshot))?;
            }
        }
        Ok(())
    }

    /// Save the full snapshot as JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ArchiveError> {
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a full snapshot from JSON.
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        config: EngineConfig,
    ) -> Result<Self, ArchiveError> {
        let json = fs::read_to_string(path)?;
        let snapshot: ArchiveSnapshot = serde_json::from_str(&json)?;
        Self::from_snapshot(snapshot, config)
    }
}
