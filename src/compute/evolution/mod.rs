//! The evolutionary core: candidates, fitness, binning, emitters, and
//! the MAP-Elites archive.

pub mod archive;
pub mod binning;
pub mod candidate;
pub mod emitters;
pub mod fitness;
pub mod genome;

pub use archive::{ArchiveError, ArchiveSnapshot, MapElites, StepOutcome};
pub use binning::{BehaviorDescriptor, BehaviorMetric, BinMetric, MapBin};
pub use candidate::CandidateSolution;
pub use emitters::{BinInfo, Emitter};
pub use fitness::{ConstraintReport, FitnessEvaluator, FitnessFunction, evaluate_constraints};
pub use genome::VariationOps;
