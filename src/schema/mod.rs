//! Configuration, rule, tile, and snapshot types.

pub mod config;
pub mod rules;
pub mod snapshot;
pub mod tiles;

pub use config::{ArchiveConfig, ConfigError, EngineConfig, ExpansionConfig, VariationConfig};
pub use rules::{Rule, RuleError, StochasticRules};
pub use snapshot::{BinSnapshot, CandidateSnapshot, PopulationSnapshot};
pub use tiles::{BlockKind, Rotation, TileDims, TileInfo, TileSet};
