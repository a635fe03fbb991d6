//! Hullwright - interactive MAP-Elites over L-system spaceship hulls.
//!
//! This crate procedurally generates 3D voxel spaceship structures by
//! combining a stochastic string-rewriting grammar (a two-tier
//! L-system) with an interactive quality-diversity archive (a
//! MAP-Elites variant supporting human-in-the-loop evolution).
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: configuration, rule sets, tile tables, and snapshot types
//! - `compute`: the grammar engine, structure materialization, and the
//!   evolutionary archive with its emitter strategies
//!
//! # Example
//!
//! ```rust
//! use hullwright::compute::evolution::MapElites;
//! use hullwright::schema::EngineConfig;
//!
//! // Build an archive with the default spaceship grammar.
//! let config = EngineConfig {
//!     random_seed: Some(42),
//!     ..Default::default()
//! };
//! let mut archive = MapElites::new(config).unwrap();
//!
//! // Fill the grid with fresh candidates, then improve a bin.
//! archive.reset();
//! let valid = archive.valid_bins();
//! if let Some(&bin) = valid.first() {
//!     archive.interactive_step(&[bin], 0).unwrap();
//! }
//!
//! println!("{} bins hold feasible ships", archive.valid_bins().len());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{CandidateSolution, Emitter, MapElites};
pub use compute::grammar::LSystem;
pub use compute::structure::Structure;
pub use schema::{EngineConfig, StochasticRules};
