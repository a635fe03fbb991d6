//! Algorithmic core: grammar engine, structure materialization, and
//! the evolutionary archive.

pub mod evolution;
pub mod grammar;
pub mod structure;

pub use evolution::{CandidateSolution, MapElites};
pub use grammar::{GrammarError, LSystem};
pub use structure::Structure;
