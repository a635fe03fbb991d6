//! Configuration types for the grammar engine and the archive.

use serde::{Deserialize, Serialize};

/// Top-level configuration for an interactive evolution session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grammar expansion settings (random parameter range).
    #[serde(default)]
    pub expansion: ExpansionConfig,
    /// Genotype variation settings (mutation/crossover).
    #[serde(default)]
    pub variation: VariationConfig,
    /// Archive grid and population settings.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl EngineConfig {
    /// Validate the full configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.expansion.validate()?;
        self.variation.validate()?;
        self.archive.validate()?;
        Ok(())
    }
}

/// Grammar expansion settings.
///
/// The `(X)` placeholder in a rule's right-hand side draws a uniform
/// integer from `[param_low, param_high)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_param_low")]
    pub param_low: u32,
    #[serde(default = "default_param_high")]
    pub param_high: u32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            param_low: default_param_low(),
            param_high: default_param_high(),
        }
    }
}

impl ExpansionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.param_low == 0 || self.param_low >= self.param_high {
            return Err(ConfigError::InvalidParamRange {
                low: self.param_low,
                high: self.param_high,
            });
        }
        Ok(())
    }
}

fn default_param_low() -> u32 {
    1
}
fn default_param_high() -> u32 {
    5
}

/// Genotype variation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationConfig {
    /// Probability of crossover before mutation when two parents exist.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Probability that mutation perturbs a parameter rather than
    /// inserting or dropping a module atom.
    #[serde(default = "default_param_mutation_rate")]
    pub param_mutation_rate: f64,
    /// Standard deviation of the integer parameter perturbation.
    #[serde(default = "default_param_mutation_strength")]
    pub param_mutation_strength: f64,
    /// Minimum number of atoms a mutated genotype must retain.
    #[serde(default = "default_min_atoms")]
    pub min_atoms: usize,
}

impl Default for VariationConfig {
    fn default() -> Self {
        Self {
            crossover_rate: default_crossover_rate(),
            param_mutation_rate: default_param_mutation_rate(),
            param_mutation_strength: default_param_mutation_strength(),
            min_atoms: default_min_atoms(),
        }
    }
}

impl VariationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("crossover_rate", self.crossover_rate),
            ("param_mutation_rate", self.param_mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::RateOutOfRange {
                    name: name.to_string(),
                    value: v,
                });
            }
        }
        if self.param_mutation_strength <= 0.0 {
            return Err(ConfigError::RateOutOfRange {
                name: "param_mutation_strength".to_string(),
                value: self.param_mutation_strength,
            });
        }
        if self.min_atoms == 0 {
            return Err(ConfigError::InvalidMinAtoms);
        }
        Ok(())
    }
}

fn default_crossover_rate() -> f64 {
    0.7
}
fn default_param_mutation_rate() -> f64 {
    0.6
}
fn default_param_mutation_strength() -> f64 {
    1.5
}
fn default_min_atoms() -> usize {
    3
}

/// Archive grid and population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Initial uniform bin count along the first descriptor axis.
    #[serde(default = "default_bins_per_axis")]
    pub bins_x: usize,
    /// Initial uniform bin count along the second descriptor axis.
    #[serde(default = "default_bins_per_axis")]
    pub bins_y: usize,
    /// Maximum population per feasibility class per bin.
    #[serde(default = "default_bin_pop_size")]
    pub bin_pop_size: usize,
    /// Candidates older than this many generations are evicted.
    #[serde(default = "default_max_age")]
    pub max_age: usize,
    /// Infeasible candidates scoring at least this close to constraint
    /// satisfaction count as near-feasible parents.
    #[serde(default = "default_feasibility_epsilon")]
    pub feasibility_epsilon: f64,
    /// Minimum population each bin should reach during reset.
    #[serde(default = "default_reset_min_population")]
    pub reset_min_population: usize,
    /// Maximum candidate generations attempted during reset.
    #[serde(default = "default_reset_budget")]
    pub reset_budget: usize,
    /// Offspring produced per selected bin per step.
    #[serde(default = "default_offspring_per_bin")]
    pub offspring_per_bin: usize,
    /// Bins an autonomous emitter selects per step.
    #[serde(default = "default_emitter_bins_per_step")]
    pub emitter_bins_per_step: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bins_x: default_bins_per_axis(),
            bins_y: default_bins_per_axis(),
            bin_pop_size: default_bin_pop_size(),
            max_age: default_max_age(),
            feasibility_epsilon: default_feasibility_epsilon(),
            reset_min_population: default_reset_min_population(),
            reset_budget: default_reset_budget(),
            offspring_per_bin: default_offspring_per_bin(),
            emitter_bins_per_step: default_emitter_bins_per_step(),
        }
    }
}

impl ArchiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bins_x == 0 || self.bins_y == 0 {
            return Err(ConfigError::InvalidGridShape {
                bins_x: self.bins_x,
                bins_y: self.bins_y,
            });
        }
        if self.bin_pop_size == 0 {
            return Err(ConfigError::InvalidBinPopSize);
        }
        if !(0.0..=1.0).contains(&self.feasibility_epsilon) {
            return Err(ConfigError::RateOutOfRange {
                name: "feasibility_epsilon".to_string(),
                value: self.feasibility_epsilon,
            });
        }
        if self.offspring_per_bin == 0 || self.emitter_bins_per_step == 0 {
            return Err(ConfigError::InvalidStepSize);
        }
        Ok(())
    }
}

fn default_bins_per_axis() -> usize {
    5
}
fn default_bin_pop_size() -> usize {
    10
}
fn default_max_age() -> usize {
    5
}
fn default_feasibility_epsilon() -> f64 {
    0.75
}
fn default_reset_min_population() -> usize {
    1
}
fn default_reset_budget() -> usize {
    500
}
fn default_offspring_per_bin() -> usize {
    2
}
fn default_emitter_bins_per_step() -> usize {
    2
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Random parameter range [{low}, {high}) is empty or starts at zero")]
    InvalidParamRange { low: u32, high: u32 },
    #[error("{name} = {value} is outside its valid range")]
    RateOutOfRange { name: String, value: f64 },
    #[error("Minimum atom count must be non-zero")]
    InvalidMinAtoms,
    #[error("Archive grid {bins_x}x{bins_y} must be non-empty on both axes")]
    InvalidGridShape { bins_x: usize, bins_y: usize },
    #[error("Bin population cap must be non-zero")]
    InvalidBinPopSize,
    #[error("Offspring and emitter step sizes must be non-zero")]
    InvalidStepSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_param_range_rejected() {
        let config = EngineConfig {
            expansion: ExpansionConfig {
                param_low: 4,
                param_high: 4,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParamRange { .. })
        ));
    }

    #[test]
    fn test_zero_grid_rejected() {
        let config = EngineConfig {
            archive: ArchiveConfig {
                bins_x: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.archive.bins_x, config.archive.bins_x);
        assert_eq!(back.expansion.param_high, config.expansion.param_high);
    }
}
