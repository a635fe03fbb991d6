//! Stochastic rewriting rules for the two-tier spaceship grammar.
//!
//! A rule maps a left-hand symbol to one right-hand expansion with an
//! associated probability. Several rules may share a left-hand symbol;
//! their probabilities must sum to 1 and selection among them is a
//! weighted random draw at expansion time.

use std::fmt;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Tolerance for probability-sum validation.
const PROB_TOLERANCE: f64 = 1e-6;

/// A single production rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Left-hand symbol, optionally parameterized (`spine(x)`) and
    /// optionally bracket-suffixed (`spine(x)]`).
    pub lhs: String,
    /// Right-hand expansion string.
    pub rhs: String,
    /// Selection probability among rules sharing this left-hand symbol.
    pub p: f64,
}

/// An ordered set of stochastic production rules.
///
/// Declaration order is preserved: the high-level expander matches the
/// longest left-hand symbol, while the low-level expander scans the
/// alphabet in reverse-declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StochasticRules {
    rules: Vec<Rule>,
}

impl StochasticRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule, preserving declaration order.
    pub fn add_rule(&mut self, lhs: impl Into<String>, rhs: impl Into<String>, p: f64) {
        self.rules.push(Rule {
            lhs: lhs.into(),
            rhs: rhs.into(),
            p,
        });
    }

    /// All rules in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether any rule is keyed by `lhs` exactly.
    pub fn has_lhs(&self, lhs: &str) -> bool {
        self.rules.iter().any(|r| r.lhs == lhs)
    }

    /// Distinct left-hand keys in declaration order.
    pub fn lhs_alphabet(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.lhs.as_str()) {
                seen.push(rule.lhs.as_str());
            }
        }
        seen
    }

    /// Distinct matchable base symbols (left-hand keys with the `(x)`
    /// parameter marker and `]` suffix stripped), declaration order.
    pub fn base_symbols(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            let base = rule
                .lhs
                .trim_end_matches(']')
                .trim_end_matches("(x)");
            if !seen.contains(&base) {
                seen.push(base);
            }
        }
        seen
    }

    /// Check that every left-hand group's probabilities sum to 1.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.rules.is_empty() {
            return Err(RuleError::EmptyRuleSet);
        }
        for rule in &self.rules {
            if rule.p <= 0.0 || rule.p > 1.0 {
                return Err(RuleError::InvalidProbability {
                    lhs: rule.lhs.clone(),
                    p: rule.p,
                });
            }
        }
        for lhs in self.lhs_alphabet() {
            let total: f64 = self
                .rules
                .iter()
                .filter(|r| r.lhs == lhs)
                .map(|r| r.p)
                .sum();
            if (total - 1.0).abs() > PROB_TOLERANCE {
                return Err(RuleError::ProbabilitySum {
                    lhs: lhs.to_string(),
                    total,
                });
            }
        }
        Ok(())
    }

    /// Draw a right-hand side for `lhs` by weighted random selection.
    ///
    /// Returns `None` when no rule is keyed by `lhs`.
    pub fn get_rhs(&self, lhs: &str, rng: &mut StdRng) -> Option<&str> {
        let group: Vec<&Rule> = self.rules.iter().filter(|r| r.lhs == lhs).collect();
        match group.len() {
            0 => None,
            1 => Some(group[0].rhs.as_str()),
            _ => {
                let total: f64 = group.iter().map(|r| r.p).sum();
                let target = rng.gen_range(0.0..total);
                let mut cumulative = 0.0;
                for rule in &group {
                    cumulative += rule.p;
                    if target < cumulative {
                        return Some(rule.rhs.as_str());
                    }
                }
                group.last().map(|r| r.rhs.as_str())
            }
        }
    }

    /// Parse a rule set from the `lhs p rhs` line format.
    ///
    /// One rule per line; blank lines are skipped. The parsed set is
    /// validated before being returned so a previously active set can be
    /// kept on failure.
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let mut rules = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, ' ');
            let (lhs, p, rhs) = match (parts.next(), parts.next(), parts.next()) {
                (Some(lhs), Some(p), Some(rhs)) => (lhs, p, rhs),
                _ => {
                    return Err(RuleError::MalformedLine {
                        lineno: lineno + 1,
                        line: line.to_string(),
                    });
                }
            };
            let p: f64 = p.parse().map_err(|_| RuleError::MalformedLine {
                lineno: lineno + 1,
                line: line.to_string(),
            })?;
            rules.add_rule(lhs, rhs.trim(), p);
        }
        rules.validate()?;
        Ok(rules)
    }

    /// Default high-level spaceship grammar.
    ///
    /// `begin` seeds a cockpit-spine-engines hull; `spine(x)` recursively
    /// grows corridor segments with side branches. Tile symbols carry no
    /// rules of their own, so expansion halts at them.
    pub fn default_high_level() -> Self {
        let mut rules = Self::new();
        rules.add_rule("begin", "cockpit(1)spine(4)thrusters(1)", 1.0);
        rules.add_rule("spine(x)", "corridorsimple(x)", 0.4);
        rules.add_rule(
            "spine(x)",
            "corridorsimple(X)[RotYcwZspine(Y)]spine(Y)",
            0.25,
        );
        rules.add_rule("spine(x)", "corridorcargo(X)spine(Y)", 0.2);
        rules.add_rule("spine(x)", "corridorgun(x)", 0.15);
        rules.add_rule("spine(x)]", "corridorsimple(x)]", 0.6);
        rules.add_rule("spine(x)]", "corridorcargo(x)]", 0.4);
        rules
    }

    /// Default low-level block grammar (pure terminal substitution).
    ///
    /// Block atom names must not share a prefix with any left-hand key;
    /// the expander re-scans substituted text within the same pass.
    pub fn default_low_level() -> Self {
        let mut rules = Self::new();
        rules.add_rule("cockpit", "bridgeblock", 1.0);
        rules.add_rule("corridorsimple", "armorblock", 1.0);
        rules.add_rule("corridorcargo", "cargoblock", 1.0);
        rules.add_rule("corridorgun", "armorblock>(2)turretblock<(2)", 1.0);
        rules.add_rule("thrusters", "engineblock", 1.0);
        rules.add_rule("corridorwall", "wallblock", 1.0);
        rules.add_rule("intersection", "gyroblock", 1.0);
        rules
    }
}

impl fmt::Display for StochasticRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{} {} {}", rule.lhs, rule.p, rule.rhs)?;
        }
        Ok(())
    }
}

/// Rule-set validation and parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule set contains no rules")]
    EmptyRuleSet,
    #[error("Rule for '{lhs}' has probability {p} outside (0, 1]")]
    InvalidProbability { lhs: String, p: f64 },
    #[error("Probabilities for '{lhs}' sum to {total}, expected 1")]
    ProbabilitySum { lhs: String, total: f64 },
    #[error("Malformed rule at line {lineno}: '{line}'")]
    MalformedLine { lineno: usize, line: String },
}
