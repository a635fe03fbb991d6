//! String-rewriting expanders for the two grammar tiers.
//!
//! Both expanders run a single left-to-right pass with an explicit
//! cursor over a growable buffer. Substituted text is spliced in at the
//! cursor and re-scanned, so freshly inserted symbols are eligible for
//! further expansion within the same pass. Neither expander detects
//! non-termination; callers bound genotype complexity through the rule
//! sets they supply.

use rand::Rng;
use rand::rngs::StdRng;

use crate::schema::config::ExpansionConfig;
use crate::schema::rules::StochasticRules;

use super::GrammarError;

/// Expand a high-level string.
///
/// At each cursor position the longest matching left-hand base symbol
/// wins. A trailing `(n)` parameter extends the lookup key with `(x)`,
/// and a `]` directly after the parameter extends it further with `]`
/// so closing-bracket context can carry its own rules.
pub fn expand_high_level(
    genotype: &str,
    rules: &StochasticRules,
    config: &ExpansionConfig,
    rng: &mut StdRng,
) -> Result<String, GrammarError> {
    let symbols = rules.base_symbols();
    let mut string = genotype.to_string();
    let mut i = 0;

    while i < string.len() {
        let rest = &string[i..];
        let matched = symbols
            .iter()
            .filter(|s| rest.starts_with(**s))
            .max_by_key(|s| s.len())
            .copied();

        let Some(base) = matched else {
            i += char_width(&string, i);
            continue;
        };

        let mut lhs = base.to_string();
        let mut offset = base.len();
        let mut n: Option<u32> = None;

        if string[i + offset..].starts_with('(') {
            let close = string[i + offset..]
                .find(')')
                .ok_or(GrammarError::UnterminatedParameter { position: i + offset })?;
            let params = &string[i + offset..i + offset + close + 1];
            let digits = &params[1..params.len() - 1];
            n = Some(
                digits
                    .parse()
                    .map_err(|_| GrammarError::InvalidParameter {
                        text: params.to_string(),
                    })?,
            );
            offset += params.len();
            lhs.push_str("(x)");
            if string[i + offset..].starts_with(']') {
                lhs.push(']');
                offset += 1;
            }
        }

        let rhs = rules
            .get_rhs(&lhs, rng)
            .ok_or_else(|| GrammarError::NoRuleFor { lhs: lhs.clone() })?
            .to_string();
        let rhs = substitute_params(&rhs, n, &lhs, config, rng)?;

        string.replace_range(i..i + offset, &rhs);
        // Cursor stays put: the spliced text is scanned next.
    }

    Ok(string)
}

/// Substitute `(x)`, `(X)`, and `(Y)` placeholders in a right-hand side.
fn substitute_params(
    rhs: &str,
    n: Option<u32>,
    lhs: &str,
    config: &ExpansionConfig,
    rng: &mut StdRng,
) -> Result<String, GrammarError> {
    let mut out = rhs.to_string();
    let require_n = || {
        n.ok_or_else(|| GrammarError::MissingParameter {
            lhs: lhs.to_string(),
        })
    };
    // One X draw feeds both the (X) substitution and the (Y) remainder.
    let x = if out.contains("(X)") || out.contains("(Y)") {
        Some(rng.gen_range(config.param_low..config.param_high))
    } else {
        None
    };
    if out.contains("(x)") {
        let n = require_n()?;
        out = out.replace("(x)", &format!("({n})"));
    }
    if let Some(x) = x {
        out = out.replace("(X)", &format!("({x})"));
        if out.contains("(Y)") {
            let n = require_n()?;
            let y = (n as i64 - x as i64).max(1);
            out = out.replace("(Y)", &format!("({y})"));
        }
    }
    Ok(out)
}

/// Expand a mid-level string into the terminal block language.
///
/// Same cursor semantics as [`expand_high_level`] but the alphabet is
/// scanned in reverse-declared order, first match wins, and parameters
/// are ignored (pure terminal substitution).
pub fn expand_low_level(
    mid_level: &str,
    rules: &StochasticRules,
    rng: &mut StdRng,
) -> Result<String, GrammarError> {
    let mut alphabet = rules.lhs_alphabet();
    alphabet.reverse();

    let mut string = mid_level.to_string();
    let mut i = 0;

    while i < string.len() {
        let rest = &string[i..];
        let matched = alphabet.iter().find(|k| rest.starts_with(**k)).copied();

        let Some(lhs) = matched else {
            i += char_width(&string, i);
            continue;
        };

        let rhs = rules
            .get_rhs(lhs, rng)
            .ok_or_else(|| GrammarError::NoRuleFor {
                lhs: lhs.to_string(),
            })?
            .to_string();
        let len = lhs.len();
        string.replace_range(i..i + len, &rhs);
    }

    Ok(string)
}

fn char_width(s: &str, i: usize) -> usize {
    s[i..].chars().next().map_or(1, char::len_utf8)
}
