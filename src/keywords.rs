//! Keyword-to-velocity rule table.
//!
//! The decoder only reports *which* keyphrase fired; this table decides what
//! it does to the velocity command. Rules are evaluated in order as substring
//! tests against the normalized hypothesis text, and every matching rule is
//! applied. A built-in default table covers the stock command set; a YAML file
//! can replace it wholesale.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::twist::Twist;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to load keyword table: {0}")]
    LoadFailed(String),

    #[error("Invalid keyword table: {0}")]
    Invalid(String),
}

/// Operation a matched keyword applies to the velocity command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordAction {
    /// Replace the command. Coefficients are multiplied by the current
    /// speed-mode value, so elevated modes move faster.
    Set { linear: f64, angular: f64 },

    /// Multiply the current command components. Fires only while the speed
    /// mode sits at the baseline, so repeated detections cannot compound.
    Scale { factor: f64 },

    /// Zero the command. The speed mode is left untouched.
    Halt,
}

/// One rule: a phrase to look for and the action it triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub phrase: String,
    pub action: KeywordAction,
}

/// Ordered keyword-to-velocity mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTable {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KeywordTable {
    /// The stock command set
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                KeywordRule {
                    phrase: "full speed".to_string(),
                    action: KeywordAction::Scale { factor: 2.0 },
                },
                KeywordRule {
                    phrase: "forward".to_string(),
                    action: KeywordAction::Set {
                        linear: 1.0,
                        angular: 0.0,
                    },
                },
                KeywordRule {
                    phrase: "left".to_string(),
                    action: KeywordAction::Set {
                        linear: 0.0,
                        angular: 1.0,
                    },
                },
                KeywordRule {
                    phrase: "right".to_string(),
                    action: KeywordAction::Set {
                        linear: 0.0,
                        angular: -1.0,
                    },
                },
                KeywordRule {
                    phrase: "stop".to_string(),
                    action: KeywordAction::Halt,
                },
            ],
        }
    }

    /// Load a replacement table from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, TableError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| TableError::LoadFailed(format!("{}: {}", path.display(), e)))?;

        let mut table: KeywordTable =
            serde_yaml::from_str(&data).map_err(|e| TableError::Invalid(e.to_string()))?;

        // Matching is case-insensitive; store phrases pre-lowered.
        for rule in &mut table.rules {
            rule.phrase = rule.phrase.trim().to_lowercase();
        }

        table.validate()?;
        Ok(table)
    }

    /// Validate the rule set
    pub fn validate(&self) -> Result<(), TableError> {
        if self.rules.is_empty() {
            return Err(TableError::Invalid("no rules defined".to_string()));
        }

        for rule in &self.rules {
            if rule.phrase.is_empty() {
                return Err(TableError::Invalid("empty phrase".to_string()));
            }

            match rule.action {
                KeywordAction::Scale { factor } => {
                    if !(factor.is_finite() && factor > 0.0) {
                        return Err(TableError::Invalid(format!(
                            "scale factor for '{}' must be positive, got {}",
                            rule.phrase, factor
                        )));
                    }
                }
                KeywordAction::Set { linear, angular } => {
                    if !linear.is_finite() || !angular.is_finite() {
                        return Err(TableError::Invalid(format!(
                            "set coefficients for '{}' must be finite",
                            rule.phrase
                        )));
                    }
                }
                KeywordAction::Halt => {}
            }
        }

        Ok(())
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Apply every rule whose phrase `text` contains.
    ///
    /// `text` must already be lower-cased. `speed` is the current speed-mode
    /// value and `base_speed` the baseline the scale guard compares against.
    /// Returns the phrases that fired, in evaluation order.
    pub fn apply<'a>(
        &'a self,
        text: &str,
        msg: &mut Twist,
        speed: &mut f64,
        base_speed: f64,
    ) -> Vec<&'a str> {
        let mut fired = Vec::new();

        for rule in &self.rules {
            if !text.contains(rule.phrase.as_str()) {
                continue;
            }

            match rule.action {
                KeywordAction::Set { linear, angular } => {
                    msg.linear.x = linear * *speed;
                    msg.angular.z = angular * *speed;
                }
                KeywordAction::Scale { factor } => {
                    // The mode only ever holds values assigned from these same
                    // expressions, so the exact compare is the guard.
                    if *speed == base_speed {
                        msg.scale(factor);
                        *speed = base_speed * factor;
                    }
                }
                KeywordAction::Halt => {
                    *msg = Twist::zero();
                }
            }

            fired.push(rule.phrase.as_str());
        }

        fired
    }
}
