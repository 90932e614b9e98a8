//! condition expressions and conditional-variant resolution
//!
//! Two grammars are accepted:
//! - `FLAG` — true when `FLAG` has an unconditional value
//! - `VAR is VALUE...` / `VAR in VALUE...` — true when the expansion of
//!   `VAR` equals any listed value
//!
//! Guards may only reference plain (unconditional) variables. Chaining a
//! condition through another conditional definition is rejected by the
//! collector before it ever evaluates.
use crate::collection::{Collection, Slot};
use crate::error::{Error, Result};
use crate::value::Value;

impl Collection {
    pub(crate) fn condition_true(&self, condition: &str) -> Result<bool> {
        let tokens: Vec<&str> = condition.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Err(Error::InvalidCondition {
                condition: condition.to_string(),
                reason: "empty condition".to_string(),
            }),
            [flag] => Ok(self.has_unconditional(flag)),
            [var, op, values @ ..] if (*op == "is" || *op == "in") && !values.is_empty() => {
                if !self.has_unconditional(var) {
                    // undefined counts as false, not as an error
                    return Ok(false);
                }
                let current = self.lookup(var)?;
                Ok(values.iter().any(|value| *value == current))
            }
            _ => Err(Error::InvalidCondition {
                condition: condition.to_string(),
                reason: "expected FLAG or VAR is|in VALUE...".to_string(),
            }),
        }
    }

    /// Does this guard reference a variable that only has conditional
    /// definitions? Such guards are a configuration error.
    pub(crate) fn condition_refers_conditional(&self, condition: &str) -> Result<bool> {
        let tokens: Vec<&str> = condition.split_whitespace().collect();
        let var = match tokens.as_slice() {
            [flag] => flag,
            [var, op, values @ ..] if (*op == "is" || *op == "in") && !values.is_empty() => var,
            _ => {
                return Err(Error::InvalidCondition {
                    condition: condition.to_string(),
                    reason: "expected FLAG or VAR is|in VALUE...".to_string(),
                })
            }
        };
        Ok(self
            .entries
            .get(*var)
            .map(|slot| slot.value.is_none() && !slot.variants.is_empty())
            .unwrap_or(false))
    }

    /// The value `name` currently resolves to: unconditional first, else
    /// the unique true conditional variant
    pub(crate) fn resolve_entry(&self, name: &str) -> Result<Option<&Value>> {
        let Some(slot) = self.entries.get(name) else {
            return Ok(None);
        };
        if let Some(value) = &slot.value {
            return Ok(Some(value));
        }
        self.true_variant(name, slot)
    }

    /// Enforces the single-true-condition invariant on every resolution
    pub(crate) fn true_variant<'a>(
        &self,
        name: &str,
        slot: &'a Slot,
    ) -> Result<Option<&'a Value>> {
        let mut hits: Vec<(&String, &Value)> = vec![];
        for (condition, value) in &slot.variants {
            if self.condition_true(condition)? {
                hits.push((condition, value));
            }
            if hits.len() > 1 {
                return Err(Error::AmbiguousCondition {
                    name: name.to_string(),
                    conditions: hits.iter().map(|(c, _)| (*c).clone()).collect(),
                });
            }
        }
        Ok(hits.pop().map(|(_, value)| value))
    }

    fn has_unconditional(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|slot| slot.value.is_some())
            .unwrap_or(false)
    }
}
