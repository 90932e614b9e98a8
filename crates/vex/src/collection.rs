//! The [Collection] store: all parsed keys, their conditional variants, and
//! the bookkeeping that expansion and collection need
//!
//! One `Collection` lives for exactly one build invocation. It is populated
//! by the line parser (see [crate::parse]) and by direct assignment, then
//! queried any number of times through the expansion engine (see
//! [crate::expand]).
use crate::collect::CollectorEntry;
use crate::error::{Error, Result};
use crate::generator::{Generator, GeneratorRegistry};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;

/// Everything the store remembers about one qualified key
///
/// A key may carry an unconditional value, conditional variants, or both
/// (parse order decides which registrations happen). The unconditional
/// value wins at resolution time.
#[derive(derive_new::new, Debug)]
pub(crate) struct Slot {
    /// Unconditional value, if one was declared
    #[new(default)]
    pub value: Option<Value>,

    /// Conditional variants, keyed by condition expression, in declaration order
    #[new(default)]
    pub variants: indexmap::IndexMap<String, Value>,

    /// Laxness captured from the ambient mode at declaration time
    pub lax: bool,

    /// Enclosing section, needed for the `$[]` / `$[:suffix]` shorthand
    pub section: Option<String>,

    /// File (or pseudo-source) the key was last defined in
    pub origin: String,
}

#[derive(Debug, Default)]
pub struct Collection {
    pub(crate) entries: indexmap::IndexMap<String, Slot>,

    /// Pending [collect] requests, FIFO with deferral-to-back
    pub(crate) collector: VecDeque<CollectorEntry>,

    /// Canonicalized paths of every file already parsed
    pub(crate) collected: indexmap::IndexSet<PathBuf>,

    /// Names that lax expansion substituted with nothing. The store is
    /// single-threaded (one orchestrating caller per build), so interior
    /// mutability here lets queries stay `&self`.
    pub(crate) blanks: RefCell<indexmap::IndexSet<String>>,

    pub(crate) generators: GeneratorRegistry,

    /// Ambient laxness, captured per key at declaration time
    pub(crate) lax: bool,

    /// When set, redefining or deleting an existing unconditional key
    /// through the direct API is an error
    pub(crate) immutable: bool,
}

impl Collection {
    /// Directly assign `key`, bypassing the parser
    ///
    /// Used by orchestrating callers for command-line overrides and
    /// computed values. Honors the immutability flag.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let existing = self.entries.get(&key).map(|slot| slot.value.is_some());
        if self.immutable && existing == Some(true) {
            return Err(Error::Immutable { key });
        }

        tracing::trace!(%key, "direct assignment");
        let lax = self.lax;
        let slot = self
            .entries
            .entry(key)
            .or_insert_with(|| Slot::new(lax, None, "direct assignment".to_string()));
        slot.value = Some(value.into());
        slot.origin = "direct assignment".to_string();
        Ok(())
    }

    /// Remove the unconditional value of `key`
    ///
    /// Conditional variants are untouched; the slot disappears entirely
    /// once nothing is left in it.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let Some(slot) = self.entries.get_mut(key) else {
            return Err(Error::Undefined {
                name: key.to_string(),
                stack: vec![],
            });
        };
        if slot.value.is_some() && self.immutable {
            return Err(Error::Immutable {
                key: key.to_string(),
            });
        }

        slot.value = None;
        if slot.variants.is_empty() {
            self.entries.shift_remove(key);
        }
        Ok(())
    }

    /// True when `key` has an unconditional value or a currently-true
    /// conditional variant
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.resolve_entry(key)?.is_some())
    }

    /// All keys that currently resolve, in declaration order
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = vec![];
        for (name, slot) in &self.entries {
            if slot.value.is_some() || self.true_variant(name, slot)?.is_some() {
                keys.push(name.clone());
            }
        }
        Ok(keys)
    }

    /// Subset of `wanted` that does not resolve; good for validating that a
    /// target's required settings are all present
    pub fn missing(&self, wanted: &[&str]) -> Result<Vec<String>> {
        let mut missing = vec![];
        for key in wanted {
            if !self.exists(key)? {
                missing.push(key.to_string());
            }
        }
        Ok(missing)
    }

    /// Expand every resolvable key once, surfacing undefined references
    /// and recording all blanks
    pub fn expand_all(&self) -> Result<()> {
        for key in self.keys()? {
            self.resolve(&key)?;
        }
        Ok(())
    }

    /// Names that lax expansion has substituted with nothing so far
    pub fn blanks(&self) -> Vec<String> {
        self.blanks.borrow().iter().cloned().collect()
    }

    /// Drop all definitions and audit data; collector and generator wiring
    /// survive
    pub fn clear(&mut self) {
        self.entries.clear();
        self.blanks.borrow_mut().clear();
    }

    pub fn set_lax(&mut self, lax: bool) {
        self.lax = lax;
    }

    pub fn set_immutable(&mut self, immutable: bool) {
        self.immutable = immutable;
    }

    pub fn register_generator(&mut self, name: impl Into<String>, generator: impl Generator + 'static) {
        self.generators.register(name, generator);
    }

    /// Laxness captured for `key` at its declaration
    pub(crate) fn is_lax(&self, key: &str) -> bool {
        self.entries.get(key).map(|slot| slot.lax).unwrap_or(false)
    }

    pub(crate) fn record_blank(&self, name: &str) {
        self.blanks.borrow_mut().insert(name.to_string());
    }
}

/// Utility macro to build a [Collection] from inline sources
///
/// One source:
/// ```
/// # use vex::collection;
/// collection!("arch: amd64");
/// ```
///
/// Multiple sources (pseudo-filename required):
/// ```
/// # use vex::collection;
/// collection! {
///   "one.conf" => "memsize: 2048",
///   "two.conf" => "hddsize: 8192"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use vex::collection;
/// collection!("[bogus annotation]");
/// ```
#[macro_export]
macro_rules! collection {
    // single source
    { $text:expr } => {{
        let mut collection = $crate::collection::Collection::default();
        collection.load_str("<inline>", $text).expect("source must parse");
        collection
    }};
    // multiple sources
    { $($name:expr => $text:expr),+ $(,)? } => {{
        let mut collection = $crate::collection::Collection::default();
        $(
            collection.load_str($name, $text).expect("source must parse");
        )+
        collection
    }};
}
