//! the collector scheduler
//!
//! `[collect]` annotations only enqueue work; this module drives the queue
//! to its fixed point. Entries whose guard is false or whose path mentions
//! a value no file has defined *yet* move to the back of the queue — a
//! later collection may still define what they need. A full pass without
//! any progress is the fixed point: at that state a false-but-evaluable
//! guard means the file is simply not wanted by this configuration, while
//! an unexpandable path is a genuine dependency cycle or a permanently
//! undefined reference and aborts the run.
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::expand::ExpandOptions;
use std::path::{Path, PathBuf};

#[derive(derive_new::new, Debug, Clone)]
pub(crate) struct CollectorEntry {
    /// Path expression, possibly referencing not-yet-defined values
    pub path: String,

    /// File the `[collect]` annotation appeared in; relative paths resolve
    /// against its directory, not the working directory
    pub origin: PathBuf,

    pub condition: Option<String>,
}

enum Stall {
    ConditionFalse,
    PathUnresolved,
}

enum Attempt {
    Collected,
    Skipped,
    Stalled(Stall),
}

impl Collection {
    /// Drive the collector queue until it empties or stops making progress
    ///
    /// Must run to completion before any downstream query is considered
    /// reliable: a late collection can still introduce bindings referenced
    /// by earlier text.
    pub fn run_collector(&mut self) -> Result<()> {
        // ambient laxness is forced off while collecting, so a genuinely
        // undefined reference in a collected file fails instead of quietly
        // expanding to nothing
        let saved_lax = self.lax;
        self.lax = false;
        let result = self.drain_collector();
        self.lax = saved_lax;
        result
    }

    fn drain_collector(&mut self) -> Result<()> {
        let mut stalls = 0;
        while !self.collector.is_empty() && stalls < self.collector.len() {
            let entry = self.collector.pop_front().expect("queue is non-empty");
            match self.attempt(&entry)? {
                Attempt::Collected | Attempt::Skipped => stalls = 0,
                Attempt::Stalled(_) => {
                    self.collector.push_back(entry);
                    stalls += 1;
                }
            }
        }

        if self.collector.is_empty() {
            return Ok(());
        }

        // fixed point reached; classify what is left
        let mut pending = vec![];
        for entry in std::mem::take(&mut self.collector) {
            match self.attempt(&entry)? {
                Attempt::Stalled(Stall::ConditionFalse) => {
                    tracing::debug!(path = %entry.path, "collect entry skipped, condition is false");
                }
                Attempt::Stalled(Stall::PathUnresolved) => pending.push(entry.path),
                // state is unchanged at the fixed point, so re-attempting
                // cannot make progress; nothing else can show up here
                Attempt::Collected | Attempt::Skipped => {}
            }
        }
        if pending.is_empty() {
            Ok(())
        } else {
            Err(Error::Deadlock { pending })
        }
    }

    fn attempt(&mut self, entry: &CollectorEntry) -> Result<Attempt> {
        if let Some(condition) = &entry.condition {
            if self.condition_refers_conditional(condition)? {
                return Err(Error::InvalidCondition {
                    condition: condition.clone(),
                    reason: format!(
                        "guard of [collect {}] references a conditional variable",
                        entry.path
                    ),
                });
            }
            if !self.condition_true(condition)? {
                return Ok(Attempt::Stalled(Stall::ConditionFalse));
            }
        }

        match self.expand_text(&entry.path, None, &[], ExpandOptions::default()) {
            // the referenced value may arrive with a later collection
            Err(Error::Undefined { .. }) => Ok(Attempt::Stalled(Stall::PathUnresolved)),
            Err(error) => Err(error),
            // zapped or empty path expansions drop the entry
            Ok(None) => Ok(Attempt::Skipped),
            Ok(Some(path)) if path.is_empty() => Ok(Attempt::Skipped),
            Ok(Some(path)) => {
                self.collect_one(&path, &entry.origin)?;
                Ok(Attempt::Collected)
            }
        }
    }

    fn collect_one(&mut self, path: &str, origin: &Path) -> Result<()> {
        let mut resolved = PathBuf::from(path);
        if resolved.is_relative() {
            if let Some(dir) = origin.parent() {
                resolved = dir.join(resolved);
            }
        }
        self.load_file(&resolved)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::Collection;
    use pretty_assertions::assert_eq;

    fn fixture(relative: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/data")
            .join(relative)
    }

    #[test]
    fn collects_to_a_fixed_point() {
        let mut collection = Collection::default();
        collection.load_file(fixture("sched/root.conf")).unwrap();
        collection.run_collector().unwrap();

        // base/$[arch].conf was collected, defining the flag that made
        // extra.conf collectable on a later pass
        assert_eq!(collection.lookup("memsize").unwrap(), "2048");
        assert_eq!(collection.lookup("hddsize").unwrap(), "8192");
        // the entry guarded by an undefined flag was skipped for good
        assert!(!collection.exists("never").unwrap());
        assert!(collection.collector.is_empty());
    }

    #[test]
    fn unexpandable_paths_deadlock() {
        let mut collection = Collection::default();
        collection
            .load_str("<inline>", "[collect configs/$[undefined_profile].conf]")
            .unwrap();

        let err = collection.run_collector().unwrap_err();
        assert!(matches!(err, Error::Deadlock { ref pending, .. }
            if pending == &["configs/$[undefined_profile].conf"]));
    }

    #[test]
    fn guard_on_conditional_variable_is_invalid() {
        let mut collection = Collection::default();
        collection
            .load_str(
                "<inline>",
                "[when host]\nflavor: extra\n[when *]\n[collect $[flavor].conf when flavor]",
            )
            .unwrap();

        assert!(matches!(
            collection.run_collector(),
            Err(Error::InvalidCondition { .. })
        ));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let mut collection = Collection::default();
        collection
            .load_str("<inline>", "path: no/such/file.conf\n[collect $[path]]")
            .unwrap();

        assert!(matches!(collection.run_collector(), Err(Error::Io { .. })));
    }

    #[test]
    fn already_collected_files_are_not_reparsed() {
        let mut collection = Collection::default();
        collection.load_file(fixture("sched/base/amd64.conf")).unwrap();
        collection
            .load_str("<inline>", &format!("[collect {}]", fixture("sched/base/amd64.conf").display()))
            .unwrap();

        // a reparse would fail with duplicate definitions
        collection.run_collector().unwrap();
        assert_eq!(collection.lookup("memsize").unwrap(), "2048");
    }

    #[test]
    fn laxness_is_restored_after_collection() {
        let mut collection = Collection::default();
        collection.set_lax(true);
        collection.run_collector().unwrap();
        assert!(collection.lax);
    }
}
