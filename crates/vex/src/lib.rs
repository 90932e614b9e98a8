//! # vex - variable expansion for release builds
//!
//! For a user guide and material related to CLI usage see <https://github.com/denfren/vex>
//!
//! ## Introduction for developers
//!
//! Read this to understand how `vex` works internally.
//!
//! ### Format Terms
//!
//! Quick introduction to terms used to describe elements of vex sources.
//!
//! In vex terms...
//! - a file is a sequence of physical lines, one declaration per line
//! - a `scalar` is a "key: value words" pair
//! - a `block` is a key bound to raw lines between `key: [` and `]`
//! - an `annotation` is a bracketed directive: `[section ...]`, `[when ...]`,
//!   `[option ...]`, `[collect ...]`
//!
//! This is a valid vex file:
//! ```text
//! # comments start at a word beginning with '#'
//!
//! arch: amd64
//!
//! [section vm]
//! memsize: 2048           # stored as vm/memsize
//!
//! [when arch is amd64]
//! ostype: Gentoo_64       # a conditional variant of vm/ostype
//! [when *]
//!
//! steps: [
//! echo building $[arch]
//! ]
//!
//! [collect profiles/$[arch].conf]
//! ```
//!
//! ### Loading files
//!
//! Sources are parsed line by line into a [collection::Collection], the
//! store holding every key with its conditional variants, section
//! membership, declaration-time laxness and provenance (the file it came
//! from, kept for duplicate-definition errors and re-collection
//! idempotence). Parser state that only lives for one file — the current
//! section and the active condition — is threaded through an explicit
//! [parse::ParserContext], so parsing is reentrant.
//!
//! ### Expansion
//!
//! see [collection::Collection::lookup]
//!
//! Values are expanded on demand. A scalar is whitespace-collapsed and
//! scanned for `$[name]` references, which expand recursively; blocks
//! expand line by line (or flatten to one scalar when referenced from
//! scalar context). The scanner threads an explicit stack of in-progress
//! key names through every recursive call and checks it before each
//! descent, so circular configurations fail with the offending chain
//! instead of overflowing.
//!
//! A reference can end in `?` (substituting `yes`/`no` for truth), carry a
//! `:lax` modifier (this reference tolerates being undefined) or a `:zap`
//! modifier (an unresolved or empty reference discards the whole line).
//! `$[]`, `$[:]` and `$[:suffix]` substitute the enclosing section's name.
//! A key whose value is `<< path` aliases the contents of the named file,
//! and a lone block line `$[[other]]` splices another block's expanded
//! lines in place.
//!
//! Conditional variants are resolved at every lookup under the
//! single-true-condition invariant: more than one true guard for a key is
//! an error, never a first-match-wins choice. An unconditional value
//! always beats the variants.
//!
//! ### Collection
//!
//! see [collection::Collection::run_collector]
//!
//! `[collect]` annotations enqueue further files whose paths may reference
//! values that only a later file defines. The scheduler rotates entries it
//! cannot process yet to the back of the queue and stops at a fixed point:
//! entries stalled on a false guard are skipped for good, entries with
//! unexpandable paths abort the run.
//!
//! ### Output
//!
//! Resolved values are returned as [value::Value] (scalar or block) which
//! serializes via [serde] — a string or a sequence of strings — for the
//! CLI's json/yaml output.
//!
pub mod collection;
pub mod error;
pub mod generator;
pub mod parse;
pub mod value;
mod collect;
mod condition;
mod expand;

pub use expand::ExpandOptions;
