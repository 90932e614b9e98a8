//! error taxonomy
//!
//! Everything the library can fail with lives in one [enum@Error]. All of
//! these are terminal for the current operation; the only "recovery" the
//! engine knows is explicit laxness (see [crate::collection::Collection]),
//! and the collector's re-queue loop, which matches on [Error::Undefined]
//! to tell "not yet available" apart from genuinely fatal conditions.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed line or annotation, unterminated block, unrecognized input
    #[error("{file}:{line}: syntax error: {message}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    /// Lookup miss outside lax mode
    #[error("variable {name:?} not found (stack: {stack:?})")]
    Undefined { name: String, stack: Vec<String> },

    /// A reference re-entered the in-progress expansion stack
    #[error("circular reference of {name:?} (stack: {stack:?})")]
    Circular { name: String, stack: Vec<String> },

    /// More than one conditional variant of a key evaluated true
    #[error("multiple true conditions for {name:?}: {conditions:?}")]
    AmbiguousCondition {
        name: String,
        conditions: Vec<String>,
    },

    /// Malformed condition text, or a guard that chains through a conditional
    #[error("invalid condition {condition:?}: {reason}")]
    InvalidCondition { condition: String, reason: String },

    /// Duplicate unconditional definition, or duplicate (key, condition) pair
    #[error("{key:?} already defined in {existing}, redefined in {new}")]
    Redefinition {
        key: String,
        existing: String,
        new: String,
    },

    /// Mutation of an existing key through the direct API while immutable
    #[error("cannot modify {key:?} while immutable")]
    Immutable { key: String },

    /// The collector completed a full pass without progress
    #[error("collector made no progress; unresolvable entries: {pending:?}")]
    Deadlock { pending: Vec<String> },

    /// Unterminated `$[`, unknown modifier, stacked modifiers
    #[error("malformed reference in {value:?}: {reason}")]
    MalformedReference { value: String, reason: String },

    /// Multi-line accessor on a scalar value or the other way around
    #[error("{name:?} is {actual}, accessed as {requested}")]
    WrongShape {
        name: String,
        actual: &'static str,
        requested: &'static str,
    },

    /// A `<?NAME` region names a generator nobody registered
    #[error("unknown generator {name:?}")]
    UnknownGenerator { name: String },

    /// A `<?NAME` region ran off the end of its block without `?>`
    #[error("generator region {name:?} not terminated")]
    UnterminatedGenerator { name: String },

    #[error("i/o error on {path:?}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
