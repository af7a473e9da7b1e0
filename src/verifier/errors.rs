/// Build-time error taxonomy
///
/// Every variant names the word and overload being verified; resolution
/// failures additionally carry the rendered abstract stack at the failing
/// call site. All of these are fatal to the build; the core never guesses a
/// resolution.
use thiserror::Error;

use crate::object::ObjectError;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error(
        "{word}#{overload}: no overload of {callee} matches {stack}{}",
        missing_note(.missing)
    )]
    NonExhaustiveMatch {
        word: String,
        overload: usize,
        callee: String,
        stack: String,
        /// Enum variants left uncovered, when dispatching over a closed set.
        missing: Vec<String>,
    },

    #[error(
        "{word}#{overload}: calling {callee} requires {required} live occurrences of '{tag}', found {found}"
    )]
    AffineUnderflow {
        word: String,
        overload: usize,
        callee: String,
        tag: String,
        required: usize,
        found: usize,
    },

    #[error(
        "{word}#{overload}: {live} live occurrences of '{tag}' remain at end of body, outputs declare {declared}"
    )]
    AffineLeak {
        word: String,
        overload: usize,
        tag: String,
        live: usize,
        declared: usize,
    },

    #[error("{word}#{overload}: unknown word {callee} (stack was {stack})")]
    UnknownWord {
        word: String,
        overload: usize,
        callee: String,
        stack: String,
    },

    #[error("overload set for {word} is ambiguous: definitions {first} and {second} {reason}")]
    AmbiguousOverload {
        word: String,
        first: usize,
        second: usize,
        reason: String,
    },

    #[error("{word}#{overload}: {callee} needs {required} values, {available} present")]
    StackUnderflow {
        word: String,
        overload: usize,
        callee: String,
        required: usize,
        available: usize,
    },

    #[error("{word}#{overload}: type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        word: String,
        overload: usize,
        context: String,
        expected: String,
        actual: String,
    },

    #[error("shape {shape} claims unknown contract {contract}")]
    UnknownContract { shape: String, contract: String },

    #[error(
        "shape {shape} does not satisfy contract {contract}: no overload of {word} matches {required}"
    )]
    ContractUnsatisfied {
        shape: String,
        contract: String,
        word: String,
        required: String,
    },

    #[error("{word}#{overload}: {source}")]
    Object {
        word: String,
        overload: usize,
        source: ObjectError,
    },
}

fn missing_note(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" (uncovered variants: {})", missing.join(", "))
    }
}
