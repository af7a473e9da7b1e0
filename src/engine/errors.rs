/// Runtime error taxonomy
///
/// Everything here aborts the current execution; the core performs no
/// rollback. EngineFault signals verifier/engine disagreement and should
/// never occur under a sound verifier.
use thiserror::Error;

pub type WordResult = Result<(), RuntimeError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("stack underflow: {word} needs {required} values, {available} present")]
    StackUnderflow {
        word: String,
        required: usize,
        available: usize,
    },

    #[error("heap exhausted: stack depth limit {limit} reached")]
    HeapExhausted { limit: usize },

    #[error("entry word {name} is not defined with an empty input signature")]
    UndefinedEntry { name: String },

    #[error("engine fault in {word}: {detail}")]
    EngineFault { word: String, detail: String },
}

impl RuntimeError {
    pub fn fault(word: &str, detail: impl Into<String>) -> Self {
        RuntimeError::EngineFault {
            word: word.to_string(),
            detail: detail.into(),
        }
    }
}
