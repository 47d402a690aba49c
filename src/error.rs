//! Typed errors for everything past the parser (§7).
//!
//! `LexError`/`ParseError` stay in `diagnostic::Diagnostic` because they
//! carry a source span for `ariadne` rendering; every other kind named in
//! the error handling design lives here as a plain `thiserror` enum.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarmonicsError {
    #[error("duplicate name '{0}' in graph")]
    DuplicateName(String),

    #[error("unresolved name '{0}' referenced in cycle")]
    UnresolvedName(String),

    #[error("invalid arrow: {0}")]
    InvalidArrow(String),

    #[error("shape mismatch binding '{name}': declared width {declared:?}, bound shape {bound:?}")]
    ShapeMismatch {
        name: String,
        declared: Option<u32>,
        bound: Vec<u32>,
    },

    #[error("producer '{0}' has no binding")]
    MissingBinding(String),

    #[error("unknown kernel function '{0}'")]
    UnknownFunction(String),

    #[error("checkpoint graph digest {checkpoint_digest} does not match runtime graph digest {graph_digest}")]
    CheckpointMismatch {
        checkpoint_digest: String,
        graph_digest: String,
    },

    #[error("chain-of-custody verification failed at op {op_index}")]
    ChainBroken { op_index: usize },

    #[error("runtime compiled against graph revision {compiled_revision} but graph is now at revision {graph_revision}; call recompile()")]
    StaleCompilation {
        compiled_revision: u64,
        graph_revision: u64,
    },

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for HarmonicsError {
    fn from(e: std::io::Error) -> Self {
        HarmonicsError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HarmonicsError>;
