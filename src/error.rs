//! Error types for elaboration and lowering
//!
//! Every error here is a structural validation failure: it is surfaced once,
//! early, and is fatal to elaboration. No partial netlist is emitted after a
//! failure. Each variant carries the source location of the offending
//! definition, captured at registration time.

use serde::Serialize;
use thiserror::Error;

/// Result type for elaboration operations
pub type ElabResult<T> = Result<T, ElabError>;

/// Source location of a definition, captured with `#[track_caller]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLoc {
    /// Source file of the registration call
    pub file: &'static str,
    /// Line of the registration call
    pub line: u32,
}

impl SourceLoc {
    /// Capture the caller's location
    #[track_caller]
    pub fn here() -> Self {
        let loc = std::panic::Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Structural validation failures
#[derive(Error, Debug)]
pub enum ElabError {
    /// Re-registration of a method with an incompatible layout
    #[error("layout mismatch for method `{method}` at {loc}: {detail}")]
    LayoutMismatch {
        method: String,
        detail: String,
        loc: SourceLoc,
    },

    /// Call recorded outside an open body
    #[error("call to `{callee}` at {loc} outside an open body")]
    OrphanCall { callee: String, loc: SourceLoc },

    /// Cycle in the method call graph
    #[error("method call graph cycle: {}", cycle.join(" -> "))]
    CallGraphCycle { cycle: Vec<String> },

    /// Cycle in the declared priority hints
    #[error("priority cycle through: {}", cycle.join(" -> "))]
    PriorityCycle { cycle: Vec<String> },

    /// Nonexclusive method with multiple callers and no applicable reducer
    #[error(
        "nonexclusive method `{method}` (declared at {loc}) has {callers} callers \
         but no applicable reducer"
    )]
    UnmergedNonexclusive {
        method: String,
        callers: usize,
        loc: SourceLoc,
    },

    /// Caller and callee belong to different elaboration contexts
    #[error("context mismatch at {loc}: entity from context #{found} used in context #{expected}")]
    ContextMismatch {
        expected: u64,
        found: u64,
        loc: SourceLoc,
    },

    /// Call to a method that was declared but never defined
    #[error("method `{method}` (declared at {loc}) has no body at freeze")]
    MissingCallee { method: String, loc: SourceLoc },

    /// Mutation attempted after the context was frozen
    #[error("context is frozen: `{operation}` at {loc} arrived after freeze")]
    FrozenContext {
        operation: String,
        loc: SourceLoc,
    },

    /// Two call sites under one caller can drive an exclusive method in the
    /// same cycle
    #[error(
        "caller `{caller}` has overlapping call sites to exclusive method \
         `{method}` (second site at {loc})"
    )]
    ConflictingCallSites {
        caller: String,
        method: String,
        loc: SourceLoc,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_loc_displays_file_and_line() {
        let loc = SourceLoc::here();
        let text = loc.to_string();
        assert!(text.contains("error.rs"));
        assert!(text.contains(':'));
    }

    #[test]
    fn errors_render_offending_names() {
        let err = ElabError::MissingCallee {
            method: "put".to_string(),
            loc: SourceLoc::here(),
        };
        assert!(err.to_string().contains("put"));

        let err = ElabError::PriorityCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
