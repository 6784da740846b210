//! Structural diagnostics report
//!
//! Enumerates transactions, methods, conflict edges with causes, priority
//! order, and detected ambiguities. Serializable for tooling, printable for
//! humans. Warnings never halt lowering; they record where the synthesizer
//! applied a deterministic default.

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictCause;
use crate::resolver::MergePlan;

/// A recoverable ambiguity surfaced during analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// Two transactions conflict but no priority was declared between them;
    /// the deterministic tiebreak applies
    NoDeclaredPriority { first: String, second: String },
    /// A method's effective ready is constant false
    NeverReady { method: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::NoDeclaredPriority { first, second } => write!(
                f,
                "no priority declared between conflicting `{first}` and `{second}`; \
                 definition order decides"
            ),
            Warning::NeverReady { method } => {
                write!(f, "method `{method}` can never be ready")
            }
        }
    }
}

/// One transaction in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReport {
    pub name: String,
    /// Position in the static schedule order (0 = highest priority)
    pub schedule_position: usize,
    /// Names of conflicting transactions
    pub conflicts_with: Vec<String>,
}

/// One method in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodReport {
    pub name: String,
    pub nonexclusive: bool,
    /// How simultaneous callers merge onto the inputs
    pub merge: MergePlan,
    /// Direct callers, in definition order
    pub callers: Vec<String>,
}

/// One conflict edge with its causes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub first: String,
    pub second: String,
    pub causes: Vec<ConflictCause>,
}

/// One declared priority edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityReport {
    pub before: String,
    pub after: String,
}

/// The complete structural report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralReport {
    pub transactions: Vec<TransactionReport>,
    pub methods: Vec<MethodReport>,
    pub conflicts: Vec<ConflictReport>,
    pub priorities: Vec<PriorityReport>,
    pub warnings: Vec<Warning>,
}

impl StructuralReport {
    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for StructuralReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "transactions:")?;
        for txn in &self.transactions {
            writeln!(
                f,
                "  [{}] {} (conflicts: {})",
                txn.schedule_position,
                txn.name,
                if txn.conflicts_with.is_empty() {
                    "none".to_string()
                } else {
                    txn.conflicts_with.join(", ")
                }
            )?;
        }
        writeln!(f, "methods:")?;
        for method in &self.methods {
            writeln!(
                f,
                "  {} ({}; merge {:?}; callers: {})",
                method.name,
                if method.nonexclusive {
                    "nonexclusive"
                } else {
                    "exclusive"
                },
                method.merge,
                if method.callers.is_empty() {
                    "none".to_string()
                } else {
                    method.callers.join(", ")
                }
            )?;
        }
        writeln!(f, "conflicts:")?;
        for edge in &self.conflicts {
            let causes: Vec<String> = edge.causes.iter().map(|c| c.to_string()).collect();
            writeln!(
                f,
                "  {} <-> {} [{}]",
                edge.first,
                edge.second,
                causes.join(", ")
            )?;
        }
        writeln!(f, "priorities:")?;
        for edge in &self.priorities {
            writeln!(f, "  {} before {}", edge.before, edge.after)?;
        }
        writeln!(f, "warnings:")?;
        for warning in &self.warnings {
            writeln!(f, "  {warning}")?;
        }
        Ok(())
    }
}
