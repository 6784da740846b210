//! Transaction manager and scheduler synthesizer for method-based hardware
//! design
//!
//! This crate provides the compile-time core of a transaction framework for
//! synchronous digital circuits:
//! - Registers methods (latency-insensitive actions with ready handshakes)
//!   and transactions (single-cycle atomic actions) in an elaboration context
//! - Records call graphs with per-site enable provenance
//! - Derives conflicts from shared exclusive methods and explicit
//!   declarations, with structural mutual-exclusion witnesses
//! - Synthesizes a greedy priority arbiter (definition-order or round-robin
//!   tie-break) guaranteeing exclusivity and progress
//! - Lowers everything to combinational equations over a small netlist IR,
//!   with a structural report and a per-cycle profile artifact
//!
//! Elaboration is single-threaded and runs to completion or fails; the
//! emitted hardware is fully parallel, with the conflict graph compiled into
//! combinational gating.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod callgraph;
pub mod config;
pub mod conflict;
pub mod context;
pub mod error;
pub mod eval;
pub mod layout;
pub mod lower;
pub mod netlist;
pub mod profile;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod signature;

pub use config::{SchedulerConfig, TieBreak};
pub use conflict::{ConflictCause, ConflictGraph};
pub use context::{BodyCtx, Caller, ElabContext, MethodId, TransactionId};
pub use error::{ElabError, ElabResult, SourceLoc};
pub use eval::{EvalError, Simulator};
pub use layout::{Field, Layout};
pub use lower::Lowered;
pub use netlist::{Bundle, Equation, NetId, NetlistFragment, Node, RegisterSpec};
pub use profile::{CycleRecord, MethodSample, ProfileError, Profiler, TransactionSample};
pub use report::{StructuralReport, Warning};
pub use resolver::MergePlan;
pub use signature::{Signature, SignatureId, SignatureRegistry};
