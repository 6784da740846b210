//! Profile artifact
//!
//! Emits one JSON record per simulation cycle covering every transaction
//! (request / grant / locked) and every method (ready, who called it). The
//! record set is complete by construction: names are taken from the
//! structural report, so a transaction or method can never be missing from a
//! cycle record. Records are written as JSON Lines to any writer.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::{EvalError, Simulator};
use crate::lower::{self, Lowered};

/// Profiling failures
#[derive(Error, Debug)]
pub enum ProfileError {
    /// A probe signal failed to evaluate
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// The sink failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Serialization failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Per-cycle state of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSample {
    pub request: bool,
    pub grant: bool,
    /// Requested but not granted this cycle
    pub locked: bool,
}

/// Per-cycle state of one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSample {
    /// Callers whose gated call sites selected this method this cycle
    pub called_by: Vec<String>,
    pub ready: bool,
}

/// One profile record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u64,
    pub transactions: BTreeMap<String, TransactionSample>,
    pub methods: BTreeMap<String, MethodSample>,
}

/// Samples a simulator each cycle and appends JSON Lines to a writer
pub struct Profiler<W: Write> {
    writer: W,
    transactions: Vec<String>,
    /// Method name with its potential callers
    methods: Vec<(String, Vec<String>)>,
}

impl<W: Write> Profiler<W> {
    /// Build a profiler over a lowered design
    pub fn new(lowered: &Lowered, writer: W) -> Self {
        let transactions = lowered
            .report
            .transactions
            .iter()
            .map(|t| t.name.clone())
            .collect();
        let methods = lowered
            .report
            .methods
            .iter()
            .map(|m| (m.name.clone(), m.callers.clone()))
            .collect();
        Self {
            writer,
            transactions,
            methods,
        }
    }

    /// Sample the simulator's current cycle and append one record
    pub fn sample(&mut self, sim: &Simulator) -> Result<CycleRecord, ProfileError> {
        let mut transactions = BTreeMap::new();
        for name in &self.transactions {
            let request = sim.get_bool(&lower::request_signal(name))?;
            let grant = sim.get_bool(&lower::grant_signal(name))?;
            transactions.insert(
                name.clone(),
                TransactionSample {
                    request,
                    grant,
                    locked: request && !grant,
                },
            );
        }

        let mut methods = BTreeMap::new();
        for (name, callers) in &self.methods {
            let ready = sim.get_bool(&lower::ready_signal(name))?;
            let mut called_by = Vec::new();
            for caller in callers {
                if sim.get_bool(&lower::called_by_signal(name, caller))? {
                    called_by.push(caller.clone());
                }
            }
            methods.insert(name.clone(), MethodSample { called_by, ready });
        }

        let record = CycleRecord {
            cycle: sim.cycle(),
            transactions,
            methods,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(record)
    }

    /// Flush and hand back the writer
    pub fn into_writer(mut self) -> Result<W, ProfileError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
