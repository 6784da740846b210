//! Method resolver
//!
//! Assigns, for each method, the set of callers that may drive it in a given
//! cycle and decides how multiple callers merge: a caller-select mux for
//! exclusive methods, a combining reducer for nonexclusive ones.

use serde::{Deserialize, Serialize};

use crate::context::ElabContext;
use crate::error::{ElabError, ElabResult};

/// How a method's simultaneous callers are merged onto its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePlan {
    /// No callers: inputs are tied off
    Unused,
    /// A single call site drives the inputs directly
    Direct,
    /// Exclusive with several sites: mux indexed by the gated selectors
    CallerMux,
    /// Nonexclusive: boolean-OR fold over selector-gated arguments
    OrReduce,
    /// Nonexclusive: designer-declared commutative reducer
    CustomReduce,
}

/// Resolution of one method
#[derive(Debug, Clone)]
pub(crate) struct MethodResolution {
    pub plan: MergePlan,
    /// Direct caller names (transactions and methods), deduplicated, in
    /// definition order
    pub callers: Vec<String>,
}

/// Classify every method and pick its merge plan
///
/// Fails with `UnmergedNonexclusive` when a nonexclusive method has several
/// callers, carries a field that boolean OR cannot merge, and no custom
/// reducer was declared.
pub(crate) fn resolve(ctx: &ElabContext) -> ElabResult<Vec<MethodResolution>> {
    let n = ctx.methods.len();
    let mut site_counts = vec![0usize; n];
    let mut callers: Vec<Vec<String>> = vec![Vec::new(); n];

    fn record(m: usize, owner: &str, counts: &mut [usize], callers: &mut [Vec<String>]) {
        counts[m] += 1;
        if !callers[m].iter().any(|c| c == owner) {
            callers[m].push(owner.to_string());
        }
    }

    for txn in &ctx.transactions {
        for site in &txn.sites {
            record(site.callee as usize, &txn.name, &mut site_counts, &mut callers);
        }
    }
    for method in &ctx.methods {
        for site in &method.sites {
            record(site.callee as usize, &method.name, &mut site_counts, &mut callers);
        }
    }

    let mut resolutions = Vec::with_capacity(n);
    for (m, def) in ctx.methods.iter().enumerate() {
        let signature = ctx.signatures.get(def.signature);
        let plan = if site_counts[m] == 0 {
            MergePlan::Unused
        } else if site_counts[m] == 1 {
            MergePlan::Direct
        } else if !signature.nonexclusive {
            MergePlan::CallerMux
        } else if ctx.reducers.contains_key(&(m as u32)) {
            MergePlan::CustomReduce
        } else if signature.input.or_reducible() {
            MergePlan::OrReduce
        } else {
            return Err(ElabError::UnmergedNonexclusive {
                method: def.name.clone(),
                callers: site_counts[m],
                loc: def.loc,
            });
        };
        resolutions.push(MethodResolution {
            plan,
            callers: callers[m].clone(),
        });
    }
    Ok(resolutions)
}
