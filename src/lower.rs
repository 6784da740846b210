//! Lowering emitter
//!
//! Consumes grants and call graphs to produce the final netlist fragment:
//! run gating (`run = request AND grant AND readiness`), argument
//! multiplexers keyed by caller, result fan-out gated by per-site enables,
//! and ready/called signal composition for every method. Signal names are
//! stable and reconstructible from entity names, which is what the profiler
//! and the host integration key on.

use tracing::info;

use crate::callgraph::CallSite;
use crate::config::SchedulerConfig;
use crate::context::{ElabContext, MethodDef, TransactionDef};
use crate::error::{ElabError, ElabResult, SourceLoc};
use crate::netlist::{Bundle, Equation, NetId, Netlist, NetlistFragment};
use crate::report::{
    ConflictReport, MethodReport, PriorityReport, StructuralReport, TransactionReport,
};
use crate::resolver::{self, MergePlan};
use crate::scheduler;

/// The lowered design: netlist fragment plus the structural report
#[derive(Debug)]
pub struct Lowered {
    /// Combinational equations and state registers for the host
    pub fragment: NetlistFragment,
    /// Structural diagnostics
    pub report: StructuralReport,
}

/// `<txn>__request`
pub fn request_signal(transaction: &str) -> String {
    format!("{transaction}__request")
}

/// `<txn>__grant`
pub fn grant_signal(transaction: &str) -> String {
    format!("{transaction}__grant")
}

/// `<txn>__run`
pub fn run_signal(transaction: &str) -> String {
    format!("{transaction}__run")
}

/// `<method>__ready`
pub fn ready_signal(method: &str) -> String {
    format!("{method}__ready")
}

/// `<method>__called`
pub fn called_signal(method: &str) -> String {
    format!("{method}__called")
}

/// `<method>__calledby__<caller>`
pub fn called_by_signal(method: &str, caller: &str) -> String {
    format!("{method}__calledby__{caller}")
}

/// `<method>__in__<field>`
pub fn method_in_signal(method: &str, field: &str) -> String {
    format!("{method}__in__{field}")
}

/// `<method>__out__<field>`
pub fn method_out_signal(method: &str, field: &str) -> String {
    format!("{method}__out__{field}")
}

/// `<owner>__site<k>__<callee>__en`: result fan-out gate of one call site
pub fn site_enable_signal(owner: &str, index: usize, callee: &str) -> String {
    format!("{owner}__site{index}__{callee}__en")
}

/// One selector-gated call site, in deterministic owner order
struct GatedSite<'a> {
    owner_name: &'a str,
    sel: NetId,
    site: &'a CallSite,
}

pub(crate) fn run(ctx: &mut ElabContext, config: &SchedulerConfig) -> ElabResult<Lowered> {
    let resolutions = resolver::resolve(ctx)?;

    let ElabContext {
        net,
        transactions,
        methods,
        signatures,
        reducers,
        analysis,
        ..
    } = ctx;
    let analysis = match analysis.as_ref() {
        Some(analysis) => analysis,
        None => {
            return Err(ElabError::FrozenContext {
                operation: "lower before freeze".to_string(),
                loc: SourceLoc::here(),
            })
        }
    };

    let mut equations: Vec<Equation> = Vec::new();

    // Grants and transaction-level gating.
    let runnable: Vec<NetId> = transactions
        .iter()
        .enumerate()
        .map(|(i, txn)| net.and(txn.request, analysis.txn_ready[i]))
        .collect();
    let schedule = scheduler::synthesize(
        net,
        &runnable,
        &analysis.conflict,
        &analysis.priorities,
        config,
    );

    let mut txn_runs = Vec::with_capacity(transactions.len());
    for (i, txn) in transactions.iter().enumerate() {
        let grant = schedule.grants[i];
        let grant_ready = net.and(grant, analysis.txn_ready[i]);
        let run = net.and(txn.request, grant_ready);
        equations.push(Equation {
            name: request_signal(&txn.name),
            net: txn.request,
        });
        equations.push(Equation {
            name: grant_signal(&txn.name),
            net: grant,
        });
        equations.push(Equation {
            name: run_signal(&txn.name),
            net: run,
        });
        txn_runs.push(run);
    }

    // Run signals down the call graph: a method runs when any gated call
    // site selects it.
    let method_runs = compute_method_runs(net, transactions, methods, &txn_runs);

    // Gated sites per method, owners in definition order (transactions
    // first), plus per-site result fan-out enables.
    let mut gated: Vec<Vec<GatedSite<'_>>> = methods.iter().map(|_| Vec::new()).collect();
    for (t, txn) in transactions.iter().enumerate() {
        for (index, site) in txn.sites.iter().enumerate() {
            let sel = net.and(txn_runs[t], site.enable);
            let callee = &methods[site.callee as usize].name;
            equations.push(Equation {
                name: site_enable_signal(&txn.name, index, callee),
                net: sel,
            });
            gated[site.callee as usize].push(GatedSite {
                owner_name: &txn.name,
                sel,
                site,
            });
        }
    }
    for (k, method) in methods.iter().enumerate() {
        for (index, site) in method.sites.iter().enumerate() {
            let sel = net.and(method_runs[k], site.enable);
            let callee = &methods[site.callee as usize].name;
            equations.push(Equation {
                name: site_enable_signal(&method.name, index, callee),
                net: sel,
            });
            gated[site.callee as usize].push(GatedSite {
                owner_name: &method.name,
                sel,
                site,
            });
        }
    }

    // Per-method signals: input merge, output binding, called/ready, and
    // per-caller call indicators.
    for (m, def) in methods.iter().enumerate() {
        let signature = signatures.get(def.signature);
        let sites = &gated[m];

        let bound = match resolutions[m].plan {
            MergePlan::Unused => net.zero_bundle(&signature.input),
            MergePlan::Direct => sites[0].site.args.clone(),
            MergePlan::CallerMux => {
                let mut acc = net.zero_bundle(&signature.input);
                for gs in sites.iter().rev() {
                    acc = net.mux_bundle(gs.sel, &gs.site.args, &acc);
                }
                acc
            }
            MergePlan::OrReduce => {
                let mut fields = Vec::with_capacity(signature.input.fields.len());
                for (fi, field) in signature.input.fields.iter().enumerate() {
                    let tied = net.constant(0, field.width);
                    let mut acc = tied;
                    for gs in sites {
                        let arg = gs.site.args.fields[fi].1;
                        let gated_arg = net.mux(gs.sel, arg, tied);
                        acc = net.or(acc, gated_arg);
                    }
                    fields.push((field.name.clone(), acc));
                }
                Bundle { fields }
            }
            MergePlan::CustomReduce => {
                // Fold pairwise; until a first live site is folded in, the
                // accumulator is not a real value, so take the site's
                // arguments unreduced.
                let mut acc = net.zero_bundle(&signature.input);
                let mut any = net.zero();
                for gs in sites {
                    if let Some(reducer) = reducers.get(&(m as u32)) {
                        let combined = reducer(net, &acc, &gs.site.args);
                        let chosen = net.mux_bundle(any, &combined, &gs.site.args);
                        acc = net.mux_bundle(gs.sel, &chosen, &acc);
                        any = net.or(any, gs.sel);
                    }
                }
                acc
            }
        };
        for (field, (_, expr)) in signature.input.fields.iter().zip(&bound.fields) {
            equations.push(Equation {
                name: method_in_signal(&def.name, &field.name),
                net: *expr,
            });
        }

        let out = match &def.body_out {
            Some(out) => out.clone(),
            None => net.zero_bundle(&signature.output),
        };
        for (field, (_, expr)) in signature.output.fields.iter().zip(&out.fields) {
            equations.push(Equation {
                name: method_out_signal(&def.name, &field.name),
                net: *expr,
            });
        }

        equations.push(Equation {
            name: called_signal(&def.name),
            net: method_runs[m],
        });
        equations.push(Equation {
            name: ready_signal(&def.name),
            net: analysis.method_ready[m],
        });

        // Per-caller indicators, owners in first-appearance order.
        let mut owners: Vec<(&str, Vec<NetId>)> = Vec::new();
        for gs in sites {
            match owners.iter_mut().find(|(name, _)| *name == gs.owner_name) {
                Some((_, sels)) => sels.push(gs.sel),
                None => owners.push((gs.owner_name, vec![gs.sel])),
            }
        }
        for (owner, sels) in owners {
            let indicator = net.or_all(sels);
            equations.push(Equation {
                name: called_by_signal(&def.name, owner),
                net: indicator,
            });
        }
    }

    let report = StructuralReport {
        transactions: transactions
            .iter()
            .enumerate()
            .map(|(i, txn)| TransactionReport {
                name: txn.name.clone(),
                schedule_position: schedule.position[i],
                conflicts_with: analysis
                    .conflict
                    .neighbors(i as u32)
                    .into_iter()
                    .map(|o| transactions[o as usize].name.clone())
                    .collect(),
            })
            .collect(),
        methods: methods
            .iter()
            .enumerate()
            .map(|(m, def)| MethodReport {
                name: def.name.clone(),
                nonexclusive: signatures.get(def.signature).nonexclusive,
                merge: resolutions[m].plan,
                callers: resolutions[m].callers.clone(),
            })
            .collect(),
        conflicts: analysis
            .conflict
            .edges()
            .map(|(a, b, causes)| ConflictReport {
                first: transactions[a as usize].name.clone(),
                second: transactions[b as usize].name.clone(),
                causes: causes.to_vec(),
            })
            .collect(),
        priorities: analysis
            .priorities
            .iter()
            .map(|&(before, after)| PriorityReport {
                before: transactions[before as usize].name.clone(),
                after: transactions[after as usize].name.clone(),
            })
            .collect(),
        warnings: analysis.warnings.clone(),
    };

    let fragment = NetlistFragment::new(net, equations, schedule.registers);
    info!(
        equations = fragment.equations.len(),
        registers = fragment.registers.len(),
        nodes = fragment.nodes.len(),
        "lowered design"
    );
    Ok(Lowered { fragment, report })
}

/// Run of every method: OR over call sites of `run(owner) AND enable`,
/// memoized over the acyclic call graph
fn compute_method_runs(
    net: &mut Netlist,
    transactions: &[TransactionDef],
    methods: &[MethodDef],
    txn_runs: &[NetId],
) -> Vec<NetId> {
    fn go(
        m: usize,
        net: &mut Netlist,
        transactions: &[TransactionDef],
        methods: &[MethodDef],
        txn_runs: &[NetId],
        memo: &mut Vec<Option<NetId>>,
    ) -> NetId {
        if let Some(done) = memo[m] {
            return done;
        }
        let mut sels = Vec::new();
        for (t, txn) in transactions.iter().enumerate() {
            for site in &txn.sites {
                if site.callee as usize == m {
                    sels.push(net.and(txn_runs[t], site.enable));
                }
            }
        }
        for k in 0..methods.len() {
            let enables: Vec<NetId> = methods[k]
                .sites
                .iter()
                .filter(|site| site.callee as usize == m)
                .map(|site| site.enable)
                .collect();
            if !enables.is_empty() {
                let owner_run = go(k, net, transactions, methods, txn_runs, memo);
                for enable in enables {
                    sels.push(net.and(owner_run, enable));
                }
            }
        }
        let run = net.or_all(sels);
        memo[m] = Some(run);
        run
    }

    let mut memo = vec![None; methods.len()];
    (0..methods.len())
        .map(|m| go(m, net, transactions, methods, txn_runs, &mut memo))
        .collect()
}
