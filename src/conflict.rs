//! Conflict and priority graphs
//!
//! Conflicts are derived in two passes: implicit edges between transactions
//! whose call closures share an exclusive method under possibly overlapping
//! enables, then explicit designer declarations. Enables are treated as
//! opaque boolean symbols unless their structure proves two call conditions
//! disjoint (complementary literals, the `when`/`otherwise` shape); absent
//! such a witness, overlap is conservatively assumed. False conflicts waste
//! parallelism but never violate atomicity.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::callgraph::{CallSite, Reachability};
use crate::context::{MethodDef, TransactionDef};
use crate::error::{ElabError, ElabResult};
use crate::netlist::{NetId, Netlist, Node};
use crate::report::Warning;
use crate::signature::SignatureRegistry;

/// Why two transactions conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictCause {
    /// Both reach the named exclusive method under satisfiable enables
    SharedMethod(String),
    /// Declared by the designer
    Declared,
}

impl std::fmt::Display for ConflictCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictCause::SharedMethod(name) => write!(f, "shared:{name}"),
            ConflictCause::Declared => write!(f, "declared"),
        }
    }
}

/// Undirected conflict graph over transactions, edges labeled by cause
#[derive(Debug, Default)]
pub struct ConflictGraph {
    n: usize,
    edges: BTreeMap<(u32, u32), Vec<ConflictCause>>,
}

impl ConflictGraph {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            n,
            edges: BTreeMap::new(),
        }
    }

    fn key(a: u32, b: u32) -> (u32, u32) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub(crate) fn add_cause(&mut self, a: u32, b: u32, cause: ConflictCause) {
        if a == b {
            return;
        }
        let causes = self.edges.entry(Self::key(a, b)).or_default();
        if !causes.contains(&cause) {
            causes.push(cause);
        }
    }

    /// True when `a` and `b` must not be granted together
    pub fn conflicts(&self, a: u32, b: u32) -> bool {
        a != b && self.edges.contains_key(&Self::key(a, b))
    }

    /// Number of conflict edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges with their causes, in deterministic order
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32, &[ConflictCause])> {
        self.edges
            .iter()
            .map(|(&(a, b), causes)| (a, b, causes.as_slice()))
    }

    /// Conflict partners of one transaction
    pub fn neighbors(&self, t: u32) -> Vec<u32> {
        self.edges
            .keys()
            .filter_map(|&(a, b)| {
                if a == t {
                    Some(b)
                } else if b == t {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Connected components, each sorted, components ordered by first member
    ///
    /// Transactions in different components never interact in the arbiter,
    /// so each component gets an independent grant cascade.
    pub fn components(&self) -> Vec<Vec<u32>> {
        if self.n == 0 {
            return Vec::new();
        }
        let mut uf = UnionFind::<u32>::new(self.n);
        for &(a, b) in self.edges.keys() {
            uf.union(a, b);
        }
        let mut grouped: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for t in 0..self.n as u32 {
            grouped.entry(uf.find(t)).or_default().push(t);
        }
        let mut components: Vec<Vec<u32>> = grouped.into_values().collect();
        components.sort_by_key(|c| c[0]);
        components
    }
}

/// Build conflict graph, deduplicated priority edges, and warnings
pub(crate) fn build(
    net: &mut Netlist,
    txns: &[TransactionDef],
    methods: &[MethodDef],
    signatures: &SignatureRegistry,
    explicit: &[(u32, u32, crate::error::SourceLoc)],
    priority_hints: &[(u32, u32, crate::error::SourceLoc)],
) -> ElabResult<(ConflictGraph, Vec<(u32, u32)>, Vec<Warning>)> {
    let method_sites: Vec<Vec<CallSite>> = methods.iter().map(|m| m.sites.clone()).collect();
    let reach = Reachability::new(&method_sites);
    let mut graph = ConflictGraph::new(txns.len());

    // Implicit pass: shared exclusive methods with satisfiable enables.
    for (m_idx, method) in methods.iter().enumerate() {
        if signatures.get(method.signature).nonexclusive {
            continue;
        }
        let mut reaching: Vec<(u32, NetId)> = Vec::new();
        for (t_idx, txn) in txns.iter().enumerate() {
            if let Some(cond) = reach.from_root(net, &txn.sites, m_idx as u32) {
                reaching.push((t_idx as u32, cond));
            }
        }
        check_exclusive_sites(net, txns, methods, &reach, m_idx as u32)?;
        for i in 0..reaching.len() {
            for j in (i + 1)..reaching.len() {
                let (t1, c1) = reaching[i];
                let (t2, c2) = reaching[j];
                if !structurally_disjoint(net, c1, c2) {
                    graph.add_cause(t1, t2, ConflictCause::SharedMethod(method.name.clone()));
                }
            }
        }
    }

    // Explicit pass.
    for &(a, b, _) in explicit {
        graph.add_cause(a, b, ConflictCause::Declared);
    }

    let priorities = check_priorities(txns, priority_hints)?;

    // Conflicting pairs with no declared order get the deterministic
    // tiebreak; surface that as a warning, not a failure.
    let priority_set: BTreeSet<(u32, u32)> = priorities.iter().copied().collect();
    let mut warnings = Vec::new();
    for (a, b, _) in graph.edges() {
        if !priority_set.contains(&(a, b)) && !priority_set.contains(&(b, a)) {
            warnings.push(Warning::NoDeclaredPriority {
                first: txns[a as usize].name.clone(),
                second: txns[b as usize].name.clone(),
            });
        }
    }

    debug!(
        edges = graph.edge_count(),
        priorities = priorities.len(),
        "built conflict graph"
    );
    Ok((graph, priorities, warnings))
}

/// Reject overlapping call sites that could drive one exclusive method twice
/// in a cycle under a single granted root
fn check_exclusive_sites(
    net: &mut Netlist,
    txns: &[TransactionDef],
    methods: &[MethodDef],
    reach: &Reachability<'_>,
    target: u32,
) -> ElabResult<()> {
    // Every site targeting `target`, with its owner.
    enum SiteOwner {
        Txn(u32),
        Method(u32),
    }
    let mut sites: Vec<(SiteOwner, NetId, crate::error::SourceLoc)> = Vec::new();
    for (t, txn) in txns.iter().enumerate() {
        for site in &txn.sites {
            if site.callee == target {
                sites.push((SiteOwner::Txn(t as u32), site.enable, site.loc));
            }
        }
    }
    for (m, method) in methods.iter().enumerate() {
        for site in &method.sites {
            if site.callee == target {
                sites.push((SiteOwner::Method(m as u32), site.enable, site.loc));
            }
        }
    }
    if sites.len() < 2 {
        return Ok(());
    }

    // Root condition of a site under transaction `t`: the path condition to
    // its owner ANDed with the site enable; None when `t` cannot reach it.
    let root_cond = |net: &mut Netlist, owner: &SiteOwner, enable: NetId, t: u32| -> Option<NetId> {
        match owner {
            SiteOwner::Txn(owner_t) => (*owner_t == t).then_some(enable),
            SiteOwner::Method(m) => reach
                .from_root(net, &txns[t as usize].sites, *m)
                .map(|via| net.and(via, enable)),
        }
    };

    for i in 0..sites.len() {
        for j in (i + 1)..sites.len() {
            for t in 0..txns.len() as u32 {
                let (owner_i, enable_i, _) = &sites[i];
                let a = root_cond(net, owner_i, *enable_i, t);
                let (owner_j, enable_j, loc_j) = &sites[j];
                let loc_j = *loc_j;
                let b = root_cond(net, owner_j, *enable_j, t);
                if let (Some(a), Some(b)) = (a, b) {
                    if !structurally_disjoint(net, a, b) {
                        return Err(ElabError::ConflictingCallSites {
                            caller: txns[t as usize].name.clone(),
                            method: methods[target as usize].name.clone(),
                            loc: loc_j,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Validate priority hints and return them deduplicated
pub(crate) fn check_priorities(
    txns: &[TransactionDef],
    hints: &[(u32, u32, crate::error::SourceLoc)],
) -> ElabResult<Vec<(u32, u32)>> {
    let mut deduped: BTreeSet<(u32, u32)> = BTreeSet::new();
    let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
    for t in 0..txns.len() as u32 {
        graph.add_node(t);
    }
    for &(before, after, _) in hints {
        if before == after {
            let name = txns[before as usize].name.clone();
            return Err(ElabError::PriorityCycle {
                cycle: vec![name.clone(), name],
            });
        }
        deduped.insert((before, after));
        graph.add_edge(before, after, ());
    }

    for scc in tarjan_scc(&graph) {
        if scc.len() > 1 {
            let mut cycle: Vec<String> = scc
                .iter()
                .rev()
                .map(|&t| txns[t as usize].name.clone())
                .collect();
            let first = cycle[0].clone();
            cycle.push(first);
            return Err(ElabError::PriorityCycle { cycle });
        }
    }
    Ok(deduped.into_iter().collect())
}

const DNF_CONJUNCT_CAP: usize = 64;

/// One conjunct: literal net -> polarity; an empty conjunct is `true`
type Conjunct = BTreeMap<u32, bool>;

fn literal(id: NetId, polarity: bool) -> Vec<Conjunct> {
    let mut conjunct = Conjunct::new();
    conjunct.insert(id.0, polarity);
    vec![conjunct]
}

fn cross(a: &[Conjunct], b: &[Conjunct]) -> Option<Vec<Conjunct>> {
    let mut out = Vec::new();
    for ca in a {
        'next: for cb in b {
            let mut merged = ca.clone();
            for (&net, &polarity) in cb {
                match merged.get(&net) {
                    Some(&existing) if existing != polarity => continue 'next,
                    _ => {
                        merged.insert(net, polarity);
                    }
                }
            }
            out.push(merged);
            if out.len() > DNF_CONJUNCT_CAP {
                return None;
            }
        }
    }
    Some(out)
}

fn union(a: Vec<Conjunct>, b: Vec<Conjunct>) -> Option<Vec<Conjunct>> {
    let mut out = a;
    out.extend(b);
    if out.len() > DNF_CONJUNCT_CAP {
        None
    } else {
        Some(out)
    }
}

/// Flatten a one-bit predicate into OR-of-AND literal form
fn dnf(net: &Netlist, id: NetId) -> Option<Vec<Conjunct>> {
    match net.node(id) {
        Node::Const { value: 0, .. } => Some(Vec::new()),
        Node::Const { .. } => Some(vec![Conjunct::new()]),
        Node::Var { .. } | Node::Eq(..) => Some(literal(id, true)),
        Node::And(a, b) => cross(&dnf(net, *a)?, &dnf(net, *b)?),
        Node::Or(a, b) => union(dnf(net, *a)?, dnf(net, *b)?),
        Node::Not(x) => neg_dnf(net, *x),
        Node::Mux {
            sel,
            on_true,
            on_false,
        } => {
            let taken = cross(&dnf(net, *sel)?, &dnf(net, *on_true)?)?;
            let skipped = cross(&neg_dnf(net, *sel)?, &dnf(net, *on_false)?)?;
            union(taken, skipped)
        }
    }
}

/// Flatten the negation of a one-bit predicate
fn neg_dnf(net: &Netlist, id: NetId) -> Option<Vec<Conjunct>> {
    match net.node(id) {
        Node::Const { value: 0, .. } => Some(vec![Conjunct::new()]),
        Node::Const { .. } => Some(Vec::new()),
        Node::Var { .. } | Node::Eq(..) => Some(literal(id, false)),
        Node::And(a, b) => union(neg_dnf(net, *a)?, neg_dnf(net, *b)?),
        Node::Or(a, b) => cross(&neg_dnf(net, *a)?, &neg_dnf(net, *b)?),
        Node::Not(x) => dnf(net, *x),
        Node::Mux {
            sel,
            on_true,
            on_false,
        } => {
            let taken = cross(&dnf(net, *sel)?, &neg_dnf(net, *on_true)?)?;
            let skipped = cross(&neg_dnf(net, *sel)?, &neg_dnf(net, *on_false)?)?;
            union(taken, skipped)
        }
    }
}

fn contradicts(a: &Conjunct, b: &Conjunct) -> bool {
    a.iter().any(|(net, &polarity)| b.get(net) == Some(&!polarity))
}

/// True when the two predicates can be *proven* never simultaneously true
///
/// Proof is purely structural; anything past the flattening cap is reported
/// as overlapping, which is safe.
pub(crate) fn structurally_disjoint(net: &Netlist, a: NetId, b: NetId) -> bool {
    match (dnf(net, a), dnf(net, b)) {
        (Some(da), Some(db)) => da
            .iter()
            .all(|ca| db.iter().all(|cb| contradicts(ca, cb))),
        _ => false,
    }
}
