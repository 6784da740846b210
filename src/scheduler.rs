//! Scheduler synthesizer
//!
//! Emits, per transaction, a grant signal such that a grant implies the
//! transaction is runnable and no two conflicting grants coexist. The
//! algorithm is a greedy priority arbiter over a static order: computing a
//! maximum runnable set each cycle would mean solving maximum independent
//! set in hardware, which the contract explicitly rejects. Greedy with
//! declared priorities gives local control and keeps the emitted logic
//! O(n^2) gates worst case, sparse in practice because conflict graphs are
//! sparse.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use tracing::debug;

use crate::config::{SchedulerConfig, TieBreak};
use crate::conflict::ConflictGraph;
use crate::netlist::{NetId, Netlist, RegisterSpec};

/// The synthesized schedule
pub(crate) struct Schedule {
    /// Total priority order over all transactions (definition-order ties)
    pub order: Vec<u32>,
    /// Position of each transaction in `order`
    pub position: Vec<usize>,
    /// Grant net per transaction
    pub grants: Vec<NetId>,
    /// Round-robin pointer registers, if any
    pub registers: Vec<RegisterSpec>,
}

/// Emit grant logic for every transaction
pub(crate) fn synthesize(
    net: &mut Netlist,
    runnable: &[NetId],
    conflict: &ConflictGraph,
    priorities: &[(u32, u32)],
    config: &SchedulerConfig,
) -> Schedule {
    let n = runnable.len();
    let all: Vec<u32> = (0..n as u32).collect();
    let order = deterministic_topo(&all, priorities, |t| u64::from(t));
    let mut position = vec![0usize; n];
    for (pos, &t) in order.iter().enumerate() {
        position[t as usize] = pos;
    }

    let mut registers = Vec::new();
    let grants = match config.tie_break {
        TieBreak::DefinitionOrder => cascade(net, runnable, conflict, &order),
        TieBreak::RoundRobin => {
            round_robin(net, runnable, conflict, priorities, &mut registers)
        }
    };

    debug!(
        transactions = n,
        mode = ?config.tie_break,
        registers = registers.len(),
        "synthesized schedule"
    );
    Schedule {
        order,
        position,
        grants,
        registers,
    }
}

/// Greedy cascade over one static order: each grant blocks every later
/// conflicting transaction
fn cascade(
    net: &mut Netlist,
    runnable: &[NetId],
    conflict: &ConflictGraph,
    order: &[u32],
) -> Vec<NetId> {
    let mut position = vec![0usize; runnable.len()];
    for (pos, &t) in order.iter().enumerate() {
        position[t as usize] = pos;
    }
    let mut grants = vec![None; runnable.len()];
    for &t in order {
        let mut terms = vec![runnable[t as usize]];
        for earlier in conflict.neighbors(t) {
            if position[earlier as usize] < position[t as usize] {
                if let Some(blocker) = grants[earlier as usize] {
                    terms.push(net.not(blocker));
                }
            }
        }
        grants[t as usize] = Some(net.and_all(terms));
    }
    grants
        .into_iter()
        .map(|g| g.unwrap_or_else(|| NetId(0)))
        .collect()
}

/// Per-component rotating arbiter
///
/// Each conflict component of size k gets a one-hot pointer of k one-bit
/// registers advancing every cycle. For each pointer value the component's
/// cascade is synthesized with a rotated tie-break; the live rotation is
/// selected by the pointer bits. Declared priorities hold in every rotation,
/// so rotation only reorders otherwise-unordered transactions.
fn round_robin(
    net: &mut Netlist,
    runnable: &[NetId],
    conflict: &ConflictGraph,
    priorities: &[(u32, u32)],
    registers: &mut Vec<RegisterSpec>,
) -> Vec<NetId> {
    let mut grants = vec![None; runnable.len()];
    for (comp_index, comp) in conflict.components().iter().enumerate() {
        let k = comp.len();
        if k == 1 {
            let t = comp[0];
            grants[t as usize] = Some(runnable[t as usize]);
            continue;
        }

        let members: BTreeSet<u32> = comp.iter().copied().collect();
        let local: Vec<(u32, u32)> = priorities
            .iter()
            .filter(|(a, b)| members.contains(a) && members.contains(b))
            .copied()
            .collect();
        let rank: BTreeMap<u32, usize> =
            comp.iter().enumerate().map(|(i, &t)| (t, i)).collect();

        // One-hot pointer: ptr[i] high means rotation i is live this cycle.
        let ptr_vars: Vec<NetId> = (0..k)
            .map(|i| net.var(format!("sched__rr{comp_index}__ptr{i}"), 1))
            .collect();
        for i in 0..k {
            registers.push(RegisterSpec {
                name: format!("sched__rr{comp_index}__ptr{i}"),
                init: i == 0,
                next: ptr_vars[(i + k - 1) % k],
            });
        }

        let mut selected: BTreeMap<u32, Vec<NetId>> =
            comp.iter().map(|&t| (t, Vec::new())).collect();
        for (r, &ptr) in ptr_vars.iter().enumerate() {
            let order_r = deterministic_topo(comp, &local, |t| ((rank[&t] + k - r) % k) as u64);
            let rotation = cascade_subset(net, runnable, conflict, &order_r);
            for (&t, &grant_r) in order_r.iter().zip(rotation.iter()) {
                let gated = net.and(ptr, grant_r);
                if let Some(terms) = selected.get_mut(&t) {
                    terms.push(gated);
                }
            }
        }
        for (&t, terms) in &selected {
            let grant = net.or_all(terms.iter().copied());
            grants[t as usize] = Some(grant);
        }
    }
    grants
        .into_iter()
        .map(|g| g.unwrap_or_else(|| NetId(0)))
        .collect()
}

/// Cascade over a component-local order; returns grants in order position
fn cascade_subset(
    net: &mut Netlist,
    runnable: &[NetId],
    conflict: &ConflictGraph,
    order: &[u32],
) -> Vec<NetId> {
    let mut granted: BTreeMap<u32, NetId> = BTreeMap::new();
    let mut out = Vec::with_capacity(order.len());
    for (pos, &t) in order.iter().enumerate() {
        let mut terms = vec![runnable[t as usize]];
        for &earlier in &order[..pos] {
            if conflict.conflicts(t, earlier) {
                if let Some(&blocker) = granted.get(&earlier) {
                    terms.push(net.not(blocker));
                }
            }
        }
        let grant = net.and_all(terms);
        granted.insert(t, grant);
        out.push(grant);
    }
    out
}

/// Deterministic Kahn topological sort: among ready nodes, the smallest key
/// (then smallest index) leaves first
fn deterministic_topo(
    members: &[u32],
    edges: &[(u32, u32)],
    key: impl Fn(u32) -> u64,
) -> Vec<u32> {
    let member_set: BTreeSet<u32> = members.iter().copied().collect();
    let mut succs: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut indegree: BTreeMap<u32, usize> = members.iter().map(|&t| (t, 0)).collect();
    for &(before, after) in edges {
        if member_set.contains(&before) && member_set.contains(&after) {
            succs.entry(before).or_default().push(after);
            if let Some(d) = indegree.get_mut(&after) {
                *d += 1;
            }
        }
    }

    let mut heap: BinaryHeap<Reverse<(u64, u32)>> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&t, _)| Reverse((key(t), t)))
        .collect();
    let mut order = Vec::with_capacity(members.len());
    while let Some(Reverse((_, t))) = heap.pop() {
        order.push(t);
        if let Some(nexts) = succs.get(&t) {
            for &next in nexts {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        heap.push(Reverse((key(next), next)));
                    }
                }
            }
        }
    }
    // Priority cycles are rejected at freeze; a stuck sort cannot happen on
    // validated input, but stay total anyway.
    if order.len() < members.len() {
        let placed: BTreeSet<u32> = order.iter().copied().collect();
        let mut rest: Vec<u32> = members
            .iter()
            .copied()
            .filter(|t| !placed.contains(t))
            .collect();
        rest.sort_by_key(|&t| (key(t), t));
        order.extend(rest);
    }
    order
}
