//! Call-graph builder
//!
//! Records, per transaction and per method, the set of method invocations
//! made from its body. Each call site carries an *enable* predicate: the
//! conjunction of the guards in force at the point of the call (nested
//! conditional regions AND together). The builder also derives the summaries
//! the later passes need: `called_under` per callee, effective readiness over
//! the acyclic method graph, and reachability conditions for conflict
//! analysis.

use std::collections::BTreeMap;

use crate::error::{ElabError, ElabResult, SourceLoc};
use crate::netlist::{Bundle, NetId, Netlist};

/// Owner of an open body, as raw context indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Owner {
    Transaction(u32),
    Method(u32),
}

/// One recorded method invocation
#[derive(Debug, Clone)]
pub(crate) struct CallSite {
    /// Callee method index
    pub callee: u32,
    /// Guard under which the call is live this cycle
    pub enable: NetId,
    /// Argument record, meaningful only when `enable` holds
    pub args: Bundle,
    /// Where the call was recorded
    pub loc: SourceLoc,
}

/// A body currently being elaborated
#[derive(Debug)]
pub(crate) struct BodyFrame {
    pub owner: Owner,
    /// Guards in force, innermost last
    pub guards: Vec<NetId>,
    pub sites: Vec<CallSite>,
    /// Local ready expression; defaults to constant 1 when never set
    pub ready: Option<NetId>,
}

/// Stack of open bodies
#[derive(Debug, Default)]
pub(crate) struct CallGraphBuilder {
    stack: Vec<BodyFrame>,
}

impl CallGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, owner: Owner) {
        self.stack.push(BodyFrame {
            owner,
            guards: Vec::new(),
            sites: Vec::new(),
            ready: None,
        });
    }

    /// Close the innermost body and hand back its frame
    pub fn close(&mut self) -> Option<BodyFrame> {
        self.stack.pop()
    }

    pub fn is_open(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Record a call in the innermost open body
    pub fn record(
        &mut self,
        net: &mut Netlist,
        callee: u32,
        callee_name: &str,
        enable: NetId,
        args: Bundle,
        loc: SourceLoc,
    ) -> ElabResult<()> {
        let guards = match self.stack.last() {
            Some(frame) => frame.guards.clone(),
            None => {
                return Err(ElabError::OrphanCall {
                    callee: callee_name.to_string(),
                    loc,
                })
            }
        };
        let under_guards = net.and_all(guards);
        let enable = net.and(under_guards, enable);
        if let Some(frame) = self.stack.last_mut() {
            frame.sites.push(CallSite {
                callee,
                enable,
                args,
                loc,
            });
        }
        Ok(())
    }

    pub fn push_guard(&mut self, guard: NetId) -> ElabResult<()> {
        match self.stack.last_mut() {
            Some(frame) => {
                frame.guards.push(guard);
                Ok(())
            }
            None => Err(ElabError::OrphanCall {
                callee: "<guard>".to_string(),
                loc: SourceLoc::here(),
            }),
        }
    }

    pub fn pop_guard(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.guards.pop();
        }
    }

    pub fn set_ready(&mut self, ready: NetId) {
        if let Some(frame) = self.stack.last_mut() {
            frame.ready = Some(ready);
        }
    }
}

/// `called_under[callee]` = OR of the enables of each call site to `callee`
pub(crate) fn called_under(net: &mut Netlist, sites: &[CallSite]) -> BTreeMap<u32, NetId> {
    let mut grouped: BTreeMap<u32, Vec<NetId>> = BTreeMap::new();
    for site in sites {
        grouped.entry(site.callee).or_default().push(site.enable);
    }
    grouped
        .into_iter()
        .map(|(callee, enables)| (callee, net.or_all(enables)))
        .collect()
}

/// Find a cycle in the method call graph, if any, as a name path
///
/// Standard iterative DFS with a three-color marker. Hardware readiness must
/// be statically determinable, so cycles among methods are rejected outright.
pub(crate) fn find_method_cycle(
    names: &[String],
    method_sites: &[Vec<CallSite>],
) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let n = method_sites.len();
    let mut color = vec![Color::White; n];
    let mut parent: Vec<Option<usize>> = vec![None; n];

    for root in 0..n {
        if color[root] != Color::White {
            continue;
        }
        // (node, next child index)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = Color::Gray;
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if top.1 < method_sites[node].len() {
                let next = method_sites[node][top.1].callee as usize;
                top.1 += 1;
                match color[next] {
                    Color::Gray => {
                        // Back edge: walk parents from `node` to `next`
                        let mut path = vec![next];
                        let mut cursor = node;
                        while cursor != next {
                            path.push(cursor);
                            cursor = match parent[cursor] {
                                Some(p) => p,
                                None => break,
                            };
                        }
                        path.push(next);
                        path.reverse();
                        return Some(path.into_iter().map(|i| names[i].clone()).collect());
                    }
                    Color::White => {
                        parent[next] = Some(node);
                        color[next] = Color::Gray;
                        stack.push((next, 0));
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                stack.pop();
            }
        }
    }
    None
}

/// Effective readiness of every method, composed over the acyclic call graph
///
/// `effective[m] = local[m] AND for each callee c: (!called_under[c] OR effective[c])`
pub(crate) fn effective_readies(
    net: &mut Netlist,
    local: &[NetId],
    called: &[BTreeMap<u32, NetId>],
) -> Vec<NetId> {
    let n = local.len();
    let mut memo: Vec<Option<NetId>> = vec![None; n];

    fn compute(
        m: usize,
        net: &mut Netlist,
        local: &[NetId],
        called: &[BTreeMap<u32, NetId>],
        memo: &mut Vec<Option<NetId>>,
    ) -> NetId {
        if let Some(done) = memo[m] {
            return done;
        }
        let mut terms = vec![local[m]];
        let callees: Vec<(u32, NetId)> = called[m].iter().map(|(c, e)| (*c, *e)).collect();
        for (callee, under) in callees {
            let callee_ready = compute(callee as usize, net, local, called, memo);
            let not_called = net.not(under);
            terms.push(net.or(not_called, callee_ready));
        }
        let ready = net.and_all(terms);
        memo[m] = Some(ready);
        ready
    }

    (0..n)
        .map(|m| compute(m, net, local, called, &mut memo))
        .collect()
}

/// Condition under which a body rooted at `sites` transitively invokes
/// `target`, as an OR over call paths of the ANDed enables along each path
///
/// Returns `None` when `target` is unreachable from the root.
pub(crate) struct Reachability<'a> {
    method_sites: &'a [Vec<CallSite>],
}

impl<'a> Reachability<'a> {
    pub fn new(method_sites: &'a [Vec<CallSite>]) -> Self {
        Self { method_sites }
    }

    /// Reach condition from a root body (a transaction's sites)
    pub fn from_root(&self, net: &mut Netlist, sites: &[CallSite], target: u32) -> Option<NetId> {
        let mut memo: Vec<Option<Option<NetId>>> = vec![None; self.method_sites.len()];
        self.from_sites(net, sites, target, &mut memo)
    }

    fn from_sites(
        &self,
        net: &mut Netlist,
        sites: &[CallSite],
        target: u32,
        memo: &mut Vec<Option<Option<NetId>>>,
    ) -> Option<NetId> {
        let mut paths = Vec::new();
        for site in sites {
            if site.callee == target {
                paths.push(site.enable);
            }
            if let Some(via) = self.from_method(net, site.callee, target, memo) {
                paths.push(net.and(site.enable, via));
            }
        }
        if paths.is_empty() {
            None
        } else {
            Some(net.or_all(paths))
        }
    }

    fn from_method(
        &self,
        net: &mut Netlist,
        method: u32,
        target: u32,
        memo: &mut Vec<Option<Option<NetId>>>,
    ) -> Option<NetId> {
        if let Some(done) = memo[method as usize] {
            return done;
        }
        let sites = self.method_sites[method as usize].clone();
        let cond = self.from_sites(net, &sites, target, memo);
        memo[method as usize] = Some(cond);
        cond
    }
}
