//! Netlist fragment intermediate representation
//!
//! The lowering layer hands the host HDL a set of combinational equations
//! over a small node vocabulary: `Const`, `Var`, `And`, `Or`, `Not`, `Mux`,
//! `Eq`. Nodes live in an arena owned by the elaboration context; `NetId` is
//! an index into that arena. Wires carrying typed records are represented as
//! [`Bundle`]s, one net per layout field.

use serde::{Deserialize, Serialize};

use crate::layout::Layout;

/// Index of a node in the netlist arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetId(pub(crate) u32);

impl std::fmt::Display for NetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A combinational node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Constant bits
    Const { value: u64, width: u32 },
    /// Free input, bound either by the host or by an emitted equation
    Var { name: String, width: u32 },
    /// Bitwise AND
    And(NetId, NetId),
    /// Bitwise OR
    Or(NetId, NetId),
    /// Bitwise complement
    Not(NetId),
    /// `sel ? on_true : on_false`, selector is one bit
    Mux {
        sel: NetId,
        on_true: NetId,
        on_false: NetId,
    },
    /// One-bit equality of two same-width nets
    Eq(NetId, NetId),
}

/// Arena of combinational nodes
#[derive(Debug, Default, Clone)]
pub struct Netlist {
    nodes: Vec<Node>,
    widths: Vec<u32>,
}

impl Netlist {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node, width: u32) -> NetId {
        let id = NetId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.widths.push(width);
        id
    }

    /// Node behind an id
    pub fn node(&self, id: NetId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Width of a net in bits
    pub fn width(&self, id: NetId) -> u32 {
        self.widths[id.0 as usize]
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no nodes exist
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Constant node
    pub fn constant(&mut self, value: u64, width: u32) -> NetId {
        debug_assert!(width <= 64);
        self.push(Node::Const { value, width }, width)
    }

    /// One-bit constant 0
    pub fn zero(&mut self) -> NetId {
        self.constant(0, 1)
    }

    /// One-bit constant 1
    pub fn one(&mut self) -> NetId {
        self.constant(1, 1)
    }

    /// Free variable node
    pub fn var(&mut self, name: impl Into<String>, width: u32) -> NetId {
        self.push(
            Node::Var {
                name: name.into(),
                width,
            },
            width,
        )
    }

    fn const_value(&self, id: NetId) -> Option<u64> {
        match self.node(id) {
            Node::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Bitwise AND with constant folding
    pub fn and(&mut self, a: NetId, b: NetId) -> NetId {
        debug_assert_eq!(self.width(a), self.width(b));
        let width = self.width(a);
        let all_ones = ones(width);
        match (self.const_value(a), self.const_value(b)) {
            (Some(v), _) if v == all_ones => b,
            (_, Some(v)) if v == all_ones => a,
            (Some(0), _) | (_, Some(0)) => self.constant(0, width),
            _ => self.push(Node::And(a, b), width),
        }
    }

    /// Bitwise OR with constant folding
    pub fn or(&mut self, a: NetId, b: NetId) -> NetId {
        debug_assert_eq!(self.width(a), self.width(b));
        let width = self.width(a);
        let all_ones = ones(width);
        match (self.const_value(a), self.const_value(b)) {
            (Some(0), _) => b,
            (_, Some(0)) => a,
            (Some(v), _) | (_, Some(v)) if v == all_ones => self.constant(all_ones, width),
            _ => self.push(Node::Or(a, b), width),
        }
    }

    /// Bitwise complement with constant folding
    pub fn not(&mut self, a: NetId) -> NetId {
        let width = self.width(a);
        if let Some(value) = self.const_value(a) {
            return self.constant(!value & ones(width), width);
        }
        if let Node::Not(inner) = self.node(a) {
            return *inner;
        }
        self.push(Node::Not(a), width)
    }

    /// Two-way multiplexer; `sel` is one bit, both arms share a width
    pub fn mux(&mut self, sel: NetId, on_true: NetId, on_false: NetId) -> NetId {
        debug_assert_eq!(self.width(sel), 1);
        debug_assert_eq!(self.width(on_true), self.width(on_false));
        let width = self.width(on_true);
        match self.const_value(sel) {
            Some(0) => on_false,
            Some(_) => on_true,
            None => self.push(
                Node::Mux {
                    sel,
                    on_true,
                    on_false,
                },
                width,
            ),
        }
    }

    /// One-bit equality
    pub fn eq(&mut self, a: NetId, b: NetId) -> NetId {
        debug_assert_eq!(self.width(a), self.width(b));
        self.push(Node::Eq(a, b), 1)
    }

    /// AND of arbitrarily many one-bit nets; empty input yields constant 1
    pub fn and_all(&mut self, nets: impl IntoIterator<Item = NetId>) -> NetId {
        let mut acc = None;
        for net in nets {
            acc = Some(match acc {
                None => net,
                Some(prev) => self.and(prev, net),
            });
        }
        match acc {
            Some(net) => net,
            None => self.one(),
        }
    }

    /// OR of arbitrarily many one-bit nets; empty input yields constant 0
    pub fn or_all(&mut self, nets: impl IntoIterator<Item = NetId>) -> NetId {
        let mut acc = None;
        for net in nets {
            acc = Some(match acc {
                None => net,
                Some(prev) => self.or(prev, net),
            });
        }
        match acc {
            Some(net) => net,
            None => self.zero(),
        }
    }

    /// Variable bundle for a layout, one var per field named `prefix__field`
    pub fn var_bundle(&mut self, prefix: &str, layout: &Layout) -> Bundle {
        let fields = layout
            .fields
            .iter()
            .map(|f| {
                let net = self.var(format!("{prefix}__{}", f.name), f.width);
                (f.name.clone(), net)
            })
            .collect();
        Bundle { fields }
    }

    /// All-zero constant bundle for a layout
    pub fn zero_bundle(&mut self, layout: &Layout) -> Bundle {
        let fields = layout
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.constant(0, f.width)))
            .collect();
        Bundle { fields }
    }

    /// Fieldwise mux of two bundles with the same shape
    pub fn mux_bundle(&mut self, sel: NetId, on_true: &Bundle, on_false: &Bundle) -> Bundle {
        debug_assert_eq!(on_true.fields.len(), on_false.fields.len());
        let fields = on_true
            .fields
            .iter()
            .zip(&on_false.fields)
            .map(|((name, t), (_, f))| (name.clone(), self.mux(sel, *t, *f)))
            .collect();
        Bundle { fields }
    }
}

fn ones(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// A typed record wire: one net per layout field, in layout order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    /// `(field name, net)` pairs
    pub fields: Vec<(String, NetId)>,
}

impl Bundle {
    /// Bundle with no fields
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bundle from `(name, net)` pairs
    pub fn of<S: Into<String>>(fields: impl IntoIterator<Item = (S, NetId)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, net)| (name.into(), net))
                .collect(),
        }
    }

    /// Net of a field by name
    pub fn net(&self, name: &str) -> Option<NetId> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, net)| *net)
    }

    /// The net of a single-field bundle
    pub fn only(&self) -> Option<NetId> {
        match self.fields.as_slice() {
            [(_, net)] => Some(*net),
            _ => None,
        }
    }

    /// True when the bundle has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A named combinational binding: `name := net`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equation {
    /// Signal name; matches a `Var` node when the binding closes a variable
    pub name: String,
    /// Bound expression
    pub net: NetId,
}

/// A one-bit host state register requested by the lowering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSpec {
    /// Register (and readback variable) name
    pub name: String,
    /// Reset value
    pub init: bool,
    /// Next-state expression, sampled at the clock edge
    pub next: NetId,
}

/// The lowered output: nodes plus named equations and state registers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetlistFragment {
    /// Node arena, indexed by `NetId`
    pub nodes: Vec<Node>,
    /// Named combinational equations
    pub equations: Vec<Equation>,
    /// Host state registers
    pub registers: Vec<RegisterSpec>,
}

impl NetlistFragment {
    /// Build a fragment from an arena and its bindings
    pub fn new(netlist: &Netlist, equations: Vec<Equation>, registers: Vec<RegisterSpec>) -> Self {
        Self {
            nodes: netlist.nodes.clone(),
            equations,
            registers,
        }
    }

    /// Net bound to a signal name, if any
    pub fn equation(&self, name: &str) -> Option<NetId> {
        self.equations
            .iter()
            .find(|eq| eq.name == name)
            .map(|eq| eq.net)
    }

    /// Node behind an id
    pub fn node(&self, id: NetId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Width of a net in bits
    pub fn width(&self, id: NetId) -> u32 {
        match self.node(id) {
            Node::Const { width, .. } | Node::Var { width, .. } => *width,
            Node::And(a, _) | Node::Or(a, _) | Node::Not(a) => self.width(*a),
            Node::Mux { on_true, .. } => self.width(*on_true),
            Node::Eq(..) => 1,
        }
    }
}
