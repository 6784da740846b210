//! Elaboration context
//!
//! Process-wide state with a strict lifecycle: constructed empty, populated
//! by method/transaction definitions, frozen once elaboration completes, and
//! only then lowered. Elaboration is single-threaded and cooperative; a
//! context never migrates between concurrent elaborations, and entities from
//! one context are rejected by another (`ContextMismatch`).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::callgraph::{self, CallGraphBuilder, CallSite, Owner};
use crate::config::SchedulerConfig;
use crate::conflict::{self, ConflictGraph};
use crate::error::{ElabError, ElabResult, SourceLoc};
use crate::layout::Layout;
use crate::lower::{self, Lowered};
use crate::netlist::{Bundle, NetId, Netlist};
use crate::report::Warning;
use crate::signature::{Signature, SignatureId, SignatureRegistry};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a registered method, valid only in its owning context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId {
    pub(crate) ctx: u64,
    pub(crate) idx: u32,
}

/// Handle to a registered transaction, valid only in its owning context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
    pub(crate) ctx: u64,
    pub(crate) idx: u32,
}

/// A call-graph owner: transactions and methods both call methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    /// A transaction body
    Transaction(TransactionId),
    /// A method body
    Method(MethodId),
}

/// Commutative combiner for simultaneous callers of a nonexclusive method
pub type Reducer = Box<dyn Fn(&mut Netlist, &Bundle, &Bundle) -> Bundle>;

#[derive(Debug)]
pub(crate) struct MethodDef {
    pub name: String,
    pub signature: SignatureId,
    pub loc: SourceLoc,
    /// Input variables `name__in__field`, bound by the lowering muxes
    pub input: Bundle,
    /// Output variables `name__out__field`, bound to the body result
    pub output: Bundle,
    pub defined: bool,
    /// Local ready predicate; constant 1 unless the body set one
    pub local_ready: NetId,
    /// Body result expressions, one per output field
    pub body_out: Option<Bundle>,
    pub sites: Vec<CallSite>,
    pub called_under: BTreeMap<u32, NetId>,
}

#[derive(Debug)]
pub(crate) struct TransactionDef {
    pub name: String,
    pub loc: SourceLoc,
    pub request: NetId,
    pub sites: Vec<CallSite>,
    pub called_under: BTreeMap<u32, NetId>,
}

/// Frozen analysis results, computed once between elaboration and lowering
pub(crate) struct Analysis {
    /// Effective ready per method
    pub method_ready: Vec<NetId>,
    /// Effective ready per transaction
    pub txn_ready: Vec<NetId>,
    pub conflict: ConflictGraph,
    /// Deduplicated priority edges `(before, after)`
    pub priorities: Vec<(u32, u32)>,
    pub warnings: Vec<Warning>,
}

/// The elaboration context
pub struct ElabContext {
    pub(crate) id: u64,
    pub(crate) net: Netlist,
    pub(crate) signatures: SignatureRegistry,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) method_names: HashMap<String, u32>,
    pub(crate) transactions: Vec<TransactionDef>,
    pub(crate) txn_names: HashMap<String, u32>,
    pub(crate) explicit_conflicts: Vec<(u32, u32, SourceLoc)>,
    pub(crate) priority_hints: Vec<(u32, u32, SourceLoc)>,
    pub(crate) reducers: HashMap<u32, Reducer>,
    pub(crate) builder: CallGraphBuilder,
    pub(crate) frozen: bool,
    pub(crate) analysis: Option<Analysis>,
}

impl Default for ElabContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ElabContext {
    /// Fresh, empty context
    pub fn new() -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(context = id, "created elaboration context");
        Self {
            id,
            net: Netlist::new(),
            signatures: SignatureRegistry::new(),
            methods: Vec::new(),
            method_names: HashMap::new(),
            transactions: Vec::new(),
            txn_names: HashMap::new(),
            explicit_conflicts: Vec::new(),
            priority_hints: Vec::new(),
            reducers: HashMap::new(),
            builder: CallGraphBuilder::new(),
            frozen: false,
            analysis: None,
        }
    }

    /// The context's process-unique id
    pub fn context_id(&self) -> u64 {
        self.id
    }

    /// Mutable access to the netlist arena, for building expressions
    pub fn netlist(&mut self) -> &mut Netlist {
        &mut self.net
    }

    /// True once the context has been frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[track_caller]
    fn ensure_mutable(&self, operation: &str) -> ElabResult<()> {
        if self.frozen {
            return Err(ElabError::FrozenContext {
                operation: operation.to_string(),
                loc: SourceLoc::here(),
            });
        }
        Ok(())
    }

    #[track_caller]
    pub(crate) fn check_method(&self, id: MethodId) -> ElabResult<u32> {
        if id.ctx != self.id {
            return Err(ElabError::ContextMismatch {
                expected: self.id,
                found: id.ctx,
                loc: SourceLoc::here(),
            });
        }
        Ok(id.idx)
    }

    #[track_caller]
    pub(crate) fn check_transaction(&self, id: TransactionId) -> ElabResult<u32> {
        if id.ctx != self.id {
            return Err(ElabError::ContextMismatch {
                expected: self.id,
                found: id.ctx,
                loc: SourceLoc::here(),
            });
        }
        Ok(id.idx)
    }

    /// Name of a registered method
    pub fn method_name(&self, id: MethodId) -> ElabResult<&str> {
        let idx = self.check_method(id)?;
        Ok(&self.methods[idx as usize].name)
    }

    /// Name of a registered transaction
    pub fn transaction_name(&self, id: TransactionId) -> ElabResult<&str> {
        let idx = self.check_transaction(id)?;
        Ok(&self.transactions[idx as usize].name)
    }

    /// Declare a method interface without a body
    ///
    /// Re-declaring an existing name with a structurally equal signature
    /// returns the existing id; an incompatible signature is a
    /// `LayoutMismatch`. A declared method must receive a body before freeze.
    #[track_caller]
    pub fn declare_method(
        &mut self,
        name: &str,
        input: Layout,
        output: Layout,
        nonexclusive: bool,
    ) -> ElabResult<MethodId> {
        self.ensure_mutable("declare_method")?;
        let loc = SourceLoc::here();
        let signature = self
            .signatures
            .intern(Signature::new(input.clone(), output.clone(), nonexclusive));

        if let Some(&idx) = self.method_names.get(name) {
            let existing = &self.methods[idx as usize];
            if existing.signature != signature {
                return Err(ElabError::LayoutMismatch {
                    method: name.to_string(),
                    detail: format!(
                        "redeclared with a different signature (first declared at {})",
                        existing.loc
                    ),
                    loc,
                });
            }
            return Ok(MethodId { ctx: self.id, idx });
        }

        let idx = self.methods.len() as u32;
        let input_bundle = self.net.var_bundle(&format!("{name}__in"), &input);
        let output_bundle = self.net.var_bundle(&format!("{name}__out"), &output);
        let local_ready = self.net.one();
        self.methods.push(MethodDef {
            name: name.to_string(),
            signature,
            loc,
            input: input_bundle,
            output: output_bundle,
            defined: false,
            local_ready,
            body_out: None,
            sites: Vec::new(),
            called_under: BTreeMap::new(),
        });
        self.method_names.insert(name.to_string(), idx);
        debug!(method = name, nonexclusive, "declared method");
        Ok(MethodId { ctx: self.id, idx })
    }

    /// Declare a method and elaborate its body in one step
    #[track_caller]
    pub fn define_method<F>(
        &mut self,
        name: &str,
        input: Layout,
        output: Layout,
        nonexclusive: bool,
        body: F,
    ) -> ElabResult<MethodId>
    where
        F: FnOnce(&mut BodyCtx<'_>, &Bundle) -> ElabResult<Bundle>,
    {
        let id = self.declare_method(name, input, output, nonexclusive)?;
        self.define_method_body(id, body)?;
        Ok(id)
    }

    /// Attach a body to a previously declared method
    #[track_caller]
    pub fn define_method_body<F>(&mut self, id: MethodId, body: F) -> ElabResult<()>
    where
        F: FnOnce(&mut BodyCtx<'_>, &Bundle) -> ElabResult<Bundle>,
    {
        self.ensure_mutable("define_method_body")?;
        let loc = SourceLoc::here();
        let idx = self.check_method(id)?;
        if self.methods[idx as usize].defined {
            return Err(ElabError::LayoutMismatch {
                method: self.methods[idx as usize].name.clone(),
                detail: "method already has a body".to_string(),
                loc,
            });
        }

        let input = self.methods[idx as usize].input.clone();
        self.builder.open(Owner::Method(idx));
        let result = body(&mut BodyCtx { ctx: self }, &input);
        let frame = self.builder.close();
        let out = result?;

        self.check_bundle_shape(&self.method_output_layout(idx), &out, idx, loc)?;
        let frame = match frame {
            Some(frame) => frame,
            None => {
                return Err(ElabError::OrphanCall {
                    callee: self.methods[idx as usize].name.clone(),
                    loc,
                })
            }
        };
        let called = callgraph::called_under(&mut self.net, &frame.sites);
        let def = &mut self.methods[idx as usize];
        def.sites = frame.sites;
        def.called_under = called;
        if let Some(ready) = frame.ready {
            def.local_ready = ready;
        }
        def.body_out = Some(out);
        def.defined = true;
        debug!(method = def.name.as_str(), sites = def.sites.len(), "defined method body");
        Ok(())
    }

    /// Register a transaction: a root-level runnable unit
    ///
    /// `request` is asserted when the designer wants the transaction to fire;
    /// the body records method invocations and produces no output.
    #[track_caller]
    pub fn define_transaction<F>(
        &mut self,
        name: &str,
        request: NetId,
        body: F,
    ) -> ElabResult<TransactionId>
    where
        F: FnOnce(&mut BodyCtx<'_>) -> ElabResult<()>,
    {
        self.ensure_mutable("define_transaction")?;
        let loc = SourceLoc::here();
        if self.txn_names.contains_key(name) {
            return Err(ElabError::LayoutMismatch {
                method: name.to_string(),
                detail: "transaction name already registered".to_string(),
                loc,
            });
        }

        let idx = self.transactions.len() as u32;
        self.transactions.push(TransactionDef {
            name: name.to_string(),
            loc,
            request,
            sites: Vec::new(),
            called_under: BTreeMap::new(),
        });
        self.txn_names.insert(name.to_string(), idx);

        self.builder.open(Owner::Transaction(idx));
        let result = body(&mut BodyCtx { ctx: self });
        let frame = self.builder.close();
        result?;

        if let Some(frame) = frame {
            let called = callgraph::called_under(&mut self.net, &frame.sites);
            let def = &mut self.transactions[idx as usize];
            def.sites = frame.sites;
            def.called_under = called;
        }
        debug!(transaction = name, "defined transaction");
        Ok(TransactionId { ctx: self.id, idx })
    }

    /// Declare an explicit conflict between two transactions
    #[track_caller]
    pub fn declare_conflict(&mut self, a: TransactionId, b: TransactionId) -> ElabResult<()> {
        self.ensure_mutable("declare_conflict")?;
        let loc = SourceLoc::here();
        let a = self.check_transaction(a)?;
        let b = self.check_transaction(b)?;
        self.explicit_conflicts.push((a, b, loc));
        Ok(())
    }

    /// Declare a priority hint: prefer `first` when both conflict and are
    /// runnable
    #[track_caller]
    pub fn schedule_before(&mut self, first: TransactionId, second: TransactionId) -> ElabResult<()> {
        self.ensure_mutable("schedule_before")?;
        let loc = SourceLoc::here();
        let first = self.check_transaction(first)?;
        let second = self.check_transaction(second)?;
        self.priority_hints.push((first, second, loc));
        Ok(())
    }

    /// Declare a custom commutative reducer for a nonexclusive method
    #[track_caller]
    pub fn declare_reducer<F>(&mut self, method: MethodId, reducer: F) -> ElabResult<()>
    where
        F: Fn(&mut Netlist, &Bundle, &Bundle) -> Bundle + 'static,
    {
        self.ensure_mutable("declare_reducer")?;
        let idx = self.check_method(method)?;
        self.reducers.insert(idx, Box::new(reducer));
        Ok(())
    }

    /// Open a body for low-level call recording
    ///
    /// Most designs use [`ElabContext::define_method`] /
    /// [`ElabContext::define_transaction`] instead; this surface exists for
    /// generated frontends that drive the builder directly.
    #[track_caller]
    pub fn open_body(&mut self, owner: Caller) -> ElabResult<()> {
        self.ensure_mutable("open_body")?;
        let owner = match owner {
            Caller::Transaction(id) => Owner::Transaction(self.check_transaction(id)?),
            Caller::Method(id) => Owner::Method(self.check_method(id)?),
        };
        self.builder.open(owner);
        Ok(())
    }

    /// Record a call site in the innermost open body
    #[track_caller]
    pub fn record_call(
        &mut self,
        callee: MethodId,
        enable: NetId,
        args: Bundle,
    ) -> ElabResult<Bundle> {
        self.ensure_mutable("record_call")?;
        let loc = SourceLoc::here();
        let idx = self.check_method(callee)?;
        self.check_bundle_shape(&self.method_input_layout(idx), &args, idx, loc)?;
        let name = self.methods[idx as usize].name.clone();
        self.builder
            .record(&mut self.net, idx, &name, enable, args, loc)?;
        Ok(self.methods[idx as usize].output.clone())
    }

    /// Close the innermost open body, applying its sites to the owner
    #[track_caller]
    pub fn close_body(&mut self, ready: Option<NetId>) -> ElabResult<()> {
        self.ensure_mutable("close_body")?;
        let loc = SourceLoc::here();
        let frame = match self.builder.close() {
            Some(frame) => frame,
            None => {
                return Err(ElabError::OrphanCall {
                    callee: "<close>".to_string(),
                    loc,
                })
            }
        };
        let called = callgraph::called_under(&mut self.net, &frame.sites);
        match frame.owner {
            Owner::Method(idx) => {
                let def = &mut self.methods[idx as usize];
                def.sites = frame.sites;
                def.called_under = called;
                if let Some(ready) = ready.or(frame.ready) {
                    def.local_ready = ready;
                }
                def.defined = true;
            }
            Owner::Transaction(idx) => {
                let def = &mut self.transactions[idx as usize];
                def.sites = frame.sites;
                def.called_under = called;
            }
        }
        Ok(())
    }

    /// Bind a low-level method's output expressions
    #[track_caller]
    pub fn bind_method_output(&mut self, method: MethodId, out: Bundle) -> ElabResult<()> {
        self.ensure_mutable("bind_method_output")?;
        let loc = SourceLoc::here();
        let idx = self.check_method(method)?;
        self.check_bundle_shape(&self.method_output_layout(idx), &out, idx, loc)?;
        self.methods[idx as usize].body_out = Some(out);
        Ok(())
    }

    fn method_input_layout(&self, idx: u32) -> Layout {
        self.signatures
            .get(self.methods[idx as usize].signature)
            .input
            .clone()
    }

    fn method_output_layout(&self, idx: u32) -> Layout {
        self.signatures
            .get(self.methods[idx as usize].signature)
            .output
            .clone()
    }

    fn check_bundle_shape(
        &self,
        layout: &Layout,
        bundle: &Bundle,
        method: u32,
        loc: SourceLoc,
    ) -> ElabResult<()> {
        let name = &self.methods[method as usize].name;
        if bundle.fields.len() != layout.fields.len() {
            return Err(ElabError::LayoutMismatch {
                method: name.clone(),
                detail: format!(
                    "expected {} fields, got {}",
                    layout.fields.len(),
                    bundle.fields.len()
                ),
                loc,
            });
        }
        for (field, (got_name, net)) in layout.fields.iter().zip(&bundle.fields) {
            if &field.name != got_name {
                return Err(ElabError::LayoutMismatch {
                    method: name.clone(),
                    detail: format!("expected field `{}`, got `{got_name}`", field.name),
                    loc,
                });
            }
            let width = self.net.width(*net);
            if width != field.width {
                return Err(ElabError::LayoutMismatch {
                    method: name.clone(),
                    detail: format!(
                        "field `{}` is {} bits wide, wire has {width}",
                        field.name, field.width
                    ),
                    loc,
                });
            }
        }
        Ok(())
    }

    /// Freeze the context: validate the call graph, derive effective
    /// readiness, and build the conflict and priority structures
    ///
    /// Idempotent; every mutation after the first freeze fails with
    /// `FrozenContext`.
    pub fn freeze(&mut self) -> ElabResult<()> {
        if self.frozen {
            return Ok(());
        }

        if self.builder.is_open() {
            return Err(ElabError::OrphanCall {
                callee: "<body left open at freeze>".to_string(),
                loc: SourceLoc::here(),
            });
        }

        for def in &self.methods {
            if !def.defined {
                return Err(ElabError::MissingCallee {
                    method: def.name.clone(),
                    loc: def.loc,
                });
            }
        }

        let names: Vec<String> = self.methods.iter().map(|m| m.name.clone()).collect();
        let method_sites: Vec<Vec<CallSite>> =
            self.methods.iter().map(|m| m.sites.clone()).collect();
        if let Some(cycle) = callgraph::find_method_cycle(&names, &method_sites) {
            return Err(ElabError::CallGraphCycle { cycle });
        }

        let local: Vec<NetId> = self.methods.iter().map(|m| m.local_ready).collect();
        let called: Vec<BTreeMap<u32, NetId>> =
            self.methods.iter().map(|m| m.called_under.clone()).collect();
        let method_ready = callgraph::effective_readies(&mut self.net, &local, &called);

        let mut txn_ready = Vec::with_capacity(self.transactions.len());
        for txn in &self.transactions {
            let mut terms = Vec::new();
            for (&callee, &under) in &txn.called_under {
                let not_called = self.net.not(under);
                let ready = method_ready[callee as usize];
                terms.push(self.net.or(not_called, ready));
            }
            txn_ready.push(self.net.and_all(terms));
        }

        let (conflict_graph, priorities, mut warnings) = conflict::build(
            &mut self.net,
            &self.transactions,
            &self.methods,
            &self.signatures,
            &self.explicit_conflicts,
            &self.priority_hints,
        )?;

        for (idx, def) in self.methods.iter().enumerate() {
            if let crate::netlist::Node::Const { value: 0, .. } =
                self.net.node(method_ready[idx])
            {
                warnings.push(Warning::NeverReady {
                    method: def.name.clone(),
                });
            }
        }

        info!(
            methods = self.methods.len(),
            transactions = self.transactions.len(),
            conflicts = conflict_graph.edge_count(),
            warnings = warnings.len(),
            "froze elaboration context"
        );

        self.analysis = Some(Analysis {
            method_ready,
            txn_ready,
            conflict: conflict_graph,
            priorities,
            warnings,
        });
        self.frozen = true;
        Ok(())
    }

    /// Freeze (if needed) and lower the design to a netlist fragment
    pub fn lower(&mut self, config: &SchedulerConfig) -> ElabResult<Lowered> {
        self.freeze()?;
        lower::run(self, config)
    }
}

/// Handle passed to body closures for recording calls and guards
pub struct BodyCtx<'a> {
    ctx: &'a mut ElabContext,
}

impl BodyCtx<'_> {
    /// The netlist arena, for building expressions inside the body
    pub fn netlist(&mut self) -> &mut Netlist {
        &mut self.ctx.net
    }

    /// Call a method unconditionally (under the guards currently in force)
    #[track_caller]
    pub fn call(&mut self, callee: MethodId, args: Bundle) -> ElabResult<Bundle> {
        let enable = self.ctx.net.one();
        self.call_when(callee, enable, args)
    }

    /// Call a method under an explicit enable, ANDed with the guards in force
    #[track_caller]
    pub fn call_when(
        &mut self,
        callee: MethodId,
        enable: NetId,
        args: Bundle,
    ) -> ElabResult<Bundle> {
        let loc = SourceLoc::here();
        let idx = self.ctx.check_method(callee)?;
        self.ctx
            .check_bundle_shape(&self.ctx.method_input_layout(idx), &args, idx, loc)?;
        let name = self.ctx.methods[idx as usize].name.clone();
        self.ctx
            .builder
            .record(&mut self.ctx.net, idx, &name, enable, args, loc)?;
        Ok(self.ctx.methods[idx as usize].output.clone())
    }

    /// Run `f` inside a guarded region; calls recorded within are enabled
    /// only when `cond` holds
    pub fn when<R>(
        &mut self,
        cond: NetId,
        f: impl FnOnce(&mut BodyCtx<'_>) -> ElabResult<R>,
    ) -> ElabResult<R> {
        self.ctx.builder.push_guard(cond)?;
        let result = f(self);
        self.ctx.builder.pop_guard();
        result
    }

    /// Guarded region with an else arm; the arms carry complementary guards,
    /// which the conflict analysis recognizes as a mutual-exclusion witness
    pub fn when_or_else<A, B>(
        &mut self,
        cond: NetId,
        then_f: impl FnOnce(&mut BodyCtx<'_>) -> ElabResult<A>,
        else_f: impl FnOnce(&mut BodyCtx<'_>) -> ElabResult<B>,
    ) -> ElabResult<(A, B)> {
        let then_result = self.when(cond, then_f)?;
        let negated = self.ctx.net.not(cond);
        let else_result = self.when(negated, else_f)?;
        Ok((then_result, else_result))
    }

    /// Set the local ready expression of the enclosing method body
    pub fn set_ready(&mut self, ready: NetId) {
        self.ctx.builder.set_ready(ready);
    }
}
