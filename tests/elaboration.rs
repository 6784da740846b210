//! Structural validation of the elaboration lifecycle

mod common;

use transactron::{
    Bundle, Caller, ElabContext, ElabError, Layout, SchedulerConfig,
};

#[test]
fn redeclaring_a_method_with_matching_layout_returns_the_same_id() {
    let mut ctx = ElabContext::new();
    let first = ctx
        .declare_method("put", Layout::new([("data", 8u32)]), Layout::empty(), false)
        .unwrap();
    let second = ctx
        .declare_method("put", Layout::new([("data", 8u32)]), Layout::empty(), false)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn redeclaring_a_method_with_different_layout_fails() {
    let mut ctx = ElabContext::new();
    ctx.declare_method("put", Layout::new([("data", 8u32)]), Layout::empty(), false)
        .unwrap();
    let err = ctx
        .declare_method("put", Layout::new([("data", 16u32)]), Layout::empty(), false)
        .unwrap_err();
    assert!(matches!(err, ElabError::LayoutMismatch { method, .. } if method == "put"));
}

#[test]
fn call_outside_an_open_body_is_an_orphan() {
    let mut ctx = ElabContext::new();
    let put = common::sink_method(&mut ctx, "put").unwrap();
    let enable = ctx.netlist().one();
    let err = ctx.record_call(put, enable, Bundle::empty()).unwrap_err();
    assert!(matches!(err, ElabError::OrphanCall { callee, .. } if callee == "put"));
}

#[test]
fn entities_from_another_context_are_rejected() {
    let mut ctx_a = ElabContext::new();
    let mut ctx_b = ElabContext::new();
    let foreign = common::sink_method(&mut ctx_b, "put").unwrap();

    let req = ctx_a.netlist().var("req", 1);
    let err = ctx_a
        .define_transaction("t", req, |body| {
            body.call(foreign, Bundle::empty())?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, ElabError::ContextMismatch { .. }));
}

#[test]
fn declared_but_undefined_method_fails_at_freeze() {
    let mut ctx = ElabContext::new();
    let pending = ctx
        .declare_method("pending", Layout::empty(), Layout::empty(), false)
        .unwrap();
    let req = ctx.netlist().var("req", 1);
    ctx.define_transaction("t", req, |body| {
        body.call(pending, Bundle::empty())?;
        Ok(())
    })
    .unwrap();

    let err = ctx.freeze().unwrap_err();
    assert!(matches!(err, ElabError::MissingCallee { method, .. } if method == "pending"));
}

#[test]
fn mutual_method_calls_are_a_call_graph_cycle() {
    let mut ctx = ElabContext::new();
    let b = ctx
        .declare_method("b", Layout::empty(), Layout::empty(), false)
        .unwrap();
    let a = ctx
        .define_method("a", Layout::empty(), Layout::empty(), false, |body, _| {
            body.call(b, Bundle::empty())?;
            Ok(Bundle::empty())
        })
        .unwrap();
    ctx.define_method_body(b, |body, _| {
        body.call(a, Bundle::empty())?;
        Ok(Bundle::empty())
    })
    .unwrap();

    let err = ctx.freeze().unwrap_err();
    match err {
        ElabError::CallGraphCycle { cycle } => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.len() >= 3);
        }
        other => panic!("expected CallGraphCycle, got {other}"),
    }
}

#[test]
fn transactions_cannot_share_a_name() {
    let mut ctx = ElabContext::new();
    common::idle_transaction(&mut ctx, "t").unwrap();
    let req = ctx.netlist().var("req_again", 1);
    let err = ctx.define_transaction("t", req, |_| Ok(())).unwrap_err();
    assert!(matches!(err, ElabError::LayoutMismatch { .. }));
}

#[test]
fn frozen_context_rejects_further_definitions() {
    let mut ctx = ElabContext::new();
    common::idle_transaction(&mut ctx, "t").unwrap();
    ctx.freeze().unwrap();

    let err = ctx
        .declare_method("late", Layout::empty(), Layout::empty(), false)
        .unwrap_err();
    assert!(matches!(err, ElabError::FrozenContext { operation, .. } if operation == "declare_method"));
}

#[test]
fn freeze_is_idempotent_and_lowering_works_twice() {
    let common::SharedPut { mut ctx, .. } = common::shared_put().unwrap();
    ctx.freeze().unwrap();
    ctx.freeze().unwrap();
    let first = ctx.lower(&SchedulerConfig::default()).unwrap();
    let second = ctx.lower(&SchedulerConfig::default()).unwrap();
    assert_eq!(
        first.report.transactions.len(),
        second.report.transactions.len()
    );
}

#[test]
fn priority_cycle_is_rejected() {
    let common::SharedPut { mut ctx, t1, t2, .. } = common::shared_put().unwrap();
    ctx.schedule_before(t1, t2).unwrap();
    ctx.schedule_before(t2, t1).unwrap();
    let err = ctx.freeze().unwrap_err();
    assert!(matches!(err, ElabError::PriorityCycle { .. }));
}

#[test]
fn self_priority_is_a_cycle() {
    let mut ctx = ElabContext::new();
    let t = common::idle_transaction(&mut ctx, "t").unwrap();
    ctx.schedule_before(t, t).unwrap();
    let err = ctx.freeze().unwrap_err();
    assert!(matches!(err, ElabError::PriorityCycle { cycle } if cycle == vec!["t", "t"]));
}

#[test]
fn unconditional_double_call_to_exclusive_method_is_rejected() {
    let mut ctx = ElabContext::new();
    let put = common::sink_method(&mut ctx, "put").unwrap();
    let req = ctx.netlist().var("req", 1);
    ctx.define_transaction("t", req, |body| {
        body.call(put, Bundle::empty())?;
        body.call(put, Bundle::empty())?;
        Ok(())
    })
    .unwrap();

    let err = ctx.freeze().unwrap_err();
    assert!(matches!(
        err,
        ElabError::ConflictingCallSites { caller, method, .. }
            if caller == "t" && method == "put"
    ));
}

#[test]
fn guarded_arms_witness_mutual_exclusion() {
    let mut ctx = ElabContext::new();
    let put = common::sink_method(&mut ctx, "put").unwrap();
    let req = ctx.netlist().var("req", 1);
    let sel = ctx.netlist().var("sel", 1);
    ctx.define_transaction("t", req, |body| {
        body.when_or_else(
            sel,
            |body| {
                body.call(put, Bundle::empty())?;
                Ok(())
            },
            |body| {
                body.call(put, Bundle::empty())?;
                Ok(())
            },
        )?;
        Ok(())
    })
    .unwrap();

    // The two arms carry complementary guards, so the double call is legal.
    ctx.freeze().unwrap();
}

#[test]
fn bodies_left_open_fail_at_freeze() {
    let mut ctx = ElabContext::new();
    let t = common::idle_transaction(&mut ctx, "t").unwrap();
    ctx.open_body(Caller::Transaction(t)).unwrap();
    let err = ctx.freeze().unwrap_err();
    assert!(matches!(err, ElabError::OrphanCall { .. }));
}

#[test]
fn argument_bundle_must_match_the_input_layout() {
    let mut ctx = ElabContext::new();
    let put = ctx
        .define_method(
            "put",
            Layout::new([("data", 8u32)]),
            Layout::empty(),
            false,
            |body, _| {
                let ready = body.netlist().one();
                body.set_ready(ready);
                Ok(Bundle::empty())
            },
        )
        .unwrap();
    let req = ctx.netlist().var("req", 1);
    let narrow = ctx.netlist().var("narrow", 4);
    let err = ctx
        .define_transaction("t", req, |body| {
            body.call(put, Bundle::of([("data", narrow)]))?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, ElabError::LayoutMismatch { method, .. } if method == "put"));
}
