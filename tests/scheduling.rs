//! Arbiter behavior: exclusivity, progress, priority, tie-break modes

mod common;

use test_case::test_case;
use transactron::{
    Bundle, ElabContext, Layout, SchedulerConfig, Simulator, TieBreak, Warning,
};

fn contended_simulator(config: &SchedulerConfig) -> Simulator {
    let common::SharedPut { mut ctx, .. } = common::shared_put().unwrap();
    let lowered = ctx.lower(config).unwrap();
    let mut sim = Simulator::new(lowered.fragment);
    sim.set("d1", 1);
    sim.set("d2", 2);
    sim.set_bool("put_ready", true);
    sim
}

#[test_case(false, false, false, false; "nobody asks, nobody runs")]
#[test_case(true, false, true, false; "only t1 asks")]
#[test_case(false, true, false, true; "only t2 asks")]
#[test_case(true, true, true, false; "contention: definition order wins")]
fn shared_exclusive_method_grants(req1: bool, req2: bool, grant1: bool, grant2: bool) {
    let mut sim = contended_simulator(&SchedulerConfig::default());
    sim.set_bool("req1", req1);
    sim.set_bool("req2", req2);
    assert_eq!(sim.get_bool("t1__grant").unwrap(), grant1);
    assert_eq!(sim.get_bool("t2__grant").unwrap(), grant2);
}

#[test]
fn grants_never_exceed_readiness() {
    let mut sim = contended_simulator(&SchedulerConfig::default());
    sim.set_bool("req1", true);
    sim.set_bool("req2", true);
    sim.set_bool("put_ready", false);
    assert!(!sim.get_bool("t1__grant").unwrap());
    assert!(!sim.get_bool("t2__grant").unwrap());
}

#[test]
fn declared_priority_overrides_definition_order() {
    let common::SharedPut { mut ctx, t1, t2, .. } = common::shared_put().unwrap();
    ctx.schedule_before(t2, t1).unwrap();
    let lowered = ctx.lower(&SchedulerConfig::default()).unwrap();

    let mut sim = Simulator::new(lowered.fragment);
    sim.set("d1", 1);
    sim.set("d2", 2);
    sim.set_bool("put_ready", true);
    sim.set_bool("req1", true);
    sim.set_bool("req2", true);
    assert!(!sim.get_bool("t1__grant").unwrap());
    assert!(sim.get_bool("t2__grant").unwrap());

    // The loser still proceeds once the winner withdraws.
    sim.set_bool("req2", false);
    assert!(sim.get_bool("t1__grant").unwrap());
}

#[test]
fn explicit_conflict_excludes_grants_without_shared_methods() {
    let mut ctx = ElabContext::new();
    let t1 = common::idle_transaction(&mut ctx, "t1").unwrap();
    let t2 = common::idle_transaction(&mut ctx, "t2").unwrap();
    ctx.declare_conflict(t1, t2).unwrap();
    let lowered = ctx.lower(&SchedulerConfig::default()).unwrap();
    assert_eq!(lowered.report.conflicts.len(), 1);

    let mut sim = Simulator::new(lowered.fragment);
    sim.set_bool("t1_req", true);
    sim.set_bool("t2_req", true);
    let g1 = sim.get_bool("t1__grant").unwrap();
    let g2 = sim.get_bool("t2__grant").unwrap();
    assert!(g1);
    assert!(!g2);
}

#[test]
fn independent_transactions_are_granted_together() {
    let mut ctx = ElabContext::new();
    let t1 = common::idle_transaction(&mut ctx, "t1").unwrap();
    let t2 = common::idle_transaction(&mut ctx, "t2").unwrap();
    let _ = (t1, t2);
    let lowered = ctx.lower(&SchedulerConfig::default()).unwrap();
    assert!(lowered.report.conflicts.is_empty());

    let mut sim = Simulator::new(lowered.fragment);
    sim.set_bool("t1_req", true);
    sim.set_bool("t2_req", true);
    assert!(sim.get_bool("t1__grant").unwrap());
    assert!(sim.get_bool("t2__grant").unwrap());
}

#[test]
fn missing_priority_between_conflicting_pair_is_warned() {
    let common::SharedPut { mut ctx, .. } = common::shared_put().unwrap();
    let lowered = ctx.lower(&SchedulerConfig::default()).unwrap();
    assert!(lowered
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::NoDeclaredPriority { .. })));
}

#[test]
fn round_robin_alternates_under_steady_contention() {
    let mut sim = contended_simulator(&SchedulerConfig::with_tie_break(TieBreak::RoundRobin));
    sim.set_bool("req1", true);
    sim.set_bool("req2", true);

    let mut winners = Vec::new();
    for _ in 0..4 {
        let g1 = sim.get_bool("t1__grant").unwrap();
        let g2 = sim.get_bool("t2__grant").unwrap();
        assert!(g1 ^ g2, "exactly one grant per contended cycle");
        winners.push(if g1 { "t1" } else { "t2" });
        sim.step().unwrap();
    }
    assert_eq!(winners, vec!["t1", "t2", "t1", "t2"]);
}

#[test]
fn round_robin_still_respects_declared_priority() {
    let common::SharedPut { mut ctx, t1, t2, .. } = common::shared_put().unwrap();
    ctx.schedule_before(t1, t2).unwrap();
    let lowered = ctx
        .lower(&SchedulerConfig::with_tie_break(TieBreak::RoundRobin))
        .unwrap();

    let mut sim = Simulator::new(lowered.fragment);
    sim.set("d1", 1);
    sim.set("d2", 2);
    sim.set_bool("put_ready", true);
    sim.set_bool("req1", true);
    sim.set_bool("req2", true);
    for _ in 0..4 {
        assert!(sim.get_bool("t1__grant").unwrap());
        assert!(!sim.get_bool("t2__grant").unwrap());
        sim.step().unwrap();
    }
}

#[test]
fn round_robin_emits_pointer_registers_only_for_contended_components() {
    let common::SharedPut { mut ctx, .. } = common::shared_put().unwrap();
    common::idle_transaction(&mut ctx, "lonely").unwrap();
    let lowered = ctx
        .lower(&SchedulerConfig::with_tie_break(TieBreak::RoundRobin))
        .unwrap();
    // One two-transaction component -> two one-hot pointer bits; the lonely
    // transaction needs none.
    assert_eq!(lowered.fragment.registers.len(), 2);
}

#[test]
fn schedule_positions_follow_priority_order() {
    let common::SharedPut { mut ctx, t1, t2, .. } = common::shared_put().unwrap();
    ctx.schedule_before(t2, t1).unwrap();
    let lowered = ctx.lower(&SchedulerConfig::default()).unwrap();
    let positions: Vec<(String, usize)> = lowered
        .report
        .transactions
        .iter()
        .map(|t| (t.name.clone(), t.schedule_position))
        .collect();
    let t1_pos = positions.iter().find(|(n, _)| n == "t1").unwrap().1;
    let t2_pos = positions.iter().find(|(n, _)| n == "t2").unwrap().1;
    assert!(t2_pos < t1_pos);
}

#[test]
fn chained_method_unreadiness_blocks_the_root() {
    // S5: T calls a; a calls b; b is never ready, so nothing runs.
    let mut ctx = ElabContext::new();
    let b = ctx
        .define_method("b", Layout::empty(), Layout::empty(), false, |body, _| {
            let never = body.netlist().zero();
            body.set_ready(never);
            Ok(Bundle::empty())
        })
        .unwrap();
    let a = ctx
        .define_method("a", Layout::empty(), Layout::empty(), false, |body, _| {
            body.call(b, Bundle::empty())?;
            Ok(Bundle::empty())
        })
        .unwrap();
    let req = ctx.netlist().var("req", 1);
    ctx.define_transaction("t", req, |body| {
        body.call(a, Bundle::empty())?;
        Ok(())
    })
    .unwrap();

    let lowered = ctx.lower(&SchedulerConfig::default()).unwrap();
    assert!(lowered
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::NeverReady { method } if method == "b")));

    let mut sim = Simulator::new(lowered.fragment);
    sim.set_bool("req", true);
    assert!(!sim.get_bool("a__ready").unwrap());
    assert!(!sim.get_bool("t__grant").unwrap());
    assert!(!sim.get_bool("t__run").unwrap());
}
