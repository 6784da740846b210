//! Shared design fixtures for integration tests
#![allow(dead_code)]

use transactron::{
    Bundle, ElabContext, ElabResult, Layout, MethodId, NetId, TransactionId,
};

/// Two transactions competing for one exclusive method `put`
pub struct SharedPut {
    pub ctx: ElabContext,
    pub t1: TransactionId,
    pub t2: TransactionId,
    pub put: MethodId,
}

/// Build the canonical contended design:
/// `t1` and `t2` both call exclusive `put(data: 8)`, requests are the free
/// variables `req1`/`req2`, `put`'s local ready is the free variable
/// `put_ready`, and the arguments are `d1`/`d2`.
pub fn shared_put() -> ElabResult<SharedPut> {
    let mut ctx = ElabContext::new();
    let put = ctx.define_method(
        "put",
        Layout::new([("data", 8u32)]),
        Layout::empty(),
        false,
        |body, _input| {
            let ready = body.netlist().var("put_ready", 1);
            body.set_ready(ready);
            Ok(Bundle::empty())
        },
    )?;

    let req1 = ctx.netlist().var("req1", 1);
    let d1 = ctx.netlist().var("d1", 8);
    let t1 = ctx.define_transaction("t1", req1, |body| {
        body.call(put, Bundle::of([("data", d1)]))?;
        Ok(())
    })?;

    let req2 = ctx.netlist().var("req2", 1);
    let d2 = ctx.netlist().var("d2", 8);
    let t2 = ctx.define_transaction("t2", req2, |body| {
        body.call(put, Bundle::of([("data", d2)]))?;
        Ok(())
    })?;

    Ok(SharedPut { ctx, t1, t2, put })
}

/// A transaction with a free request variable and an empty body
pub fn idle_transaction(ctx: &mut ElabContext, name: &str) -> ElabResult<TransactionId> {
    let request = ctx.netlist().var(format!("{name}_req"), 1);
    ctx.define_transaction(name, request, |_body| Ok(()))
}

/// An exclusive sink method with a one-bit ready variable named
/// `<name>_ready` and no arguments
pub fn sink_method(ctx: &mut ElabContext, name: &str) -> ElabResult<MethodId> {
    let ready_name = format!("{name}_ready");
    ctx.define_method(name, Layout::empty(), Layout::empty(), false, move |body, _input| {
        let ready = body.netlist().var(ready_name, 1);
        body.set_ready(ready);
        Ok(Bundle::empty())
    })
}

/// Convenience: a fresh one-bit free variable
pub fn flag(ctx: &mut ElabContext, name: &str) -> NetId {
    ctx.netlist().var(name, 1)
}
