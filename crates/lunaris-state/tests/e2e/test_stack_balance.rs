use lunaris_state::{LuaState, LuaValue};
use proptest::prelude::*;

use super::helpers::*;

/// One protocol operation; some are meant to fail.
#[derive(Clone, Debug)]
enum Op {
    Get(String),
    Set(String, i64),
    SetIndex(i64, i64),
    Length,
    Unpack,
    Pairs,
    CallGood(i64),
    CallFailing,
    CallNonFunction,
    IndexScalar,
    RaiseFromMetamethod,
    ResumeDead,
    Push(i64),
    PopValue,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-c]".prop_map(Op::Get),
        ("[a-c]", any::<i64>()).prop_map(|(k, v)| Op::Set(k, v)),
        (1i64..6, any::<i64>()).prop_map(|(i, v)| Op::SetIndex(i, v)),
        Just(Op::Length),
        Just(Op::Unpack),
        Just(Op::Pairs),
        any::<i64>().prop_map(Op::CallGood),
        Just(Op::CallFailing),
        Just(Op::CallNonFunction),
        Just(Op::IndexScalar),
        Just(Op::RaiseFromMetamethod),
        Just(Op::ResumeDead),
        any::<i64>().prop_map(Op::Push),
        Just(Op::PopValue),
    ]
}

struct Fixture {
    lua: LuaState,
    table: LuaValue,
    guarded: LuaValue,
    echo: LuaValue,
    failing: LuaValue,
    dead: LuaValue,
}

fn fixture() -> Fixture {
    let lua = new_state();
    let mut r = lua
        .run_string(
            "local dead = coroutine.create(function() end) ; coroutine.resume(dead) ; \
             return {}, \
                    setmetatable({}, { __index = function() error('guarded') end }), \
                    function(...) return ... end, \
                    function() error('fails') end, \
                    dead",
            "fixture",
        )
        .unwrap();
    let dead = r.remove(4);
    let failing = r.remove(3);
    let echo = r.remove(2);
    let guarded = r.remove(1);
    let table = r.remove(0);
    Fixture {
        lua,
        table,
        guarded,
        echo,
        failing,
        dead,
    }
}

/// Run `op`, returning how it changes the expected depth.
fn apply(f: &Fixture, op: &Op) -> i32 {
    match op {
        Op::Get(k) => {
            let _ = f.table.get_field(k);
        }
        Op::Set(k, v) => {
            let _ = f.table.set_field(k, *v);
        }
        Op::SetIndex(i, v) => {
            let _ = f.table.set_index(*i, *v);
        }
        Op::Length => {
            let _ = f.table.length();
        }
        Op::Unpack => {
            let _ = f.table.unpack();
        }
        Op::Pairs => {
            let _ = f.table.pairs();
        }
        Op::CallGood(v) => {
            let r = f.echo.call_multi([(*v).into()]).unwrap();
            assert_eq!(r, vec![LuaValue::Integer(*v)]);
        }
        Op::CallFailing => {
            assert!(f.failing.call([]).is_err());
        }
        Op::CallNonFunction => {
            assert!(f.table.call([]).unwrap().is_nil());
        }
        Op::IndexScalar => {
            assert!(LuaValue::Integer(1).get_field("x").unwrap().is_nil());
        }
        Op::RaiseFromMetamethod => {
            assert!(f.guarded.get_field("x").is_err());
        }
        Op::ResumeDead => {
            assert!(f.dead.as_thread().unwrap().resume([]).is_err());
        }
        Op::Push(v) => {
            f.lua.push(&LuaValue::Integer(*v)).unwrap();
            return 1;
        }
        Op::PopValue => {
            let before = f.lua.get_top();
            f.lua.pop_value();
            return if before > 0 { -1 } else { 0 };
        }
    }
    0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_depth_tracks_only_explicit_pushes(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let f = fixture();
        let mut expected = f.lua.get_top();
        for op in &ops {
            expected += apply(&f, op);
            prop_assert_eq!(f.lua.get_top(), expected, "after {:?}", op);
        }
    }

    #[test]
    fn test_scalar_push_pop_round_trip(i in any::<i64>(), x in any::<f64>(), s in ".*", b in any::<bool>()) {
        let lua = new_state();
        let values = [
            LuaValue::Integer(i),
            LuaValue::Number(x),
            LuaValue::from(s.as_str()),
            LuaValue::Boolean(b),
            LuaValue::Nil,
        ];
        for v in &values {
            lua.push(v).unwrap();
        }
        for v in values.iter().rev() {
            let back = lua.pop_value();
            if x.is_nan() && matches!(v, LuaValue::Number(_)) {
                prop_assert!(back.as_float().unwrap().is_nan());
            } else {
                prop_assert_eq!(&back, v);
            }
        }
        prop_assert_eq!(lua.get_top(), 0);
    }
}
