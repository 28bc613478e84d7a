use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lunaris_state::{
    BridgeError, CallContext, HostObject, HostObjectRef, LuaValue, ReflectionKind, Result,
};

use super::helpers::*;

/// A counter with one readable property, one writable label and two
/// methods.
#[derive(Default)]
pub struct Counter {
    count: Cell<i64>,
    label: RefCell<String>,
}

impl HostObject for Counter {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn reflect(&self, name: &str) -> ReflectionKind {
        match name {
            "count" | "label" => ReflectionKind::Property,
            "add" | "reset" => ReflectionKind::Function,
            _ => ReflectionKind::Unknown,
        }
    }

    fn get_property(&self, name: &str) -> Result<LuaValue> {
        match name {
            "count" => Ok(self.count.get().into()),
            "label" => Ok(self.label.borrow().as_str().into()),
            _ => Ok(LuaValue::Nil),
        }
    }

    fn set_property(&self, name: &str, value: LuaValue) -> Result<()> {
        match name {
            "label" => {
                *self.label.borrow_mut() = value.to_string();
                Ok(())
            }
            _ => Err(BridgeError::Runtime(format!("{name} is read-only"))),
        }
    }

    fn invoke(&self, _ctx: &CallContext, name: &str, args: Vec<LuaValue>) -> Result<Vec<LuaValue>> {
        match name {
            "add" => {
                let by = args.first().map(LuaValue::to_integer).unwrap_or(1);
                self.count.set(self.count.get() + by);
                Ok(vec![self.count.get().into()])
            }
            "reset" => {
                self.count.set(0);
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn install_counter() -> (lunaris_state::LuaState, Rc<Counter>) {
    let lua = new_state();
    let counter = Rc::new(Counter::default());
    lua.set_global("counter", HostObjectRef::from(counter.clone()))
        .unwrap();
    (lua, counter)
}

#[test]
fn test_method_call_syntax() {
    let (lua, counter) = install_counter();
    let r = lua
        .run_string("counter:add(2) ; counter.add(3) ; return counter.count", "methods")
        .unwrap();
    assert_int(&r, 0, 5);
    assert_eq!(counter.count.get(), 5);
}

#[test]
fn test_property_write() {
    let (lua, counter) = install_counter();
    lua.run_string("counter.label = 'clicks'", "write").unwrap();
    assert_eq!(counter.label.borrow().as_str(), "clicks");

    let err = lua.run_string("counter.count = 1", "readonly").unwrap_err();
    assert!(err.to_string().contains("read-only"), "{err}");

    let err = lua.run_string("counter.nope = 1", "unknown").unwrap_err();
    assert!(err.to_string().contains("no property"), "{err}");
}

#[test]
fn test_unknown_member_is_nil() {
    let (lua, _counter) = install_counter();
    let r = lua.run_string("return counter.missing", "missing").unwrap();
    assert_nil(&r, 0);
}

#[test]
fn test_object_identity_survives_round_trip() {
    let (lua, counter) = install_counter();
    let back = lua.get_global("counter").unwrap();
    let obj = back.as_object().unwrap();
    assert_eq!(obj.to_pointer(), Rc::as_ptr(&counter) as *const () as usize);
    let r = lua
        .run_string("local other = counter ; return other == counter", "eq")
        .unwrap();
    assert_bool(&r, 0, true);
}

#[test]
fn test_tostring_uses_class_name() {
    let (lua, _counter) = install_counter();
    let r = lua.run_string("return tostring(counter)", "tostring").unwrap();
    assert!(r[0].as_str().unwrap().starts_with("Counter"), "{:?}", r[0]);
}

#[test]
fn test_fill_object_from_table() {
    let (lua, counter) = install_counter();
    let t = lua
        .run_string("return { label = 'filled', unrelated = 1 }", "fill")
        .unwrap()
        .remove(0);
    let obj = HostObjectRef::from(counter.clone());
    assert_eq!(t.fill_object(&obj).unwrap(), 1);
    assert_eq!(counter.label.borrow().as_str(), "filled");
}

#[test]
fn test_fill_object_from_non_table() {
    let (_lua, counter) = install_counter();
    let obj = HostObjectRef::from(counter.clone());
    assert_eq!(LuaValue::from("label").fill_object(&obj).unwrap(), 0);
    assert_eq!(LuaValue::Nil.fill_object(&obj).unwrap(), 0);
    assert_ne!(counter.label.borrow().as_str(), "label");
}

#[test]
fn test_reflection_kind() {
    let (lua, counter) = install_counter();
    let v = LuaValue::Object(HostObjectRef::from(counter));
    assert_eq!(lua.reflection_kind(&v, "add"), ReflectionKind::Function);
    assert_eq!(lua.reflection_kind(&v, "count"), ReflectionKind::Property);
    assert_eq!(lua.reflection_kind(&v, "zzz"), ReflectionKind::Unknown);
    assert_eq!(lua.reflection_kind(&LuaValue::Nil, "add"), ReflectionKind::Unknown);
}

#[test]
fn test_object_released_after_collection() {
    let (lua, counter) = install_counter();
    assert!(Rc::strong_count(&counter) > 1);
    lua.set_global("counter", LuaValue::Nil).unwrap();
    lua.gc_collect();
    lua.gc_collect();
    assert_eq!(Rc::strong_count(&counter), 1);
}
