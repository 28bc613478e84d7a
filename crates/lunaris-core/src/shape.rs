//! Known table shapes.
//!
//! A shape names a fixed set of fields a table is expected to carry, with
//! the alternative keys each field may be stored under. Tables produced from
//! host structures (vectors) are tagged with their shape so they convert back
//! without guessing.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// A key a shape field may be stored under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKey {
    Name(&'static str),
    Index(i64),
}

/// One field of a shape and the keys it is looked up under, in priority
/// order. The first key is the one used when writing.
#[derive(Debug, PartialEq, Eq)]
pub struct ShapeField {
    pub name: &'static str,
    pub keys: &'static [ShapeKey],
}

impl ShapeField {
    /// The canonical key used when building a table of this shape.
    pub fn primary_key(&self) -> ShapeKey {
        self.keys
            .first()
            .copied()
            .unwrap_or(ShapeKey::Name(self.name))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Shape {
    pub name: &'static str,
    pub fields: &'static [ShapeField],
}

impl Shape {
    pub fn field(&self, name: &str) -> Option<&'static ShapeField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Number of fields for which `has_key` reports at least one present
    /// key.
    pub fn matched_fields(&self, mut has_key: impl FnMut(ShapeKey) -> bool) -> usize {
        self.fields
            .iter()
            .filter(|f| f.keys.iter().any(|k| has_key(*k)))
            .count()
    }
}

const X_KEYS: &[ShapeKey] = &[ShapeKey::Name("x"), ShapeKey::Name("X"), ShapeKey::Index(1)];
const Y_KEYS: &[ShapeKey] = &[ShapeKey::Name("y"), ShapeKey::Name("Y"), ShapeKey::Index(2)];
const Z_KEYS: &[ShapeKey] = &[ShapeKey::Name("z"), ShapeKey::Name("Z"), ShapeKey::Index(3)];

/// Three-component vector: `x`, `y`, `z`.
pub static VECTOR: Shape = Shape {
    name: "vector",
    fields: &[
        ShapeField { name: "x", keys: X_KEYS },
        ShapeField { name: "y", keys: Y_KEYS },
        ShapeField { name: "z", keys: Z_KEYS },
    ],
};

/// Two-component vector: `x`, `y`.
pub static VECTOR2: Shape = Shape {
    name: "vector2",
    fields: &[
        ShapeField { name: "x", keys: X_KEYS },
        ShapeField { name: "y", keys: Y_KEYS },
    ],
};

lazy_static! {
    static ref SHAPES: HashMap<&'static str, &'static Shape> = {
        let mut m = HashMap::new();
        for shape in [&VECTOR, &VECTOR2] {
            m.insert(shape.name, shape);
        }
        m
    };
}

/// Look up a registered shape by name.
pub fn lookup(name: &str) -> Option<&'static Shape> {
    SHAPES.get(name).copied()
}

/// Names of all registered shapes, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = SHAPES.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Pick the registered shape whose fields are all present, preferring the
/// one with the most fields.
pub fn best_match(mut has_key: impl FnMut(ShapeKey) -> bool) -> Option<&'static Shape> {
    SHAPES
        .values()
        .copied()
        .filter(|shape| shape.matched_fields(&mut has_key) == shape.fields.len())
        .max_by_key(|shape| shape.fields.len())
}
