//! Lunaris core: pure data helpers shared by the bridge.
//!
//! Nothing in this crate talks to the interpreter. It holds the Lua 5.4
//! coercion rules used by the permissive value conversions, the byte/text
//! codecs, and the process-wide registry of known table shapes.

pub mod codec;
pub mod coerce;
pub mod shape;

pub use codec::{CodecError, Endian};
pub use coerce::Number;
pub use shape::{Shape, ShapeField, ShapeKey};
