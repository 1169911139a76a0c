//! Result assembler: flat rows from every statement of a request -> nested,
//! transformed objects.

mod arena;
mod connection;

pub use arena::{NodeId, PendingGroup, ResultArena};
pub use connection::{shape_many, FinalNode};
