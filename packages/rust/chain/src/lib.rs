//! Sequential async pipeline engine.
//!
//! A [`Chain`] is a DAG of named [`Link`]s joined by guarded edges. Each link
//! receives an immutable [`Context`] and hands back a new one with its own keys
//! added; the chain walks from the entry link along the first edge whose
//! predicate holds.

pub mod chain;
pub mod context;
pub mod link;

pub use chain::{Chain, ChainHooks, SilentHooks};
pub use context::Context;
pub use link::{FnLink, Link};
