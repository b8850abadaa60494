//! Template lookup functions
//!
//! A lookup is a zero-argument value source exposed to parameter templates as
//! `{{ name() }}`, re-evaluated on every render.

pub mod file;
pub mod random_integer;

use serde_json::Value;

/// A value source callable from parameter templates.
pub trait Lookup: Send + Sync {
    fn lookup(&self) -> Value;
}
