//! Catalog domain model.
//!
//! # Responsibility
//! - Define item, reference and role records shared by repository and services.
//! - Own write-side validation rules so every write path applies the same ones.
//!
//! # Invariants
//! - Items are identified by store-generated `i64` ids.
//! - Every item points at exactly one row of each reference kind.

pub mod item;
pub mod reference;
pub mod role;
pub mod validation;
