//! # STRATA Shared
//!
//! Plain value types used by the storage core and by the systems that
//! consume it (renderer, physics, editor).
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on engine state or GPU crates.
//! Everything here is `Pod` so it can live inside archetype blocks.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod math;

pub use math::{Mat4, Quat, Vec3};
