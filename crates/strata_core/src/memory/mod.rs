//! # Memory Management
//!
//! Allocators backing archetype blocks.
//!
//! ## Design Philosophy
//!
//! Block payloads and block headers churn independently:
//! - Payloads come from a fixed-capacity slab of 64-byte aligned buffers
//! - Headers live in a fixed-capacity pool addressed by handle
//! - Freed memory goes back on a free list, never to the system allocator

mod pool;
mod slab;

pub use pool::{PoolAllocator, PoolHandle};
pub use slab::{CacheLine, SlabAllocator, SlabBuffer, CACHE_LINE};
