//! Boundary to the rasterizer guest.
//!
//! The guest owns a linear memory and exposes integer-only exports ([`guest::GuestExports`]). The
//! host side keeps a generational object table ([`heap::HeapTable`]), marshals strings and JSON
//! into guest allocations, reads results out of a shadow-stack scratch slot, and wraps guest
//! objects in handles with explicit `free()`.
//!
//! [`module::RenderBridge`] is the entry point: compile once, then render on pooled instances.

/// Guest allocator (shadow stack, free list, bump region).
pub mod alloc;
/// Rasterizer exports and the `usvg`/`resvg` guest.
pub mod guest;
/// Object table and host imports.
pub mod heap;
/// Guest instances and object wrappers.
pub mod instance;
/// String, byte and JSON marshalling.
pub mod marshal;
/// Linear memory and cached views.
pub mod memory;
/// Module compilation and the instance pool.
pub mod module;
/// Per-render options.
pub mod options;

pub use instance::{BBox, Bounds, Instance, RenderedImage, RenderedPng, Renderer};
pub use module::{ModuleSource, PoolStats, RasterModule, RenderBridge};
pub use options::{FitTo, FontOptions, RenderOptions};
