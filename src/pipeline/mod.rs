//! Pipeline stages for archiving one item.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! page_loop ──▶ capture ──▶ staging ──▶ assemble ──▶ backup
//! (cursor)     (upscale)   (N.png)     (PDF)        (move + clear)
//! ```
//!
//! 1. [`page_loop`] — drive the rendering session page by page, with
//!    periodic session resets and one-step recovery
//! 2. [`capture`]   — decode the viewer surface and resample it; runs in
//!    `spawn_blocking`
//! 3. [`staging`]   — ordered, overwrite-tolerant on-disk page store
//! 4. [`assemble`]  — fit every staged page onto a fixed canvas and write the
//!    document atomically
//! 5. [`backup`]    — move staged pages to a collision-safe per-item
//!    directory and empty the store

pub mod assemble;
pub mod backup;
pub mod capture;
pub mod page_loop;
pub mod staging;
