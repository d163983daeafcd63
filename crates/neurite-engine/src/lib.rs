//! Compact quantized feed-forward inference engine
//!
//! This crate loads precompiled binary models and evaluates them within
//! microcontroller-class constraints: one arena per model, no global
//! state, fixed work per inference. Models carry a sparse feed-forward graph in
//! topological order together with normalization limits, and come in three
//! quantization levels (8-bit and 16-bit fixed point, 32-bit float).
//!
//! ## Loading
//!
//! Models load from a file path or straight out of a caller-owned byte
//! buffer. Buffer loads can run zero-copy: when the on-disk byte order
//! matches the host, the immutable parameter tables alias the caller's
//! buffer instead of being copied into a private arena.
//!
//! ```rust,no_run
//! use neurite_engine::Model;
//!
//! # fn main() -> neurite_engine::Result<()> {
//! # let blob: &[u8] = &[];
//! // `false` requests the zero-copy mapping when eligible
//! let mut model = Model::from_memory(blob, false)?;
//!
//! let mut sample = vec![0.0f32; model.inputs_dim() as usize];
//! if let Some(outputs) = model.predict(&mut sample) {
//!     println!("prediction: {outputs:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `std` (default): file-backed byte sources and [`Model::from_file`].
//!   Without it the engine is buffer-only.
//! - `q16`, `q32` (default): the 16-bit and 32-bit kernels. Models using a
//!   disabled quantization level are rejected at load time.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod error;
pub mod format;
pub mod source;

mod codec;
mod infer;
mod model;
mod sigmoid;
mod views;

// Re-export essential types
pub use codec::load_model;
pub use error::{ModelError, Result};
pub use model::{Model, ModelOptions, Quantization, TaskKind};
pub use source::ByteSource;
