// SPDX-License-Identifier: MPL-2.0
//! Application layer: use cases and orchestration.
//!
//! - [`port`]: trait definitions that infrastructure implements
//! - [`studio`]: applying a model to an uploaded image and keeping the result
//!
//! # Dependency Rule
//!
//! - The application layer depends only on ports, never on ONNX Runtime
//! - Infrastructure implements application layer ports
//! - The CLI wires concrete adapters into the studio

pub mod port;
pub mod studio;

pub use studio::Studio;
