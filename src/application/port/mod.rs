// SPDX-License-Identifier: MPL-2.0
//! Port definitions (traits) for dependency inversion.
//!
//! The application layer talks to models only through [`ImageModel`], so
//! the studio can be driven by ONNX adapters in production and by plain
//! in-memory doubles in tests.
//!
//! - Traits are `Send + Sync` so models can be shared across threads
//! - Methods return `Result` with [`ModelError`]

pub mod model;

pub use model::{ImageModel, ModelCapabilities, ModelError, ModelKind, ModelResult};
