// SPDX-License-Identifier: MPL-2.0
//! Infrastructure layer adapters.
//!
//! Concrete implementations of the port traits defined in
//! `application::port`, plus the plumbing they need.
//!
//! - [`onnx`]: model inference via ONNX Runtime (implements [`ImageModel`])
//! - [`model_store`]: locating and downloading model files
//!
//! [`ImageModel`]: crate::application::port::ImageModel

pub mod model_store;
pub mod onnx;

pub use model_store::{ModelFile, ModelSource, ModelStore};
pub use onnx::{Device, Rmbg, SuperResolution};
