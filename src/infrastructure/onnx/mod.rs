// SPDX-License-Identifier: MPL-2.0
//! ONNX Runtime adapters implementing the [`ImageModel`] port trait.
//!
//! - [`Rmbg`]: background removal
//! - [`SuperResolution`]: latent-diffusion 4x upscaling
//!
//! Both wrap [`LazySession`]s, so constructing them is cheap and model
//! weights are only read when the first image is processed.
//!
//! [`ImageModel`]: crate::application::port::ImageModel

pub mod device;
pub mod rmbg;
pub mod session;
pub mod super_resolution;

pub use device::Device;
pub use rmbg::{Rmbg, RMBG_FILES};
pub use session::LazySession;
pub use super_resolution::{SuperResolution, SUPER_RESOLUTION_FILES};
