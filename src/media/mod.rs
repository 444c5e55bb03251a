// SPDX-License-Identifier: MPL-2.0
//! Image handling shared by every model: loading uploads, converting between
//! images and tensors, and diffusion sampling.

pub mod image;
pub mod scheduler;
pub mod tensor;

pub use image::{load_image, SUPPORTED_EXTENSIONS};
pub use scheduler::DdimScheduler;
