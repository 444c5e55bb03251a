// SPDX-License-Identifier: MPL-2.0
//! `pixel_magic` applies pretrained image models to user images.
//!
//! Two models are offered: background removal (RMBG) and 4x super-resolution
//! (latent diffusion). Both run through ONNX Runtime behind the
//! [`ImageModel`](application::port::ImageModel) port, load their weights
//! lazily on first use, and write their results as timestamped PNG files.

#![doc(html_root_url = "https://docs.rs/pixel_magic/0.1.0")]

pub mod app;
pub mod application;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod media;

#[cfg(test)]
pub mod test_utils;
