// SPDX-License-Identifier: MPL-2.0
//! Device selection for ONNX Runtime sessions.

use crate::config::DevicePreference;
use ort::execution_providers::ExecutionProviderDispatch;
use std::fmt;

/// Hardware a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Picks CUDA when this build supports it and a GPU is usable, else CPU.
    #[must_use]
    pub fn detect() -> Self {
        if cuda_available() {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }

    /// Resolves a configured preference to a concrete device.
    ///
    /// Asking for CUDA without CUDA support falls back to the CPU.
    #[must_use]
    pub fn from_preference(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            _ => Self::resolve(preference, Self::detect()),
        }
    }

    fn resolve(preference: DevicePreference, detected: Device) -> Self {
        match (preference, detected) {
            (DevicePreference::Cpu, _) => Device::Cpu,
            (DevicePreference::Auto, detected) => detected,
            (DevicePreference::Cuda, Device::Cuda) => Device::Cuda,
            (DevicePreference::Cuda, Device::Cpu) => {
                tracing::warn!("CUDA requested but unavailable, running on the CPU");
                Device::Cpu
            }
        }
    }

    /// Returns `true` for GPU devices.
    #[must_use]
    pub fn is_accelerated(self) -> bool {
        matches!(self, Device::Cuda)
    }

    /// Execution providers to register on a session builder, in priority order.
    ///
    /// The CPU provider is ONNX Runtime's implicit fallback and is never listed.
    #[must_use]
    pub fn execution_providers(self) -> Vec<ExecutionProviderDispatch> {
        match self {
            Device::Cpu => Vec::new(),
            #[cfg(feature = "cuda")]
            Device::Cuda => {
                vec![ort::execution_providers::CUDAExecutionProvider::default().build()]
            }
            #[cfg(not(feature = "cuda"))]
            Device::Cuda => Vec::new(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        })
    }
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(err) => {
            tracing::debug!(error = %err, "could not query CUDA availability");
            false
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    false
}
