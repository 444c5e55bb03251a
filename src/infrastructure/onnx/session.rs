// SPDX-License-Identifier: MPL-2.0
//! Lazily constructed inference sessions.
//!
//! A [`LazySession`] stores only how to build its session. The session is
//! created on first use and then cached for the lifetime of the wrapper, so
//! model weights are loaded at most once no matter how often `run` is called.

use crate::application::port::{ModelError, ModelResult};
use crate::infrastructure::onnx::device::Device;
use ndarray::{ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type Loader<S> = Box<dyn Fn() -> ModelResult<S> + Send + Sync>;

/// A session built on first access and cached afterwards.
///
/// Access is serialized through a mutex: concurrent callers wait for the one
/// building the session instead of building their own.
pub struct LazySession<S = Session> {
    loader: Loader<S>,
    slot: Mutex<Option<S>>,
}

impl<S> fmt::Debug for LazySession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySession")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl<S> LazySession<S> {
    /// Creates a lazy session from a custom loader.
    pub fn with_loader(loader: impl Fn() -> ModelResult<S> + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    /// Runs `f` with the session, building it first if needed.
    ///
    /// A failed build leaves the slot empty so a later call can retry.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or whatever `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> ModelResult<R>) -> ModelResult<R> {
        let mut slot = self.lock()?;
        if slot.is_none() {
            *slot = Some((self.loader)()?);
        }
        match slot.as_mut() {
            Some(session) => f(session),
            None => Err(ModelError::ModelLoadFailed(
                "session missing after load".to_string(),
            )),
        }
    }

    /// Whether the session has been built.
    pub fn is_loaded(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> ModelResult<MutexGuard<'_, Option<S>>> {
        self.slot
            .lock()
            .map_err(|_| ModelError::InferenceFailed("Lock poisoned".to_string()))
    }
}

impl LazySession<Session> {
    /// Creates a lazy ONNX Runtime session for `model_file` on `device`.
    pub fn onnx(model_file: PathBuf, device: Device) -> Self {
        Self::with_loader(move || build_session(&model_file, device))
    }
}

/// Builds an ONNX Runtime session with full graph optimization.
///
/// # Errors
///
/// Returns [`ModelError::ModelNotFound`] if the file is missing and
/// [`ModelError::ModelLoadFailed`] if ONNX Runtime rejects it.
pub fn build_session(model_file: &Path, device: Device) -> ModelResult<Session> {
    if !model_file.is_file() {
        return Err(ModelError::ModelNotFound(model_file.display().to_string()));
    }

    tracing::info!(model = %model_file.display(), %device, "loading model session");

    let mut builder = Session::builder()
        .map_err(load_err)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_err)?;

    let providers = device.execution_providers();
    if !providers.is_empty() {
        builder = builder.with_execution_providers(providers).map_err(load_err)?;
    }

    builder.commit_from_file(model_file).map_err(load_err)
}

fn load_err(err: impl fmt::Display) -> ModelError {
    ModelError::ModelLoadFailed(err.to_string())
}

/// Name of the session's input at `index`, or `fallback` if the model does
/// not declare one.
pub fn input_name(session: &Session, index: usize, fallback: &str) -> String {
    session
        .inputs
        .get(index)
        .map_or_else(|| fallback.to_string(), |input| input.name.clone())
}

/// Copies the first output of a run into an owned `f32` array.
///
/// # Errors
///
/// Returns [`ModelError::PostprocessingFailed`] if there is no output or it
/// is not an `f32` tensor.
pub fn first_output(outputs: &SessionOutputs<'_>) -> ModelResult<ArrayD<f32>> {
    let (_, output) = outputs
        .iter()
        .next()
        .ok_or_else(|| ModelError::PostprocessingFailed("No output tensor".to_string()))?;

    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| ModelError::PostprocessingFailed(e.to_string()))?;

    let dims = shape
        .iter()
        .map(|&d| {
            usize::try_from(d).map_err(|_| {
                ModelError::PostprocessingFailed(format!("Invalid output dimension {d}"))
            })
        })
        .collect::<ModelResult<Vec<_>>>()?;

    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
        .map_err(|e| ModelError::PostprocessingFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_session(builds: &Arc<AtomicUsize>) -> LazySession<u32> {
        let builds = Arc::clone(builds);
        LazySession::with_loader(move || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(41)
        })
    }

    #[test]
    fn session_is_not_built_until_first_use() {
        let builds = Arc::new(AtomicUsize::new(0));
        let session = counting_session(&builds);
        assert!(!session.is_loaded());
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeated_use_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let session = counting_session(&builds);

        for _ in 0..3 {
            let value = session
                .with(|s| {
                    *s += 1;
                    Ok(*s)
                })
                .unwrap();
            assert!(value > 41);
        }

        assert!(session.is_loaded());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(session.with(|s| Ok(*s)).unwrap(), 44);
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        let builds = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(counting_session(&builds));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.with(|_| Ok(())))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_build_can_be_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let session = LazySession::with_loader(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ModelError::ModelNotFound("model.onnx".to_string()))
            } else {
                Ok(7_u8)
            }
        });

        assert!(matches!(
            session.with(|_| Ok(())),
            Err(ModelError::ModelNotFound(_))
        ));
        assert!(!session.is_loaded());
        assert_eq!(session.with(|s| Ok(*s)).unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_model_file_is_reported() {
        let session = LazySession::onnx(PathBuf::from("/nonexistent/model.onnx"), Device::Cpu);
        let result = session.with(|_| Ok(()));
        assert!(matches!(result, Err(ModelError::ModelNotFound(path)) if path.contains("model.onnx")));
        assert!(!session.is_loaded());
    }
}
