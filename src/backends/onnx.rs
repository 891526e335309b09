//! ONNX Runtime session construction and blocking inference
//!
//! Sessions are built with the requested execution provider when it is
//! available and silently degrade to CPU otherwise. Inference runs on the
//! blocking thread pool so async callers never stall the runtime.

use crate::config::ExecutionProvider;
use crate::error::{BannerError, Result};
use ndarray::ArrayD;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::Tensor;
use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// List execution providers with availability and a short description
#[must_use]
pub fn list_providers() -> Vec<(String, bool, String)> {
    let cuda = OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
    let coreml =
        OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false);
    vec![
        ("CPU".to_string(), true, "Always available".to_string()),
        (
            "CUDA".to_string(),
            cuda,
            "NVIDIA GPU acceleration (requires CUDA toolkit)".to_string(),
        ),
        (
            "CoreML".to_string(),
            coreml,
            "Apple Silicon acceleration (macOS only)".to_string(),
        ),
    ]
}

fn cuda_if_available() -> Option<ExecutionProviderDispatch> {
    let provider = CUDAExecutionProvider::default();
    if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
        Some(provider.build())
    } else {
        None
    }
}

fn coreml_if_available() -> Option<ExecutionProviderDispatch> {
    let provider = CoreMLExecutionProvider::default();
    if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
        Some(CoreMLExecutionProvider::default().with_subgraphs(true).build())
    } else {
        None
    }
}

/// Providers to register for a request, empty meaning CPU only
fn resolve_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
    let providers: Vec<_> = match requested {
        ExecutionProvider::Auto => [cuda_if_available(), coreml_if_available()]
            .into_iter()
            .flatten()
            .collect(),
        ExecutionProvider::Cpu => Vec::new(),
        ExecutionProvider::Cuda => cuda_if_available().into_iter().collect(),
        ExecutionProvider::CoreMl => coreml_if_available().into_iter().collect(),
    };

    if providers.is_empty() && requested != ExecutionProvider::Cpu {
        log::warn!(
            "{} execution provider not available, falling back to CPU",
            requested
        );
    }
    providers
}

fn load_error(model: &str, stage: &str, e: impl std::fmt::Display) -> BannerError {
    BannerError::resource_unavailable(format!("{}: {} failed: {}", model, stage, e))
}

/// A loaded model shared across concurrent requests
///
/// ONNX Runtime sessions need exclusive access per run, so calls are
/// serialized behind a mutex.
#[derive(Clone)]
pub struct OnnxSession {
    name: String,
    inputs: Vec<String>,
    session: Arc<Mutex<Session>>,
}

impl std::fmt::Debug for OnnxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSession")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl OnnxSession {
    /// Build a session from a weight file
    ///
    /// # Errors
    /// `ResourceUnavailable` if the file cannot be loaded as a model.
    pub fn load(
        name: &str,
        path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> Result<Self> {
        let started = std::time::Instant::now();
        let mut builder = Session::builder()
            .map_err(|e| load_error(name, "session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(name, "optimization level", e))?;

        let providers = resolve_providers(provider);
        if !providers.is_empty() {
            builder = builder
                .with_execution_providers(providers)
                .map_err(|e| load_error(name, "execution providers", e))?;
        }

        let threads = if intra_threads > 0 {
            intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = builder
            .with_intra_threads(threads)
            .map_err(|e| load_error(name, "intra threads", e))?
            .commit_from_file(path)
            .map_err(|e| load_error(name, "model load", e))?;

        let inputs = session.inputs.iter().map(|i| i.name.clone()).collect();
        log::info!(
            "Loaded {} from {} in {:.0}ms",
            name,
            path.display(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            name: name.to_string(),
            inputs,
            session: Arc::new(Mutex::new(session)),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the model with inputs in declaration order
    ///
    /// Returns every output as an owned `f32` array, in output order.
    ///
    /// # Errors
    /// `GenerationFailed` on input mismatch or runtime failure.
    pub async fn run(&self, inputs: Vec<ArrayD<f32>>) -> Result<Vec<ArrayD<f32>>> {
        if inputs.len() != self.inputs.len() {
            return Err(BannerError::generation_failed(format!(
                "{} expects {} inputs, got {}",
                self.name,
                self.inputs.len(),
                inputs.len()
            )));
        }

        let this = self.clone();
        tokio::task::spawn_blocking(move || this.run_blocking(inputs))
            .await
            .map_err(|e| BannerError::internal(format!("inference task failed: {}", e)))?
    }

    fn run_blocking(&self, inputs: Vec<ArrayD<f32>>) -> Result<Vec<ArrayD<f32>>> {
        let failed = |what: &str, e: &dyn std::fmt::Display| {
            BannerError::generation_failed(format!("{}: {}: {}", self.name, what, e))
        };

        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(inputs.len());
        for (name, array) in self.inputs.iter().zip(inputs) {
            let tensor = Tensor::from_array(array).map_err(|e| failed("input tensor", &e))?;
            values.push((Cow::Borrowed(name.as_str()), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| BannerError::internal("onnx session lock poisoned"))?;
        let started = std::time::Instant::now();
        let outputs = session.run(values).map_err(|e| failed("inference", &e))?;
        log::debug!(
            "{} inference: {:.2}ms",
            self.name,
            started.elapsed().as_secs_f64() * 1000.0
        );

        let keys: Vec<String> = outputs.keys().map(str::to_string).collect();
        let mut arrays = Vec::with_capacity(keys.len());
        for key in &keys {
            let array = outputs
                .get(key.as_str())
                .ok_or_else(|| {
                    BannerError::generation_failed(format!("{}: missing output {}", self.name, key))
                })?
                .try_extract_array::<f32>()
                .map_err(|e| failed("output tensor", &e))?
                .to_owned();
            arrays.push(array);
        }
        Ok(arrays)
    }
}
