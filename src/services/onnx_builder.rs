// Shared ONNX Runtime session construction and pooling for the detection and OCR models

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

/// Thread count for ONNX Runtime CPU inference.
///
/// Windows is capped at 6 threads; more cores there only add synchronization overhead.
fn optimal_intra_op_threads() -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = std::cmp::min(6, total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = total_cores.max(1);

    debug!("CPU threads: {} total cores, using {} for inference", total_cores, optimal);
    optimal
}

/// Build a session for the model at `model_path`, preferring compiled-in GPU providers.
///
/// Returns (backend_name, Session)
pub fn build_session(model_path: &Path, model_name: &str) -> Result<(String, Session)> {
    if !model_path.exists() {
        anyhow::bail!(
            "{} model not found at {}",
            model_name,
            model_path.display()
        );
    }

    #[cfg(feature = "tensorrt")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([TensorRTExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using TensorRT acceleration for {}", model_name);
            return Ok(("TensorRT".to_string(), session));
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([CUDAExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using CUDA acceleration for {}", model_name);
            return Ok(("CUDA".to_string(), session));
        }
    }

    let session = Session::builder()
        .context(format!("Failed to create ONNX session builder for {}", model_name))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context(format!("Failed to configure CPU execution provider for {}", model_name))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context(format!("Failed to set graph optimization level for {}", model_name))?
        .with_intra_threads(optimal_intra_op_threads())
        .context(format!("Failed to configure intra-op threads for {}", model_name))?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load {} ONNX model from {}",
            model_name,
            model_path.display()
        ))?;

    if cfg!(any(feature = "cuda", feature = "tensorrt")) {
        warn!("⚠️  GPU provider unavailable, using CPU inference for {}", model_name);
    }
    Ok(("CPU".to_string(), session))
}

/// Fixed-size pool of sessions for one model.
///
/// Sessions need `&mut` to run, so concurrent requests each borrow their own.
pub struct OnnxSessionPool {
    sender: Sender<Session>,
    receiver: Receiver<Session>,
    device_type: String,
}

impl OnnxSessionPool {
    /// Load `size` sessions of the model at `model_path`
    pub fn load(model_path: &Path, model_name: &str, size: usize) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = bounded(size);

        let mut device_type = String::new();
        for i in 0..size {
            debug!("Creating {} session {} of {}", model_name, i + 1, size);
            let (backend, session) = build_session(model_path, model_name)?;
            device_type = backend;
            sender
                .send(session)
                .map_err(|_| anyhow::anyhow!("Failed to add {} session to pool", model_name))?;
        }

        info!("✓ {}: {} ({} sessions)", model_name, device_type, size);

        Ok(Self {
            sender,
            receiver,
            device_type,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Borrow a session, blocking until one is free.
    ///
    /// The session goes back to the pool when the guard drops, even on error paths.
    pub fn acquire(&self) -> Result<PooledSession<'_>> {
        let session = self
            .receiver
            .recv()
            .context("ONNX session pool is closed")?;
        Ok(PooledSession {
            session: Some(session),
            sender: &self.sender,
        })
    }
}

pub struct PooledSession<'a> {
    session: Option<Session>,
    sender: &'a Sender<Session>,
}

impl Deref for PooledSession<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        // Only taken in Drop
        self.session.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = self.sender.send(session);
        }
    }
}
