//! Engine worker thread.
//!
//! The ONNX sessions and the benchmark set live on one dedicated OS
//! thread; the async CLI talks to it over channels. Long batches
//! (seconds to minutes of detection/embedding work) therefore never block
//! the interactive task, and Ctrl-C only has to flip the shared
//! cancellation flag.

use facegrade_core::{
    run_batch, BenchmarkSet, ComparisonResult, ExtractError, MatchError, Pipeline,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),
    #[error("matching error: {0}")]
    Match(#[from] MatchError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Progress event emitted after each batch item.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub index: usize,
    pub total: usize,
    pub name: String,
}

/// Messages sent from the CLI to the engine thread.
enum EngineRequest {
    AddBenchmark {
        path: PathBuf,
        label: String,
        /// `Ok(true)` when a face was found and enrolled, `Ok(false)` when
        /// the reference image contains no detectable face.
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    RateBatch {
        paths: Vec<PathBuf>,
        progress: mpsc::Sender<ProgressEvent>,
        reply: oneshot::Sender<Result<BTreeMap<PathBuf, ComparisonResult>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll one reference image into the benchmark set.
    pub async fn add_benchmark(&self, path: PathBuf, label: String) -> Result<bool, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::AddBenchmark {
                path,
                label,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Rate a batch of images against the enrolled benchmarks, streaming
    /// progress events after every item.
    pub async fn rate_batch(
        &self,
        paths: Vec<PathBuf>,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<BTreeMap<PathBuf, ComparisonResult>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::RateBatch {
                paths,
                progress,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Takes ownership of the fully constructed pipeline (models already
/// loaded, fail-fast happened in the caller) and an externally shared
/// cancellation flag, then enters a request loop.
pub fn spawn_engine(mut pipeline: Pipeline, cancel: Arc<AtomicBool>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegrade-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut benchmarks = BenchmarkSet::new();

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::AddBenchmark { path, label, reply } => {
                        let result = enroll(&mut pipeline, &mut benchmarks, &path, label);
                        let _ = reply.send(result);
                    }
                    EngineRequest::RateBatch {
                        paths,
                        progress,
                        reply,
                    } => {
                        let result = run_batch(
                            &paths,
                            &benchmarks,
                            &mut pipeline,
                            &mut |index, total, name| {
                                let _ = progress.blocking_send(ProgressEvent {
                                    index,
                                    total,
                                    name: name.to_string(),
                                });
                            },
                            &cancel,
                        )
                        .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn enroll(
    pipeline: &mut Pipeline,
    benchmarks: &mut BenchmarkSet,
    path: &std::path::Path,
    label: String,
) -> Result<bool, EngineError> {
    match pipeline.describe_path(path)? {
        Some(descriptor) => {
            benchmarks.add(label.clone(), descriptor)?;
            tracing::info!(label = %label, path = %path.display(), "benchmark enrolled");
            Ok(true)
        }
        None => {
            tracing::warn!(path = %path.display(), "no face detected in reference image");
            Ok(false)
        }
    }
}
