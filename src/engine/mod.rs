//! OCR engine capability
//!
//! The recognition engine is an external collaborator: the bridge only needs
//! "submit a job with a result sink" and "stop". The production implementation
//! drives `wcocr.dll`; tests plug in in-process engines.

#[cfg(test)]
pub(crate) mod mock;
pub mod native;

use std::time::Instant;

use crate::bridge::ResultSink;
use crate::error::BridgeError;

pub use native::NativeEngine;

/// One request to recognize text in a single image
#[derive(Debug, Clone)]
pub struct OcrJob {
    id: u64,
    image_path: String,
    submitted_at: Instant,
}

impl OcrJob {
    pub(crate) fn new(id: u64, image_path: &str) -> Self {
        Self {
            id,
            image_path: image_path.to_string(),
            submitted_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

/// Callback-driven OCR engine
pub trait OcrEngine: Send + Sync {
    /// Hand a job to the engine.
    ///
    /// `Ok(true)` means the engine accepted the job and will call `sink` once,
    /// from any thread. `Ok(false)` means it refused and `sink` will never fire.
    fn submit(&self, job: &OcrJob, sink: ResultSink) -> Result<bool, BridgeError>;

    /// Best-effort engine-wide halt, issued after every accepted job
    fn stop(&self) -> Result<(), BridgeError>;

    /// Engine name for logs
    fn name(&self) -> &str;
}

impl<E: OcrEngine + ?Sized> OcrEngine for std::sync::Arc<E> {
    fn submit(&self, job: &OcrJob, sink: ResultSink) -> Result<bool, BridgeError> {
        (**self).submit(job, sink)
    }

    fn stop(&self) -> Result<(), BridgeError> {
        (**self).stop()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
