//! Synchronous bridge
//!
//! Turns one asynchronous job submission plus one eventual engine callback into
//! a single blocking call. At most one job is in flight per bridge: concurrent
//! callers are serialized on a submission lock that is separate from the
//! short-lived slot lock the engine thread takes.

pub mod slot;

use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::engine::{OcrEngine, OcrJob};
use crate::error::BridgeError;
use crate::result::OcrResult;

pub use slot::{CallbackSlot, ResultSink};

/// Where the bridge is in its current (or last) job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    #[default]
    Idle,
    Submitting,
    AwaitingCallback,
    /// Payload received (success or engine-reported error)
    Completed,
    RejectedAtSubmit,
    TimedOut,
    /// Engine gave up on the job without delivering a payload
    Abandoned,
}

/// Bridge behaviour knobs
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Upper bound on the wait for the engine callback. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl BridgeOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Raw engine payload plus its parsed form, if it parsed
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub raw: String,
    pub result: Option<OcrResult>,
}

/// Blocking facade over a callback-driven [`OcrEngine`]
pub struct OcrBridge<E> {
    engine: E,
    options: BridgeOptions,
    submit_lock: Mutex<()>,
    slot: Arc<CallbackSlot>,
    next_job_id: AtomicU64,
    state: Mutex<BridgeState>,
    #[cfg(test)]
    deadline_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl<E: OcrEngine> OcrBridge<E> {
    /// Create a bridge that waits indefinitely for each result
    pub fn new(engine: E) -> Self {
        Self::with_options(engine, BridgeOptions::default())
    }

    pub fn with_options(engine: E, options: BridgeOptions) -> Self {
        Self {
            engine,
            options,
            submit_lock: Mutex::new(()),
            slot: Arc::new(CallbackSlot::new()),
            next_job_id: AtomicU64::new(1),
            state: Mutex::new(BridgeState::Idle),
            #[cfg(test)]
            deadline_hook: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// State of the current or most recent job
    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    fn set_state(&self, job_id: u64, state: BridgeState) {
        debug!(job_id, ?state, "OCR bridge state change");
        *self.state.lock() = state;
    }

    /// Run OCR on one image and block until the engine delivers its JSON payload.
    ///
    /// An engine-reported recognition failure is still `Ok`: inspect `errcode`
    /// in the payload. The engine is told to stop after every accepted job.
    pub fn run(&self, image_path: &str) -> Result<String, BridgeError> {
        validate_image_path(image_path)?;

        let _submission = self.submit_lock.lock();

        let job = OcrJob::new(self.next_job_id.fetch_add(1, Ordering::Relaxed), image_path);
        let job_id = job.id();
        let (sender, receiver) = bounded(1);

        self.set_state(job_id, BridgeState::Submitting);
        self.slot.arm(job_id, sender);

        let sink = ResultSink::new(Arc::clone(&self.slot), job_id);
        match self.engine.submit(&job, sink) {
            Ok(true) => {}
            Ok(false) => {
                self.slot.disarm(job_id);
                self.set_state(job_id, BridgeState::RejectedAtSubmit);
                warn!(job_id, image = image_path, "{} rejected OCR job", self.engine.name());
                return Err(BridgeError::SubmissionFailed {
                    image_path: image_path.to_string(),
                });
            }
            Err(e) => {
                self.slot.disarm(job_id);
                self.set_state(job_id, BridgeState::RejectedAtSubmit);
                return Err(e);
            }
        }

        let _stop = scopeguard::guard((), |_| self.stop_engine(job_id));

        self.set_state(job_id, BridgeState::AwaitingCallback);
        let received = match self.options.timeout {
            Some(timeout) => receiver.recv_timeout(timeout),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(payload) => {
                self.set_state(job_id, BridgeState::Completed);
                debug!(
                    job_id,
                    elapsed = ?job.submitted_at().elapsed(),
                    bytes = payload.len(),
                    "OCR result received"
                );
                Ok(payload)
            }
            Err(RecvTimeoutError::Timeout) => {
                #[cfg(test)]
                if let Some(hook) = self.deadline_hook.lock().take() {
                    hook();
                }
                if !self.slot.disarm(job_id) {
                    // Delivered between the deadline and the disarm.
                    if let Ok(payload) = receiver.try_recv() {
                        self.set_state(job_id, BridgeState::Completed);
                        return Ok(payload);
                    }
                }
                self.set_state(job_id, BridgeState::TimedOut);
                let waited = job.submitted_at().elapsed();
                warn!(job_id, image = image_path, ?waited, "OCR engine did not call back in time");
                Err(BridgeError::Timeout {
                    image_path: image_path.to_string(),
                    waited,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.set_state(job_id, BridgeState::Abandoned);
                Err(BridgeError::CallbackDropped {
                    image_path: image_path.to_string(),
                })
            }
        }
    }

    /// Run OCR and parse the payload. Parse failures keep the raw payload.
    pub fn recognize(&self, image_path: &str) -> Result<OcrOutput, BridgeError> {
        let started = Instant::now();
        let raw = self.run(image_path)?;

        let result = match OcrResult::from_json(&raw) {
            Ok(result) => {
                info!(
                    image = image_path,
                    errcode = result.errcode,
                    regions = result.ocr_response.len(),
                    elapsed = ?started.elapsed(),
                    "OCR finished"
                );
                Some(result)
            }
            Err(e) => {
                warn!(image = image_path, "OCR payload is not a recognizable result: {}", e);
                None
            }
        };

        Ok(OcrOutput { raw, result })
    }

    fn stop_engine(&self, job_id: u64) {
        if let Err(e) = self.engine.stop() {
            warn!(job_id, "Failed to stop {}: {}", self.engine.name(), e);
        }
    }
}

/// Reject paths that cannot cross the native boundary
fn validate_image_path(image_path: &str) -> Result<(), BridgeError> {
    if image_path.trim().is_empty() {
        return Err(BridgeError::InvalidPath {
            reason: "image path is empty".to_string(),
        });
    }
    if image_path.contains('\0') {
        return Err(BridgeError::InvalidPath {
            reason: "image path contains a NUL byte".to_string(),
        });
    }
    Ok(())
}
