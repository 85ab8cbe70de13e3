//! Single-capacity callback slot
//!
//! Holds the sender for the one job a bridge is waiting on. Every access goes
//! through one short-lived lock, so the engine thread and the waiting caller
//! never observe a half-updated slot.

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::result::internal_error_payload;

#[derive(Debug, Default)]
struct SlotInner {
    job_id: u64,
    valid: bool,
    sender: Option<Sender<String>>,
}

/// Storage for the callback awaiting the next result
#[derive(Debug, Default)]
pub struct CallbackSlot {
    inner: Mutex<SlotInner>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the completion sender for `job_id` and mark the slot valid
    pub(crate) fn arm(&self, job_id: u64, sender: Sender<String>) {
        let mut inner = self.inner.lock();
        inner.job_id = job_id;
        inner.valid = true;
        inner.sender = Some(sender);
    }

    /// Invalidate the slot if it still belongs to `job_id`.
    ///
    /// Returns false when the job already received its payload (or was never armed).
    pub(crate) fn disarm(&self, job_id: u64) -> bool {
        let mut inner = self.inner.lock();
        if !inner.valid || inner.job_id != job_id {
            return false;
        }
        inner.valid = false;
        inner.sender = None;
        true
    }

    /// Whether `job_id` is still waiting for its payload
    pub fn is_pending(&self, job_id: u64) -> bool {
        let inner = self.inner.lock();
        inner.valid && inner.job_id == job_id
    }

    fn deliver(&self, job_id: u64, payload: Option<&str>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.valid || inner.job_id != job_id {
            debug!(job_id, "Discarding OCR payload for a job that is no longer pending");
            return false;
        }
        inner.valid = false;
        let Some(sender) = inner.sender.take() else {
            return false;
        };

        let payload = match payload {
            None => internal_error_payload("null result from engine"),
            Some("") => internal_error_payload("empty result from engine"),
            Some(text) => text.to_string(),
        };

        // Capacity one and a single send per arm, so this never blocks.
        sender.try_send(payload).is_ok()
    }

    fn abandon(&self, job_id: u64) {
        if self.disarm(job_id) {
            debug!(job_id, "OCR job abandoned by engine");
        }
    }
}

/// Per-job handle an engine uses to hand back its single payload.
///
/// Cheap to clone and safe to use from any thread. Only the first delivery for
/// a job is accepted; anything after that, or after the job timed out, is dropped.
#[derive(Debug, Clone)]
pub struct ResultSink {
    slot: Arc<CallbackSlot>,
    job_id: u64,
}

impl ResultSink {
    pub(crate) fn new(slot: Arc<CallbackSlot>, job_id: u64) -> Self {
        Self { slot, job_id }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Deliver the engine's payload. `None` or an empty string is replaced by
    /// an internal-error JSON payload; any other text is passed through as is.
    ///
    /// Returns whether the payload reached a waiting caller.
    pub fn deliver(&self, payload: Option<&str>) -> bool {
        self.slot.deliver(self.job_id, payload)
    }

    /// Whether the job is still waiting for a payload
    pub fn is_pending(&self) -> bool {
        self.slot.is_pending(self.job_id)
    }

    /// Tell the waiting caller that no payload will ever come for this job
    pub fn abandon(self) {
        self.slot.abandon(self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn armed(job_id: u64) -> (Arc<CallbackSlot>, crossbeam_channel::Receiver<String>) {
        let slot = Arc::new(CallbackSlot::new());
        let (tx, rx) = bounded(1);
        slot.arm(job_id, tx);
        (slot, rx)
    }

    #[test]
    fn test_deliver_once() {
        let (slot, rx) = armed(1);
        let sink = ResultSink::new(Arc::clone(&slot), 1);

        assert!(sink.is_pending());
        assert!(sink.deliver(Some(r#"{"errcode":0}"#)));
        assert!(!sink.is_pending());
        assert!(!sink.deliver(Some("second")));

        assert_eq!(rx.recv().unwrap(), r#"{"errcode":0}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_null_payload_is_synthesized() {
        let (slot, rx) = armed(7);
        ResultSink::new(slot, 7).deliver(None);

        let payload: serde_json::Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
        assert_eq!(payload["errcode"], -1);
        assert!(payload["msg"].as_str().unwrap().contains("null"));
    }

    #[test]
    fn test_empty_payload_is_synthesized() {
        let (slot, rx) = armed(7);
        ResultSink::new(slot, 7).deliver(Some(""));

        let payload: serde_json::Value = serde_json::from_str(&rx.recv().unwrap()).unwrap();
        assert_eq!(payload["errcode"], -1);
    }

    #[test]
    fn test_whitespace_payload_is_passed_through() {
        let (slot, rx) = armed(8);
        ResultSink::new(slot, 8).deliver(Some("  "));

        assert_eq!(rx.recv().unwrap(), "  ");
    }

    #[test]
    fn test_stale_job_id_is_ignored() {
        let (slot, rx) = armed(2);
        let stale = ResultSink::new(Arc::clone(&slot), 1);

        assert!(!stale.deliver(Some("old")));
        assert!(slot.is_pending(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disarm() {
        let (slot, rx) = armed(3);

        assert!(!slot.disarm(4));
        assert!(slot.disarm(3));
        assert!(!slot.disarm(3));
        assert!(!ResultSink::new(slot, 3).deliver(Some("late")));
        // Sender dropped with the disarm
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_abandon_disconnects_receiver() {
        let (slot, rx) = armed(5);
        ResultSink::new(Arc::clone(&slot), 5).abandon();

        assert!(!slot.is_pending(5));
        assert!(rx.recv().is_err());
    }
}
