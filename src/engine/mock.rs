//! Scriptable in-process engine for bridge tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::{OcrEngine, OcrJob};
use crate::bridge::ResultSink;
use crate::error::BridgeError;

#[derive(Debug, Clone)]
pub(crate) enum MockBehavior {
    /// Deliver the payload before `submit` returns
    Immediate(String),
    /// Deliver the payload from a spawned thread after `delay`
    Threaded { payload: String, delay: Duration },
    /// Deliver a result whose `imgpath` is the job's image path
    EchoPath,
    /// `EchoPath` from a spawned thread after `delay`
    ThreadedEcho { delay: Duration },
    /// Fire every previously held sink, then behave like `EchoPath`
    StaleThenEcho,
    /// Deliver a null payload
    Null,
    /// Refuse the job
    Reject,
    /// Accept the job and keep the sink without ever delivering
    Silent,
    /// Accept the job, then give up on it
    Abandon,
    /// Fail symbol resolution
    MissingSymbol,
}

pub(crate) struct MockEngine {
    behavior: Mutex<MockBehavior>,
    fail_stop: bool,
    held: Mutex<Vec<ResultSink>>,
    submits: AtomicUsize,
    stops: AtomicUsize,
    deliveries: AtomicUsize,
    stale_rejected: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn echo_payload(image_path: &str) -> String {
    serde_json::json!({
        "errcode": 0,
        "imgpath": image_path,
        "width": 10,
        "height": 10,
        "ocr_response": [],
    })
    .to_string()
}

impl MockEngine {
    pub(crate) fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            fail_stop: false,
            held: Mutex::new(Vec::new()),
            submits: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            deliveries: AtomicUsize::new(0),
            stale_rejected: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub(crate) fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub(crate) fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }

    pub(crate) fn stale_rejected(&self) -> usize {
        self.stale_rejected.load(Ordering::SeqCst)
    }

    pub(crate) fn take_held_sinks(&self) -> Vec<ResultSink> {
        std::mem::take(&mut *self.held.lock())
    }

    pub(crate) fn held_sinks(&self) -> usize {
        self.held.lock().len()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn deliver(&self, sink: &ResultSink, payload: Option<&str>) {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        sink.deliver(payload);
    }

    fn deliver_later(&self, sink: ResultSink, payload: String, delay: Duration) {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            thread::sleep(delay);
            sink.deliver(Some(&payload));
        });
    }
}

impl OcrEngine for MockEngine {
    fn submit(&self, job: &OcrJob, sink: ResultSink) -> Result<bool, BridgeError> {
        let behavior = self.behavior.lock().clone();
        if matches!(behavior, MockBehavior::MissingSymbol) {
            return Err(BridgeError::SymbolNotFound {
                symbol: "wechat_ocr",
                reason: "mock module has no such export".to_string(),
            });
        }

        self.submits.fetch_add(1, Ordering::SeqCst);
        if matches!(behavior, MockBehavior::Reject) {
            return Ok(false);
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        match behavior {
            MockBehavior::Immediate(payload) => self.deliver(&sink, Some(&payload)),
            MockBehavior::Threaded { payload, delay } => self.deliver_later(sink, payload, delay),
            MockBehavior::EchoPath => self.deliver(&sink, Some(&echo_payload(job.image_path()))),
            MockBehavior::ThreadedEcho { delay } => {
                self.deliver_later(sink, echo_payload(job.image_path()), delay)
            }
            MockBehavior::StaleThenEcho => {
                for stale in self.held.lock().drain(..) {
                    if !stale.deliver(Some("stale")) {
                        self.stale_rejected.fetch_add(1, Ordering::SeqCst);
                    }
                }
                self.deliver(&sink, Some(&echo_payload(job.image_path())));
            }
            MockBehavior::Null => self.deliver(&sink, None),
            MockBehavior::Silent => self.held.lock().push(sink),
            MockBehavior::Abandon => sink.abandon(),
            MockBehavior::Reject | MockBehavior::MissingSymbol => unreachable!(),
        }

        Ok(true)
    }

    fn stop(&self) -> Result<(), BridgeError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(BridgeError::SymbolNotFound {
                symbol: "stop_ocr",
                reason: "mock module has no such export".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock engine"
    }
}
