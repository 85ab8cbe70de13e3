//! wcocr-bridge - blocking facade over the WeChat OCR engine
//!
//! The engine (`wcocr.dll`) takes a job and answers later, once, through a C
//! callback on a thread of its own. [`OcrBridge`] turns that into a plain
//! blocking call returning the engine's JSON payload.
//!
//! ```no_run
//! use wcocr_bridge::{NativeEngine, OcrBridge};
//!
//! let engine = NativeEngine::open("wcocr.dll", r"C:\WeChatOCR\WeChatOCR.exe", r"D:\WeChat");
//! let bridge = OcrBridge::new(engine);
//! let json = bridge.run(r"C:\shots\screen.png")?;
//! println!("{json}");
//! # Ok::<(), wcocr_bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod result;

pub use bridge::{BridgeOptions, BridgeState, OcrBridge, OcrOutput, ResultSink};
pub use engine::{NativeEngine, OcrEngine, OcrJob};
pub use error::BridgeError;
pub use result::{OcrItem, OcrResult};
