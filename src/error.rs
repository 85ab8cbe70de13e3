//! Error types for the OCR bridge
//!
//! Recognition failures reported by the engine are not errors at this level:
//! they arrive as a successful call whose JSON payload carries `errcode != 0`.

use std::time::Duration;
use thiserror::Error;

/// Failures of a single bridge call
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A native entry point (or the module providing it) could not be resolved
    #[error("failed to resolve `{symbol}`: {reason}")]
    SymbolNotFound {
        symbol: &'static str,
        reason: String,
    },

    /// The engine refused the job; no callback will arrive for it
    #[error("engine rejected OCR job for {image_path}")]
    SubmissionFailed { image_path: String },

    /// The engine accepted the job but never called back in time
    #[error("no OCR result for {image_path} after {waited:?}")]
    Timeout { image_path: String, waited: Duration },

    /// Another job is already pending on the process-wide native callback
    #[error("native OCR engine already has a job in flight")]
    EngineBusy,

    /// The image path cannot be passed across the native boundary
    #[error("invalid image path: {reason}")]
    InvalidPath { reason: String },

    /// The result sink was dropped without delivering a payload
    #[error("engine dropped the result callback for {image_path} without delivering")]
    CallbackDropped { image_path: String },
}

impl BridgeError {
    /// Whether the engine accepted the job before this error occurred
    pub fn was_accepted(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CallbackDropped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_not_found_message() {
        let err = BridgeError::SymbolNotFound {
            symbol: "wechat_ocr",
            reason: "module not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to resolve `wechat_ocr`: module not found"
        );
    }

    #[test]
    fn test_was_accepted() {
        let timeout = BridgeError::Timeout {
            image_path: "a.png".to_string(),
            waited: Duration::from_millis(5),
        };
        assert!(timeout.was_accepted());

        let rejected = BridgeError::SubmissionFailed {
            image_path: "a.png".to_string(),
        };
        assert!(!rejected.was_accepted());
        assert!(!BridgeError::EngineBusy.was_accepted());
    }
}
