//! OCR result payload
//!
//! Typed view over the JSON the engine delivers through its callback. The bridge
//! itself only transports the raw string; parsing is optional for callers.

use serde::{Deserialize, Serialize};

/// Error code the bridge uses for payloads it synthesizes itself
pub const INTERNAL_ERROR_CODE: i32 = -1;

/// One detected text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrItem {
    /// Recognized text
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    /// Recognition confidence (0.0 - 1.0)
    pub rate: f64,
}

impl OcrItem {
    /// Bounding box as (left, top, right, bottom)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (self.left, self.top, self.right, self.bottom)
    }
}

/// Full result of one OCR job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OcrResult {
    /// Zero on success
    pub errcode: i32,
    #[serde(default)]
    pub imgpath: String,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    /// Text regions in engine order
    #[serde(default)]
    pub ocr_response: Vec<OcrItem>,
    /// Present on error payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl OcrResult {
    /// Parse a raw engine payload
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn is_success(&self) -> bool {
        self.errcode == 0
    }

    /// Engine or bridge error description, if this payload reports a failure
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        Some(match &self.msg {
            Some(msg) => format!("errcode {}: {}", self.errcode, msg),
            None => format!("errcode {}", self.errcode),
        })
    }

    /// All recognized text joined by newlines, in engine order
    pub fn text(&self) -> String {
        self.ocr_response
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build the payload delivered in place of a missing engine result
pub fn internal_error_payload(reason: &str) -> String {
    serde_json::json!({
        "errcode": INTERNAL_ERROR_CODE,
        "msg": reason,
    })
    .to_string()
}
