//! `wcocr.dll` engine handle
//!
//! Exposes the module's `wechat_ocr` and `stop_ocr` exports. Opening the handle
//! never fails: the module is loaded and each export resolved on first use, and
//! a resolution failure is reported to that call only.
//!
//! The native callback carries no user-data pointer, so results are routed
//! through a process-wide slot holding the pending job's [`ResultSink`] and
//! image path. Only one job can be pending on it at a time, across every
//! `NativeEngine`. A payload whose `imgpath` names a different image is a late
//! result of an abandoned job and is dropped without touching the pending one.

use once_cell::sync::OnceCell;
use parking_lot::{const_mutex, Mutex};
use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{OcrEngine, OcrJob};
use crate::bridge::ResultSink;
use crate::error::BridgeError;

const SUBMIT_SYMBOL: &str = "wechat_ocr";
const STOP_SYMBOL: &str = "stop_ocr";

type OcrCallback = extern "C" fn(result: *const c_char) -> i32;
type SubmitFn = unsafe extern "C" fn(
    ocr_exe: *const u16,
    wechat_dir: *const u16,
    image_path: *const c_char,
    callback: OcrCallback,
) -> u8;
type StopFn = unsafe extern "C" fn();

/// Job currently routed to the native callback
struct PendingJob {
    sink: ResultSink,
    image_path: String,
}

static PENDING: Mutex<Option<PendingJob>> = const_mutex(None);

/// Entry point handed to the engine. Runs on an engine-owned thread and must
/// return quickly: it only decodes the payload and hands it to the sink.
extern "C" fn on_ocr_result(result: *const c_char) -> i32 {
    let payload = if result.is_null() {
        None
    } else {
        // SAFETY: the engine passes a NUL-terminated string that stays valid
        // for the duration of this call; it is copied before returning.
        Some(unsafe { CStr::from_ptr(result) }.to_string_lossy().into_owned())
    };

    let mut pending = PENDING.lock();
    let reported = payload.as_deref().and_then(payload_image_path);
    if let (Some(job), Some(reported)) = (pending.as_ref(), reported) {
        if !same_image_path(&reported, &job.image_path) {
            // Late result of a job that timed out; the routed job is still waiting.
            debug!(
                job_id = job.sink.job_id(),
                image = %reported,
                "Dropping OCR result for another image"
            );
            return 0;
        }
    }

    match pending.take() {
        Some(job) => {
            if !job.sink.deliver(payload.as_deref()) {
                debug!(job_id = job.sink.job_id(), "OCR result arrived after the caller gave up");
            }
        }
        None => debug!("OCR result arrived with no pending job"),
    }
    0
}

/// `imgpath` reported by an engine payload, if it parses and carries one
fn payload_image_path(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value.get("imgpath")?.as_str().map(str::to_string)
}

/// Windows path comparison: separators and ASCII case are not significant
fn same_image_path(a: &str, b: &str) -> bool {
    let normalize = |path: &str| path.replace('/', "\\").to_ascii_lowercase();
    normalize(a) == normalize(b)
}

/// Lazily-resolved handle to the WeChat OCR wrapper module
pub struct NativeEngine {
    module_path: PathBuf,
    ocr_exe: Vec<u16>,
    wechat_dir: Vec<u16>,
    module: OnceCell<loader::Module>,
    submit_fn: OnceCell<SubmitFn>,
    stop_fn: OnceCell<StopFn>,
}

impl NativeEngine {
    /// Create a handle for `module_path`. Nothing is loaded until the first job.
    ///
    /// `ocr_exe` is the WeChatOCR executable and `wechat_dir` the WeChat
    /// installation directory the engine loads its runtime from.
    pub fn open(
        module_path: impl Into<PathBuf>,
        ocr_exe: impl AsRef<Path>,
        wechat_dir: impl AsRef<Path>,
    ) -> Self {
        let module_path = module_path.into();
        info!("Using OCR module {}", module_path.display());

        Self {
            module_path,
            ocr_exe: to_wide(ocr_exe.as_ref()),
            wechat_dir: to_wide(wechat_dir.as_ref()),
            module: OnceCell::new(),
            submit_fn: OnceCell::new(),
            stop_fn: OnceCell::new(),
        }
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    fn module(&self, symbol: &'static str) -> Result<&loader::Module, BridgeError> {
        self.module.get_or_try_init(|| {
            debug!("Loading OCR module {}", self.module_path.display());
            loader::Module::load(&self.module_path)
                .map_err(|reason| BridgeError::SymbolNotFound { symbol, reason })
        })
    }

    fn resolve(&self, symbol: &'static str) -> Result<loader::RawSymbol, BridgeError> {
        let module = self.module(symbol)?;
        module
            .symbol(symbol)
            .map_err(|reason| BridgeError::SymbolNotFound { symbol, reason })
    }

    fn submit_fn(&self) -> Result<SubmitFn, BridgeError> {
        self.submit_fn
            .get_or_try_init(|| {
                let raw = self.resolve(SUBMIT_SYMBOL)?;
                // SAFETY: `wechat_ocr` is exported with exactly this signature.
                Ok(unsafe { std::mem::transmute::<loader::RawSymbol, SubmitFn>(raw) })
            })
            .copied()
    }

    fn stop_fn(&self) -> Result<StopFn, BridgeError> {
        self.stop_fn
            .get_or_try_init(|| {
                let raw = self.resolve(STOP_SYMBOL)?;
                // SAFETY: `stop_ocr` takes no arguments and returns nothing.
                Ok(unsafe { std::mem::transmute::<loader::RawSymbol, StopFn>(raw) })
            })
            .copied()
    }
}

impl OcrEngine for NativeEngine {
    fn submit(&self, job: &OcrJob, sink: ResultSink) -> Result<bool, BridgeError> {
        let submit = self.submit_fn()?;
        let image_path = CString::new(job.image_path()).map_err(|_| BridgeError::InvalidPath {
            reason: "image path contains a NUL byte".to_string(),
        })?;

        install_pending(sink, job.image_path())?;

        debug!(job_id = job.id(), image = job.image_path(), "Submitting OCR job");
        // SAFETY: all three strings are NUL-terminated and outlive the call;
        // the engine copies them before returning.
        let accepted = unsafe {
            submit(
                self.ocr_exe.as_ptr(),
                self.wechat_dir.as_ptr(),
                image_path.as_ptr(),
                on_ocr_result,
            )
        } != 0;

        if !accepted {
            clear_pending(job.id());
        }
        Ok(accepted)
    }

    fn stop(&self) -> Result<(), BridgeError> {
        let stop = match self.stop_fn() {
            Ok(stop) => stop,
            Err(e) => {
                debug!("Cannot stop OCR engine: {}", e);
                return Err(e);
            }
        };
        // SAFETY: resolved from the module with a no-argument signature.
        unsafe { stop() };
        Ok(())
    }

    fn name(&self) -> &str {
        "wcocr"
    }
}

/// Route the next native callback to `sink`, unless another job still waits on it
fn install_pending(sink: ResultSink, image_path: &str) -> Result<(), BridgeError> {
    let mut pending = PENDING.lock();
    if pending.as_ref().is_some_and(|job| job.sink.is_pending()) {
        return Err(BridgeError::EngineBusy);
    }
    *pending = Some(PendingJob {
        sink,
        image_path: image_path.to_string(),
    });
    Ok(())
}

fn clear_pending(job_id: u64) {
    let mut pending = PENDING.lock();
    if pending.as_ref().is_some_and(|job| job.sink.job_id() == job_id) {
        *pending = None;
    }
}

/// NUL-terminated UTF-16 for the engine's wide-string parameters
#[cfg(windows)]
fn to_wide(path: &Path) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(not(windows))]
fn to_wide(path: &Path) -> Vec<u16> {
    path.to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(windows)]
mod loader {
    use std::ffi::CString;
    use std::path::Path;
    use windows::core::{HSTRING, PCSTR};
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

    pub(super) type RawSymbol = unsafe extern "system" fn() -> isize;

    /// Loaded module. Never freed: the OS unloads it at process exit.
    pub(super) struct Module(HMODULE);

    // SAFETY: a module handle is a process-wide base address, valid on any thread.
    unsafe impl Send for Module {}
    unsafe impl Sync for Module {}

    impl Module {
        pub(super) fn load(path: &Path) -> Result<Self, String> {
            let wide = HSTRING::from(path.as_os_str());
            // SAFETY: `wide` is a valid NUL-terminated wide string.
            unsafe { LoadLibraryW(&wide) }
                .map(Self)
                .map_err(|e| format!("cannot load {}: {}", path.display(), e))
        }

        pub(super) fn symbol(&self, name: &str) -> Result<RawSymbol, String> {
            let name_c = CString::new(name).map_err(|e| e.to_string())?;
            // SAFETY: the module handle stays loaded for the life of the process.
            unsafe { GetProcAddress(self.0, PCSTR::from_raw(name_c.as_ptr().cast())) }
                .ok_or_else(|| format!("module does not export `{name}`"))
        }
    }
}

#[cfg(not(windows))]
mod loader {
    use std::path::Path;

    pub(super) type RawSymbol = unsafe extern "system" fn() -> isize;

    /// Native OCR modules only exist on Windows; no value of this type is ever built.
    pub(super) enum Module {}

    impl Module {
        pub(super) fn load(path: &Path) -> Result<Self, String> {
            Err(format!(
                "cannot load {}: native OCR modules are only supported on Windows",
                path.display()
            ))
        }

        pub(super) fn symbol(&self, _name: &str) -> Result<RawSymbol, String> {
            match *self {}
        }
    }
}
