//! Filters compiled separately and loaded from a shared library.
//!
//! The library must export two C ABI functions:
//!
//! ```c
//! const char *frame_filter_info(void);
//! int32_t frame_filter_apply(uint8_t *rgba, uint32_t width, uint32_t height, uint32_t stride);
//! ```
//!
//! `frame_filter_apply` edits the RGBA buffer in place and returns 0 on
//! success. The buffer is only valid for the duration of the call.

use libloading::Library;
use std::ffi::{c_char, CStr};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::bridge::error::{FilterError, Result};
use crate::bridge::filter::{FrameFilter, Filtered};
use crate::convert::packed::{PackedFrame, BYTES_PER_PIXEL};

const INFO_SYMBOL: &[u8] = b"frame_filter_info\0";
const APPLY_SYMBOL: &[u8] = b"frame_filter_apply\0";

type InfoFn = unsafe extern "C" fn() -> *const c_char;
type ApplyFn = unsafe extern "C" fn(*mut u8, u32, u32, u32) -> i32;

/// A filter backed by a dynamically loaded library.
pub struct NativeFilter {
    path: PathBuf,
    name: String,
    info_fn: InfoFn,
    apply_fn: ApplyFn,
    // Keeps the code behind the function pointers mapped; must outlive them.
    _library: Library,
}

impl NativeFilter {
    /// Load the library at `path` and resolve both entry points.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: loading runs the library's initialisers; the library is
        // trusted to be a frame filter built for this ABI.
        let library = unsafe { Library::new(&path) }
            .map_err(|e| FilterError::Load(format!("{}: {e}", path.display())))?;

        // SAFETY: the symbol types match the documented C signatures. The
        // copied function pointers stay valid while `library` is alive, and
        // it is stored alongside them.
        let (info_fn, apply_fn) = unsafe {
            let info = *library
                .get::<InfoFn>(INFO_SYMBOL)
                .map_err(|_| FilterError::MissingSymbol("frame_filter_info".to_string()))?;
            let apply = *library
                .get::<ApplyFn>(APPLY_SYMBOL)
                .map_err(|_| FilterError::MissingSymbol("frame_filter_apply".to_string()))?;
            (info, apply)
        };

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "native".to_string());
        debug!(path = %path.display(), "loaded native filter library");

        Ok(Self {
            path,
            name,
            info_fn,
            apply_fn,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameFilter for NativeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> Result<String> {
        // SAFETY: `info_fn` was resolved from the loaded library.
        let ptr = unsafe { (self.info_fn)() };
        if ptr.is_null() {
            return Err(FilterError::Info("frame_filter_info returned null".to_string()));
        }
        // SAFETY: the ABI requires a NUL-terminated string that lives at
        // least until the next call into the library.
        let info = unsafe { CStr::from_ptr(ptr) };
        Ok(info.to_string_lossy().into_owned())
    }

    fn apply<'a>(&'a mut self, frame: &mut PackedFrame) -> Result<Filtered<'a>> {
        let (width, height) = (frame.width(), frame.height());
        let stride = width * BYTES_PER_PIXEL as u32;
        let pixels = frame.data_mut();
        // SAFETY: `pixels` is exactly `stride * height` bytes and is not
        // moved or resized until the call returns.
        let code = unsafe { (self.apply_fn)(pixels.as_mut_ptr(), width, height, stride) };
        if code != 0 {
            return Err(FilterError::Rejected { code });
        }
        Ok(Filtered::InPlace)
    }
}
