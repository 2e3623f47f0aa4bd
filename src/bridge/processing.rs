use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

use crate::bridge::error::{FilterError, Result};
use crate::bridge::filter::{FrameFilter, Filtered};
use crate::convert::packed::{FrameView, PackedFrame};
use crate::source::types::Dimensions;

/// Whether a filter is wired up behind the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeStatus {
    Connected { filter: String, info: String },
    Unavailable { reason: String },
}

/// Result of handing one frame to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome<'a> {
    /// The filter ran; present this view.
    Filtered(FrameView<'a>),
    /// No filter is connected; present the unfiltered frame.
    PassThrough,
    /// The filter failed on this frame; present the unfiltered frame.
    Failed(FilterError),
}

/// Hands packed frames to an external filter and takes back the result.
///
/// The bridge never owns the frame. A filter that errors or panics affects
/// only the frame it was processing. If the filter could not be loaded or its
/// `info()` probe fails, the bridge stays unavailable and every call passes
/// the frame through.
pub struct ProcessingBridge {
    status: BridgeStatus,
    filter: Option<Box<dyn FrameFilter>>,
}

impl ProcessingBridge {
    /// Probe `filter` with `info()` and connect it if the probe succeeds.
    pub fn connect(filter: Box<dyn FrameFilter>) -> Self {
        let name = filter.name().to_string();
        let probe = panic::catch_unwind(AssertUnwindSafe(|| filter.info()));
        match probe {
            Ok(Ok(description)) => {
                info!(filter = %name, "processing bridge connected: {description}");
                Self {
                    status: BridgeStatus::Connected {
                        filter: name,
                        info: description,
                    },
                    filter: Some(filter),
                }
            }
            Ok(Err(e)) => Self::unavailable(format!("{name}: {e}")),
            Err(payload) => Self::unavailable(format!(
                "{name}: info() panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Connect the result of a filter load, or record why it failed.
    pub fn from_load(loaded: Result<Box<dyn FrameFilter>>) -> Self {
        match loaded {
            Ok(filter) => Self::connect(filter),
            Err(e) => Self::unavailable(e.to_string()),
        }
    }

    /// A bridge with nothing behind it.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!("processing bridge unavailable, frames will pass through: {reason}");
        Self {
            status: BridgeStatus::Unavailable { reason },
            filter: None,
        }
    }

    pub fn status(&self) -> &BridgeStatus {
        &self.status
    }

    pub fn is_available(&self) -> bool {
        self.filter.is_some()
    }

    /// Run the filter on `frame`.
    ///
    /// On `Failed` the frame may have been partially modified; callers that
    /// need the unfiltered image must keep their own copy.
    pub fn apply<'a>(&'a mut self, frame: &'a mut PackedFrame) -> BridgeOutcome<'a> {
        let Some(filter) = self.filter.as_deref_mut() else {
            return BridgeOutcome::PassThrough;
        };
        let input = frame.dims();

        let frame_ref = &mut *frame;
        let result = panic::catch_unwind(AssertUnwindSafe(move || {
            let (filter, frame_ref) = (filter, frame_ref);
            filter.apply(frame_ref)
        }));

        match result {
            Ok(Ok(Filtered::InPlace)) => {
                let frame: &'a PackedFrame = frame;
                BridgeOutcome::Filtered(frame.view())
            }
            Ok(Ok(Filtered::Replaced(view))) => match check_replacement(input, view) {
                Ok(()) => BridgeOutcome::Filtered(view),
                Err(e) => BridgeOutcome::Failed(e),
            },
            Ok(Err(e)) => BridgeOutcome::Failed(e),
            Err(payload) => {
                BridgeOutcome::Failed(FilterError::Panicked(panic_message(payload.as_ref())))
            }
        }
    }
}

fn check_replacement(input: Dimensions, output: FrameView<'_>) -> Result<()> {
    if output.dims().is_empty() {
        return Err(FilterError::InvalidOutput(format!(
            "empty frame ({})",
            output.dims()
        )));
    }
    if !output.dims().fits_within(input) {
        return Err(FilterError::InvalidOutput(format!(
            "{} is larger than the {input} input",
            output.dims()
        )));
    }
    Ok(())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
