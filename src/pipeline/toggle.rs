use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether frames are routed through the processing bridge.
///
/// Written by the UI side through a [`ToggleHandle`], read once per frame by
/// the pipeline worker. Accesses use `Relaxed` ordering: the flag guards no
/// other memory, and a reader seeing the previous value for one more frame is
/// acceptable.
#[derive(Debug, Clone)]
pub struct ProcessingToggle {
    enabled: Arc<AtomicBool>,
}

impl ProcessingToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// Current value. Called once per frame boundary.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// A write-only handle for the UI side.
    pub fn handle(&self) -> ToggleHandle {
        ToggleHandle {
            enabled: Arc::clone(&self.enabled),
        }
    }
}

impl Default for ProcessingToggle {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Write-only side of a [`ProcessingToggle`]. No return values, no
/// acknowledgement: the change is picked up at the next frame boundary.
#[derive(Debug, Clone)]
pub struct ToggleHandle {
    enabled: Arc<AtomicBool>,
}

impl ToggleHandle {
    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn flip(&self) {
        self.enabled.fetch_xor(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_disabled() {
        assert!(!ProcessingToggle::default().is_enabled());
    }

    #[test]
    fn handle_writes_are_visible_to_reader() {
        let toggle = ProcessingToggle::new(false);
        let handle = toggle.handle();
        handle.set(true);
        assert!(toggle.is_enabled());
        handle.set(false);
        assert!(!toggle.is_enabled());
    }

    #[test]
    fn flip_inverts_the_flag() {
        let toggle = ProcessingToggle::new(true);
        let handle = toggle.handle();
        handle.flip();
        assert!(!toggle.is_enabled());
        handle.flip();
        assert!(toggle.is_enabled());
    }

    #[test]
    fn handle_is_usable_from_another_thread() {
        let toggle = ProcessingToggle::new(false);
        let handle = toggle.handle();
        std::thread::spawn(move || handle.set(true)).join().unwrap();
        assert!(toggle.is_enabled());
    }

    #[test]
    fn toggle_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProcessingToggle>();
        assert_send_sync::<ToggleHandle>();
    }
}
