//! Audio focus for desktop platforms

use bridge_traits::playback::AudioFocus;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Desktop mixers let every application play at once, so focus is always
/// granted. Holding state is tracked for diagnostics only.
#[derive(Debug, Default)]
pub struct DesktopAudioFocus {
    held: AtomicBool,
}

impl DesktopAudioFocus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl AudioFocus for DesktopAudioFocus {
    fn request_focus(&self) -> bool {
        self.held.store(true, Ordering::SeqCst);
        trace!("Audio focus granted");
        true
    }

    fn abandon_focus(&self) {
        self.held.store(false, Ordering::SeqCst);
        trace!("Audio focus abandoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_is_always_granted() {
        let focus = DesktopAudioFocus::new();
        assert!(!focus.is_held());
        assert!(focus.request_focus());
        assert!(focus.is_held());
        focus.abandon_focus();
        assert!(!focus.is_held());
    }
}
