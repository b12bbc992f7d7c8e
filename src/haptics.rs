//! Haptic feedback signals.
//!
//! The manager does not drive any hardware. It tells a [`HapticSink`] which
//! signal an operation calls for, and only when the haptics preference is
//! enabled; the UI layer decides how to play it.

/// The feedback an operation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HapticSignal {
    /// Small confirmation: unmarking, clearing marks, deleting one frame.
    Light,
    /// Marking a position, deleting several frames.
    Medium,
    /// Clearing the whole extracted library.
    Heavy,
    /// A batch extraction finished.
    Success,
}

/// Receiver of haptic signals.
///
/// Signals are notifications only: `emit` must return promptly and cannot
/// fail or influence the operation that produced it.
pub trait HapticSink: Send + Sync {
    /// Play or forward one signal.
    fn emit(&self, signal: HapticSignal);
}

/// Discards every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHaptics;

impl HapticSink for NoOpHaptics {
    fn emit(&self, _signal: HapticSignal) {}
}
