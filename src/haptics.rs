use std::io::Write;

use tracing::info;

/// Fire-and-forget feedback when the active slot changes between ticks.
pub trait HapticTrigger {
    fn pulse(&mut self);
}

/// Terminal stand-in for device haptics: logs the pulse and optionally rings the bell.
pub struct TerminalHaptics {
    bell: bool,
    pulses: u64,
}

impl TerminalHaptics {
    pub fn new(bell: bool) -> Self {
        Self { bell, pulses: 0 }
    }

    pub fn pulses(&self) -> u64 {
        self.pulses
    }
}

impl HapticTrigger for TerminalHaptics {
    fn pulse(&mut self) {
        self.pulses += 1;
        info!(pulse = self.pulses, "rotation changed");
        if self.bell {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
    }
}
