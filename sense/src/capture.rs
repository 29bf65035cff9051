//! Pulse-width measurement over a free-running 16-bit timer.
//!
//! The interrupt handler feeds edges and overflows into a [`CaptureCell`];
//! the main context polls it. Phase, overflow count and completion all live
//! in one atomic word together with the latched counter value, so the
//! consumer can read-and-clear a finished measurement in a single exchange
//! with no torn-read window against the next interrupt.
//!
//! Word layout mirrors the classic status byte: bit 7 completion, bit 6
//! armed-for-falling, bits 5..0 overflow count, with the 16-bit capture
//! value packed below it.

use core::sync::atomic::{AtomicU32, Ordering};

const DONE: u32 = 0x80;
const ACTIVE: u32 = 0x40;
const OVERFLOW_MASK: u32 = 0x3f;

/// What the interrupt handler must do to the timer after feeding in an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeAction {
    /// Rising edge accepted: zero and restart the counter, then capture the
    /// falling edge next.
    ArmFalling,
    /// Falling edge accepted: capture the rising edge next.
    ArmRising,
    /// A finished measurement is still latched; leave the timer alone.
    Ignore,
}

/// One completed high-level measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pulse {
    /// Timer overflows seen while the level was high.
    pub overflows: u8,
    /// Counter value latched at the falling edge, or 0xFFFF if the pulse
    /// outlived the measurable range.
    pub ticks: u16,
}

impl Pulse {
    /// Total duration in timer ticks, given the tick count per overflow.
    pub fn total_ticks(&self, period: u32) -> u32 {
        self.overflows as u32 * period + self.ticks as u32
    }

    /// True when the measurement hit the overflow ceiling instead of a
    /// falling edge.
    pub fn is_saturated(&self) -> bool {
        self.overflows == OVERFLOW_MASK as u8 && self.ticks == 0xffff
    }
}

/// Shared state word between the capture interrupt and its consumer.
///
/// `on_edge` and `on_overflow` must only be called from one interrupt
/// context; `peek` and `take` belong to the main context. Once a
/// measurement completes the handlers stop writing until `take` clears the
/// word, which is what makes the single-exchange consume race-free.
pub struct CaptureCell(AtomicU32);

impl CaptureCell {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    fn pack(status: u32, value: u16) -> u32 {
        (status << 16) | value as u32
    }

    fn decode(word: u32) -> Option<Pulse> {
        if word >> 16 & DONE == 0 {
            return None;
        }
        Some(Pulse {
            overflows: (word >> 16 & OVERFLOW_MASK) as u8,
            ticks: word as u16,
        })
    }

    /// Feed a timer overflow in. Only counts while armed for the falling
    /// edge; at the 6-bit ceiling the measurement completes saturated.
    pub fn on_overflow(&self) {
        let word = self.0.load(Ordering::Relaxed);
        let status = word >> 16;
        if status & DONE != 0 || status & ACTIVE == 0 {
            return;
        }
        let next = if status & OVERFLOW_MASK == OVERFLOW_MASK {
            Self::pack(status | DONE, 0xffff)
        } else {
            Self::pack(status + 1, word as u16)
        };
        self.0.store(next, Ordering::Relaxed);
    }

    /// Feed a capture-compare event in and learn how to re-arm the timer.
    pub fn on_edge(&self, captured: u16) -> EdgeAction {
        let word = self.0.load(Ordering::Relaxed);
        let status = word >> 16;
        if status & DONE != 0 {
            return EdgeAction::Ignore;
        }
        if status & ACTIVE == 0 {
            self.0.store(Self::pack(ACTIVE, 0), Ordering::Relaxed);
            EdgeAction::ArmFalling
        } else {
            self.0.store(Self::pack(status | DONE, captured), Ordering::Relaxed);
            EdgeAction::ArmRising
        }
    }

    /// Completed measurement, if any, without consuming it.
    pub fn peek(&self) -> Option<Pulse> {
        Self::decode(self.0.load(Ordering::Relaxed))
    }

    /// Consume a completed measurement and re-arm for the next rising edge.
    pub fn take(&self) -> Option<Pulse> {
        if self.peek().is_none() {
            return None;
        }
        Self::decode(self.0.swap(0, Ordering::Relaxed))
    }
}

impl Default for CaptureCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn measures_across_overflows() {
        let cell = CaptureCell::new();

        assert_eq!(cell.on_edge(1234), EdgeAction::ArmFalling);
        assert_eq!(cell.peek(), None, "nothing to report while armed");

        cell.on_overflow();
        cell.on_overflow();
        assert_eq!(cell.on_edge(1000), EdgeAction::ArmRising);

        let pulse = cell.peek().unwrap();
        assert_eq!(pulse, Pulse { overflows: 2, ticks: 1000 });
        assert_eq!(pulse.total_ticks(0xffff), 2 * 0xffff + 1000);
    }

    #[test]
    fn completed_state_reads_are_idempotent() {
        let cell = CaptureCell::new();
        cell.on_edge(0);
        cell.on_edge(777);

        assert_eq!(cell.peek(), cell.peek());
        assert_eq!(cell.peek().unwrap().ticks, 777);
    }

    #[test]
    fn completion_is_terminal_until_taken() {
        let cell = CaptureCell::new();
        cell.on_edge(0);
        cell.on_edge(500);

        // further hardware events must not disturb the latched result
        cell.on_overflow();
        assert_eq!(cell.on_edge(9999), EdgeAction::Ignore);
        assert_eq!(cell.peek().unwrap(), Pulse { overflows: 0, ticks: 500 });

        assert_eq!(cell.take().unwrap().ticks, 500);
        assert_eq!(cell.take(), None);
        // cleared word means the next rising edge starts a fresh cycle
        assert_eq!(cell.on_edge(0), EdgeAction::ArmFalling);
    }

    #[test]
    fn saturates_after_sixtyfour_overflows() {
        let cell = CaptureCell::new();
        cell.on_edge(0);

        for _ in 0..63 {
            cell.on_overflow();
        }
        assert_eq!(cell.peek(), None, "63 overflows still fit the counter");

        cell.on_overflow();
        let pulse = cell.peek().unwrap();
        assert_eq!(pulse.overflows, 0x3f);
        assert_eq!(pulse.ticks, 0xffff);
        assert!(pulse.is_saturated());
    }

    #[test]
    fn overflow_does_not_count_while_idle() {
        let cell = CaptureCell::new();
        cell.on_overflow();
        assert_eq!(cell.peek(), None);

        // a stray overflow must not have pre-armed anything
        assert_eq!(cell.on_edge(0), EdgeAction::ArmFalling);
        cell.on_edge(250);
        assert_eq!(cell.take().unwrap(), Pulse { overflows: 0, ticks: 250 });
    }
}
