use core::sync::atomic::{AtomicU32, Ordering};

use crate::hal::pac;
use crate::hal::pac::interrupt;

static REFILLS: AtomicU32 = AtomicU32::new(0);

const REFILL: u8 = 0x7f;
const WINDOW: u8 = 0x5f;

/// Window watchdog with early-wakeup refill.
///
/// The hardware has no HAL driver; this follows the registers directly.
/// Once armed it cannot be stopped: the EWI handler must keep refilling the
/// downcounter or the chip resets.
pub struct WindowWatchdog {
    wwdg: pac::WWDG,
}

impl WindowWatchdog {
    pub fn new(wwdg: pac::WWDG) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.wwdgen().set_bit());
        Self { wwdg }
    }

    pub fn start(&mut self) {
        // PCLK1 / 4096 / 8 counter clock, refills allowed below the window
        self.wwdg
            .cfr
            .modify(|_, w| unsafe { w.wdgtb().bits(0b11).w().bits(WINDOW) });
        self.wwdg
            .cr
            .write(|w| unsafe { w.wdga().set_bit().t().bits(REFILL) });
        self.wwdg.sr.write(|w| w.ewif().clear_bit());
        self.wwdg.cfr.modify(|_, w| w.ewi().set_bit());
        unsafe { cortex_m::peripheral::NVIC::unmask(pac::Interrupt::WWDG) };
    }
}

/// How many times the early-wakeup handler has refilled the counter.
pub fn refill_count() -> u32 {
    REFILLS.load(Ordering::Relaxed)
}

#[interrupt]
fn WWDG() {
    let wwdg = unsafe { pac::Peripherals::steal().WWDG };
    wwdg.cr
        .write(|w| unsafe { w.wdga().set_bit().t().bits(REFILL) });
    wwdg.sr.write(|w| w.ewif().clear_bit());
    REFILLS.fetch_add(1, Ordering::Relaxed);
}
