use sense::capture::{CaptureCell, EdgeAction, Pulse};

use crate::hal::pac;
use crate::hal::pac::interrupt;

/// Counter ticks represented by one overflow at the 0xFFFF reload.
pub const TICKS_PER_OVERFLOW: u32 = 0xffff;

/// Prescaler for a 1 us tick off the 72 MHz timer clock.
const PSC_1MHZ: u16 = 71;

static CELL: CaptureCell = CaptureCell::new();

/// Set up TIM2 CH1 (PA0) to measure high pulses with capture and update
/// interrupts. The pin itself must already be a pull-down input.
pub fn init(tim: pac::TIM2, irq_prio: u8) {
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb1enr.modify(|_, w| w.tim2en().set_bit());
    rcc.apb1rstr.modify(|_, w| w.tim2rst().set_bit());
    rcc.apb1rstr.modify(|_, w| w.tim2rst().clear_bit());

    tim.psc.write(|w| w.psc().bits(PSC_1MHZ));
    tim.arr.write(|w| w.arr().bits(0xffff));

    // CH1 captures TI1 directly, rising edge first, no input filter
    tim.ccmr1_input()
        .write(|w| unsafe { w.cc1s().bits(0b01).ic1f().bits(0) });
    tim.ccer.modify(|_, w| w.cc1p().clear_bit().cc1e().set_bit());
    tim.dier.write(|w| w.uie().set_bit().cc1ie().set_bit());

    tim.egr.write(|w| w.ug().set_bit());
    tim.sr.write(|w| unsafe { w.bits(0) });
    tim.cr1.modify(|_, w| w.cen().set_bit());

    let core = unsafe { pac::CorePeripherals::steal() };
    let mut nvic = core.NVIC;
    unsafe {
        nvic.set_priority(pac::Interrupt::TIM2, irq_prio);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM2);
    }
}

/// Completed measurement, if one is latched. Consuming it re-arms the
/// capture cycle for the next rising edge.
pub fn poll() -> Option<Pulse> {
    CELL.take()
}

#[interrupt]
fn TIM2() {
    let tim = unsafe { pac::Peripherals::steal().TIM2 };
    let sr = tim.sr.read();

    if sr.uif().bit_is_set() {
        CELL.on_overflow();
    }

    if sr.cc1if().bit_is_set() {
        let captured = tim.ccr1().read().ccr().bits();
        match CELL.on_edge(captured) {
            EdgeAction::ArmFalling => {
                // Count from the rising edge and wait for the drop
                tim.cr1.modify(|_, w| w.cen().clear_bit());
                tim.cnt.write(|w| w.cnt().bits(0));
                tim.ccer.modify(|_, w| w.cc1p().set_bit());
                tim.cr1.modify(|_, w| w.cen().set_bit());
            }
            EdgeAction::ArmRising => {
                tim.ccer.modify(|_, w| w.cc1p().clear_bit());
            }
            EdgeAction::Ignore => {}
        }
    }

    tim.sr.write(|w| unsafe { w.bits(0) });
}
