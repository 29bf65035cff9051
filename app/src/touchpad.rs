use sense::ChargeTimer;

use crate::hal::pac;

/// Prescaler for a 1 us tick off the 72 MHz timer clock.
const PSC_1MHZ: u16 = 71;
const CEILING: u16 = 0xffff;

/// Charge-time sensing pad on PA6, watched by TIM3 CH1.
///
/// The capture channel latches the counter when the pad's charge curve
/// crosses the input threshold; between measurements the same pin is
/// driven low to drain the pad.
pub struct ChargePad {
    tim: pac::TIM3,
}

impl ChargePad {
    pub fn new(tim: pac::TIM3) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.apb1enr.modify(|_, w| w.tim3en().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim3rst().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim3rst().clear_bit());

        tim.psc.write(|w| w.psc().bits(PSC_1MHZ));
        tim.arr.write(|w| w.arr().bits(CEILING));

        // CH1 captures TI1 directly on the rising edge, no input filter
        tim.ccmr1_input()
            .write(|w| unsafe { w.cc1s().bits(0b01).ic1f().bits(0) });
        tim.ccer.modify(|_, w| w.cc1p().clear_bit().cc1e().set_bit());
        tim.egr.write(|w| w.ug().set_bit());
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self { tim }
    }

    // The pad pin flips between output-low and floating-input at runtime;
    // the typed pin API fixes the mode in the type, so poke CRL directly.
    fn drive_low(&mut self) {
        let gpioa = unsafe { &*pac::GPIOA::ptr() };
        gpioa
            .crl
            .modify(|_, w| unsafe { w.mode6().bits(0b11).cnf6().bits(0b00) });
        gpioa.bsrr.write(|w| w.br6().set_bit());
    }

    fn float(&mut self) {
        let gpioa = unsafe { &*pac::GPIOA::ptr() };
        gpioa
            .crl
            .modify(|_, w| unsafe { w.mode6().bits(0b00).cnf6().bits(0b01) });
    }
}

impl ChargeTimer for ChargePad {
    fn max_count(&self) -> u16 {
        CEILING
    }

    fn discharge(&mut self) {
        self.drive_low();
    }

    fn rearm(&mut self) {
        self.tim.sr.write(|w| unsafe { w.bits(0) });
        self.tim.cnt.write(|w| w.cnt().bits(0));
    }

    fn release(&mut self) {
        self.float();
    }

    fn count(&self) -> u16 {
        self.tim.cnt.read().cnt().bits()
    }

    fn capture(&mut self) -> Option<u16> {
        if self.tim.sr.read().cc1if().bit_is_set() {
            Some(self.tim.ccr1().read().ccr().bits())
        } else {
            None
        }
    }
}
