use crate::hal::pac;

/// PWM compare range; one count per 72 MHz / 72 tick gives a 1 kHz carrier.
const STEPS: u16 = 1000;

/// Single-channel PWM output on TIM4 CH1 (PB6), used to dim the bench lamp.
pub struct PwmLamp {
    tim: pac::TIM4,
}

impl PwmLamp {
    pub fn new(tim: pac::TIM4) -> Self {
        let rcc = unsafe { &*pac::RCC::ptr() };

        // Enable and reset the timer
        rcc.apb1enr.modify(|_, w| w.tim4en().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim4rst().set_bit());
        rcc.apb1rstr.modify(|_, w| w.tim4rst().clear_bit());

        tim.psc.write(|w| w.psc().bits(71));
        tim.arr.write(|w| w.arr().bits(STEPS - 1));

        // PWM mode 1 with the compare preload so duty changes land on
        // update events instead of mid-period
        tim.ccmr1_output()
            .modify(|_, w| unsafe { w.oc1m().bits(0b110).oc1pe().set_bit() });
        tim.ccer.modify(|_, w| w.cc1e().set_bit());
        tim.cr1.modify(|_, w| w.arpe().set_bit().cen().set_bit());
        tim.egr.write(|w| w.ug().set_bit());

        let mut lamp = Self { tim };
        lamp.set_duty_percent(0);
        lamp
    }

    pub fn set_duty_percent(&mut self, percent: u8) {
        let percent = percent.min(100) as u32;
        let compare = (STEPS as u32 * percent / 100) as u16;
        self.tim.ccr1().write(|w| w.ccr().bits(compare));
    }
}
