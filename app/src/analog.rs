use embedded_hal::adc::OneShot;
use embedded_hal::blocking::delay::DelayMs;

use crate::hal::adc::Adc;
use crate::hal::gpio::gpioa::PA1;
use crate::hal::gpio::Analog;
use crate::hal::pac;
use crate::hal::rcc::Clocks;

/// Ambient light divider on PA1, read through ADC1.
pub struct LightSensor {
    adc: Adc<pac::ADC1>,
    pin: PA1<Analog>,
}

impl LightSensor {
    pub fn new(adc: pac::ADC1, pin: PA1<Analog>, clocks: Clocks) -> Self {
        Self {
            adc: Adc::adc1(adc, clocks),
            pin,
        }
    }

    pub fn read_raw(&mut self) -> u16 {
        self.adc.read(&mut self.pin).unwrap_or(0)
    }

    /// Average of `rounds` conversions spaced 5 ms apart.
    pub fn read_average<D: DelayMs<u16>>(&mut self, delay: &mut D, rounds: u8) -> u16 {
        let rounds = rounds.max(1);
        let mut acc: u32 = 0;
        for _ in 0..rounds {
            acc += self.read_raw() as u32;
            delay.delay_ms(5);
        }
        (acc / rounds as u32) as u16
    }
}
