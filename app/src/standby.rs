use cortex_m::peripheral::SCB;

use crate::hal::pac;

/// Drop into standby mode. Execution resumes with a system reset when the
/// WKUP pin (PA0) rises.
pub fn enter(scb: &mut SCB, pwr: &pac::PWR) -> ! {
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb1enr.modify(|_, w| w.pwren().set_bit());

    // Clear the wake-up flag, select power-down deepsleep, arm WKUP
    pwr.cr.modify(|_, w| w.cwuf().set_bit().pdds().set_bit());
    pwr.csr.modify(|_, w| w.ewup().set_bit());
    scb.set_sleepdeep();

    loop {
        cortex_m::asm::wfi();
    }
}
