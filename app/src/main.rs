#![no_main]
#![no_std]

use core::cell::RefCell;
use core::fmt::Write;

use cortex_m::interrupt::Mutex;
use cortex_m_rt::entry;
use panic_halt as _;

use stm32f1xx_hal as hal;

use sense::touch::TouchSampler;
use sense::{TouchConfig, TouchError};

use crate::hal::gpio::gpiob::PB12;
use crate::hal::gpio::{Output, PushPull};
use crate::hal::pac;
use crate::hal::pac::interrupt;
use crate::hal::prelude::*;
use crate::hal::serial::{Config, Serial};
use crate::hal::timer::{CounterHz, Event};
use crate::hal::watchdog::IndependentWatchdog;

use crate::keys::Key;

mod analog;
mod dma;
mod keys;
mod pulse;
mod pwm;
mod serial;
mod standby;
mod touchpad;
mod watchdog;

static TOUCH_CONFIG: TouchConfig = TouchConfig {
    gate: 100,
    plausible_factor: 10,
    settle_ms: 5,
    calibration_gap_ms: 10,
    timeout_margin: 500,
    cooldown: 3,
    burst_single: 3,
    burst_continuous: 6,
};

static BANNER: &[u8] = b"\r\nf103 peripheral bench\r\n";

static HEARTBEAT: Mutex<RefCell<Option<CounterHz<pac::TIM1>>>> = Mutex::new(RefCell::new(None));
static STATUS_LED: Mutex<RefCell<Option<PB12<Output<PushPull>>>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();
    let mut nvic = cp.NVIC;
    let mut scb = cp.SCB;

    let mut flash = dp.FLASH.constrain();
    let rcc = dp.RCC.constrain();

    // 8 MHz crystal through the PLL: 72 MHz core, 36 MHz APB1, 12 MHz ADC
    let clocks = rcc
        .cfgr
        .use_hse(8.MHz())
        .sysclk(72.MHz())
        .pclk1(36.MHz())
        .pclk2(72.MHz())
        .adcclk(12.MHz())
        .freeze(&mut flash.acr);

    let mut afio = dp.AFIO.constrain();
    let mut exti = dp.EXTI;
    let pwr = dp.PWR;

    let mut gpioa = dp.GPIOA.split();
    let mut gpiob = dp.GPIOB.split();
    let mut gpioc = dp.GPIOC.split();

    let mut delay = cp.SYST.delay(&clocks);

    // Board LED blinks from the main loop; the status LED belongs to the
    // heartbeat timer interrupt
    let mut board_led = gpioc.pc13.into_push_pull_output(&mut gpioc.crh);
    board_led.set_high(); // active low, start dark
    let status_led = gpiob.pb12.into_push_pull_output(&mut gpiob.crh);

    // USART1 on PA9/PA10; the boot banner goes out by DMA before the echo
    // interrupt takes over the transmitter
    let tx_pin = gpioa.pa9.into_alternate_push_pull(&mut gpioa.crh);
    let rx_pin = gpioa.pa10;
    let uart = Serial::new(
        dp.USART1,
        (tx_pin, rx_pin),
        &mut afio.mapr,
        Config::default().baudrate(115_200.bps()),
        &clocks,
    );
    dma::splash(dp.DMA1, BANNER);
    serial::uart1::init(uart, 4);

    // Pulse input on PA0 (TIM2 CH1), touch pad on PA6 (TIM3 CH1)
    let _pulse_pin = gpioa.pa0.into_pull_down_input(&mut gpioa.crl);
    let _pad_pin = gpioa.pa6.into_floating_input(&mut gpioa.crl);
    pulse::init(dp.TIM2, 2);
    let mut pad = TouchSampler::new(touchpad::ChargePad::new(dp.TIM3), Some(&TOUCH_CONFIG));

    let key_up = gpioa.pa8.into_pull_down_input(&mut gpioa.crh);
    let key_down = gpiob.pb10.into_pull_up_input(&mut gpiob.crh);
    let key_right = gpiob.pb11.into_pull_up_input(&mut gpiob.crh);
    let mut keypad = keys::Keys::new(key_up, key_down, key_right);
    keypad.listen(&mut afio, &mut exti);

    let _lamp_pin = gpiob.pb6.into_alternate_push_pull(&mut gpiob.crl);
    let mut lamp = pwm::PwmLamp::new(dp.TIM4);

    let light_pin = gpioa.pa1.into_analog(&mut gpioa.crl);
    let mut light = analog::LightSensor::new(dp.ADC1, light_pin, clocks);

    let mut heartbeat = dp.TIM1.counter_hz(&clocks);
    heartbeat.start(10.Hz()).unwrap();
    heartbeat.listen(Event::Update);
    cortex_m::interrupt::free(|cs| {
        HEARTBEAT.borrow(cs).borrow_mut().replace(heartbeat);
        STATUS_LED.borrow(cs).borrow_mut().replace(status_led);
    });
    unsafe {
        nvic.set_priority(pac::Interrupt::TIM1_UP, 3);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM1_UP);
    }

    let mut iwdg = IndependentWatchdog::new(dp.IWDG);
    iwdg.start(1000.millis());
    let mut wwdg = watchdog::WindowWatchdog::new(dp.WWDG);
    wwdg.start();

    let mut w = serial::uart1::writer();

    loop {
        match pad.calibrate(&mut delay) {
            Ok(baseline) => {
                let _ = write!(w, "touch baseline {} counts\r\n", baseline);
                break;
            }
            Err(TouchError::CalibrationOutOfRange { baseline }) => {
                let _ = write!(w, "touch baseline {} out of range, retrying\r\n", baseline);
                iwdg.feed();
                delay.delay_ms(100u16);
            }
        }
    }

    let mut duty_step: u8 = 0;
    let mut tick: u32 = 0;

    loop {
        // Raw byte echo back to the host
        while let Some(b) = serial::uart1::read_byte() {
            serial::uart1::write_byte(b);
        }

        if pad.scan(&mut delay, false) {
            let _ = write!(w, "touch\r\n");
        }

        if let Some(p) = pulse::poll() {
            if p.is_saturated() {
                let _ = write!(w, "pulse too long to measure\r\n");
            } else {
                let _ = write!(w, "pulse high {} us\r\n", p.total_ticks(pulse::TICKS_PER_OVERFLOW));
            }
        }

        if keys::interrupt_fired() {
            let _ = write!(w, "key irq\r\n");
        }

        match keypad.scan(&mut delay, false) {
            Some(Key::Up) => {
                duty_step = (duty_step + 1) % 5;
                lamp.set_duty_percent(duty_step * 25);
                let _ = write!(w, "lamp {}%\r\n", duty_step * 25);
            }
            Some(Key::Down) => {
                let counts = light.read_average(&mut delay, 5);
                let _ = write!(w, "light {} counts\r\n", counts);
            }
            Some(Key::Right) => {
                let _ = write!(w, "standby, wake on PA0\r\n");
                // Give the echo interrupt a moment to drain the report
                delay.delay_ms(20u16);
                standby::enter(&mut scb, &pwr);
            }
            None => {}
        }

        iwdg.feed();

        tick += 1;
        if tick % 20 == 0 {
            board_led.toggle();
        }
        if tick % 1000 == 0 {
            let _ = write!(w, "wwdg refills {}\r\n", watchdog::refill_count());
        }
        delay.delay_ms(10u16);
    }
}

#[interrupt]
fn TIM1_UP() {
    cortex_m::interrupt::free(|cs| {
        if let Some(timer) = HEARTBEAT.borrow(cs).borrow_mut().as_mut() {
            timer.clear_interrupt(Event::Update);
        }
        if let Some(led) = STATUS_LED.borrow(cs).borrow_mut().as_mut() {
            led.toggle();
        }
    });
}
