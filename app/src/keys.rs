use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::blocking::delay::DelayMs;

use crate::hal::afio;
use crate::hal::gpio::gpioa::PA8;
use crate::hal::gpio::gpiob::{PB10, PB11};
use crate::hal::gpio::{Edge, ExtiPin, Input, PullDown, PullUp};
use crate::hal::pac;
use crate::hal::pac::interrupt;

static DOWN_IRQ: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Right,
}

/// The three bench keys: one active-high on a pull-down, two active-low on
/// pull-ups.
pub struct Keys {
    up: PA8<Input<PullDown>>,
    down: PB10<Input<PullUp>>,
    right: PB11<Input<PullUp>>,
    armed: bool,
}

impl Keys {
    pub fn new(
        up: PA8<Input<PullDown>>,
        down: PB10<Input<PullUp>>,
        right: PB11<Input<PullUp>>,
    ) -> Self {
        Self {
            up,
            down,
            right,
            armed: true,
        }
    }

    /// Route the down key through EXTI so presses register even while the
    /// main loop is busy sampling.
    pub fn listen(&mut self, afio: &mut afio::Parts, exti: &mut pac::EXTI) {
        self.down.make_interrupt_source(afio);
        self.down.trigger_on_edge(exti, Edge::Falling);
        self.down.enable_interrupt(exti);
        unsafe { cortex_m::peripheral::NVIC::unmask(pac::Interrupt::EXTI15_10) };
    }

    fn any_pressed(&self) -> bool {
        self.up.is_high() || self.down.is_low() || self.right.is_low()
    }

    /// Scan once with a 10 ms debounce.
    ///
    /// A press reports on its leading edge and then latches until every key
    /// is released; `continuous` re-arms on every call instead.
    pub fn scan<D: DelayMs<u16>>(&mut self, delay: &mut D, continuous: bool) -> Option<Key> {
        let mut hit = None;
        if self.armed && self.any_pressed() {
            delay.delay_ms(10);
            self.armed = false;
            if self.up.is_high() {
                hit = Some(Key::Up);
            } else if self.down.is_low() {
                hit = Some(Key::Down);
            } else if self.right.is_low() {
                hit = Some(Key::Right);
            }
        } else if !self.any_pressed() {
            self.armed = true;
        }
        if continuous {
            self.armed = true;
        }
        hit
    }
}

/// True once per EXTI hit on the down key.
pub fn interrupt_fired() -> bool {
    DOWN_IRQ.swap(false, Ordering::Relaxed)
}

#[interrupt]
fn EXTI15_10() {
    let exti = unsafe { &*pac::EXTI::ptr() };
    exti.pr.write(|w| w.pr10().set_bit());
    DOWN_IRQ.store(true, Ordering::Relaxed);
}
