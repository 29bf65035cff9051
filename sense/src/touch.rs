use embedded_hal::blocking::delay::DelayMs;

use crate::{ChargeTimer, TouchConfig, TouchError, DEFAULT_TOUCH_CONFIG};

const CALIBRATION_SAMPLES: usize = 10;
/// Readings dropped from each end of the sorted calibration buffer.
const CALIBRATION_TRIM: usize = 2;

/// Charge-time sampler for one capacitive pad.
///
/// Holds the calibrated baseline and the post-detection cooldown for a
/// single pad, so independent pads get independent samplers. The blocking
/// delay is borrowed per call; every operation may block the caller for a
/// few milliseconds per sample.
pub struct TouchSampler<'a, T> {
    timer: T,
    config: &'a TouchConfig,
    baseline: u16,
    cooldown: u8,
}

impl<'a, T: ChargeTimer> TouchSampler<'a, T> {
    pub fn new(timer: T, config: Option<&'a TouchConfig>) -> Self {
        Self {
            timer,
            config: config.unwrap_or(&DEFAULT_TOUCH_CONFIG),
            baseline: 0,
            cooldown: 0,
        }
    }

    /// Median-filtered untouched charge time, zero before calibration.
    pub fn baseline(&self) -> u16 {
        self.baseline
    }

    /// Discharge the pad, let it settle, then hand it back to the capture
    /// unit with a clean counter.
    fn prime<D: DelayMs<u16>>(&mut self, delay: &mut D) {
        self.timer.discharge();
        delay.delay_ms(self.config.settle_ms);
        self.timer.rearm();
        self.timer.release();
    }

    /// Measure one charge time.
    ///
    /// If the capture never fires (a disconnected or always-charging pad)
    /// the wait is abandoned near the counter ceiling and the raw counter
    /// value is returned instead. Callers cannot distinguish that fallback
    /// from a genuine very large reading.
    pub fn sample_once<D: DelayMs<u16>>(&mut self, delay: &mut D) -> u16 {
        self.prime(delay);
        let limit = self.timer.max_count() - self.config.timeout_margin;
        loop {
            if let Some(charge) = self.timer.capture() {
                return charge;
            }
            if self.timer.count() > limit {
                return self.timer.count();
            }
        }
    }

    /// Establish the untouched baseline.
    ///
    /// Takes ten spaced readings, drops the two lowest and two highest and
    /// averages the rest, rounding to nearest. A baseline above half the
    /// timer range reports `CalibrationOutOfRange`; the value is stored
    /// either way so the caller can inspect it before retrying.
    pub fn calibrate<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<u16, TouchError> {
        let mut buf = [0u16; CALIBRATION_SAMPLES];
        for slot in buf.iter_mut() {
            *slot = self.sample_once(delay);
            delay.delay_ms(self.config.calibration_gap_ms);
        }
        buf.sort_unstable();

        let kept = &buf[CALIBRATION_TRIM..CALIBRATION_SAMPLES - CALIBRATION_TRIM];
        let sum: u32 = kept.iter().map(|&v| v as u32).sum();
        let n = kept.len() as u32;
        self.baseline = ((sum + n / 2) / n) as u16;

        if self.baseline > self.timer.max_count() / 2 {
            Err(TouchError::CalibrationOutOfRange {
                baseline: self.baseline,
            })
        } else {
            Ok(self.baseline)
        }
    }

    /// Largest charge time over an `n`-sample burst.
    fn max_sample<D: DelayMs<u16>>(&mut self, delay: &mut D, n: u8) -> u16 {
        let mut best = 0;
        for _ in 0..n {
            let charge = self.sample_once(delay);
            if charge > best {
                best = charge;
            }
        }
        best
    }

    /// Scan the pad once and report whether it is touched.
    ///
    /// A burst of samples is taken and the maximum kept; a touch needs that
    /// maximum strictly inside `(baseline + gate, baseline *
    /// plausible_factor)`; the upper bound rejects implausibly large
    /// readings. After a reported touch the next `cooldown` scans stay
    /// quiet. Continuous mode samples a longer burst and re-arms
    /// immediately.
    pub fn scan<D: DelayMs<u16>>(&mut self, delay: &mut D, continuous: bool) -> bool {
        let burst = if continuous {
            self.cooldown = 0;
            self.config.burst_continuous
        } else {
            self.config.burst_single
        };

        let peak = self.max_sample(delay, burst) as u32;
        let floor = self.baseline as u32 + self.config.gate as u32;
        let ceiling = self.baseline as u32 * self.config.plausible_factor as u32;

        if floor < peak && peak < ceiling && self.cooldown == 0 {
            self.cooldown = self.config.cooldown;
            true
        } else {
            if self.cooldown > 0 {
                self.cooldown -= 1;
            }
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Pad whose capture unit replays a scripted list of charge times.
    struct ScriptedPad {
        readings: Vec<u16>,
        next: usize,
        stuck: bool,
        counter: u16,
        ops: Vec<&'static str>,
    }

    impl ScriptedPad {
        fn new(readings: &[u16]) -> Self {
            Self {
                readings: readings.to_vec(),
                next: 0,
                stuck: false,
                counter: 0,
                ops: Vec::new(),
            }
        }
    }

    impl ChargeTimer for ScriptedPad {
        fn max_count(&self) -> u16 {
            0xffff
        }

        fn discharge(&mut self) {
            self.ops.push("discharge");
        }

        fn rearm(&mut self) {
            self.ops.push("rearm");
        }

        fn release(&mut self) {
            self.ops.push("release");
        }

        fn count(&self) -> u16 {
            self.counter
        }

        fn capture(&mut self) -> Option<u16> {
            if self.stuck {
                return None;
            }
            let v = self.readings[self.next % self.readings.len()];
            self.next += 1;
            Some(v)
        }
    }

    struct CountingDelay {
        calls: usize,
    }

    impl DelayMs<u16> for CountingDelay {
        fn delay_ms(&mut self, _ms: u16) {
            self.calls += 1;
        }
    }

    fn delay() -> CountingDelay {
        CountingDelay { calls: 0 }
    }

    fn calibrated(untouched: u16, readings: &[u16]) -> TouchSampler<'static, ScriptedPad> {
        let mut s = TouchSampler::new(ScriptedPad::new(&[untouched]), None);
        s.calibrate(&mut delay()).unwrap();
        assert_eq!(s.baseline(), untouched);
        s.timer.readings = readings.to_vec();
        s
    }

    #[test]
    fn prime_sequences_the_pad() {
        let mut s = TouchSampler::new(ScriptedPad::new(&[40]), None);
        let mut d = delay();
        s.sample_once(&mut d);
        assert_eq!(s.timer.ops, ["discharge", "rearm", "release"]);
        assert_eq!(d.calls, 1, "settle delay must run while the pad is held low");
    }

    #[test]
    fn sample_falls_back_to_raw_counter_on_timeout() {
        let mut s = TouchSampler::new(ScriptedPad::new(&[0]), None);
        s.timer.stuck = true;
        s.timer.counter = 0xffff - 400;
        assert_eq!(s.sample_once(&mut delay()), 0xffff - 400);
    }

    #[test]
    fn calibration_is_a_rounded_trimmed_mean() {
        let mut s = TouchSampler::new(ScriptedPad::new(&[5, 1, 9, 3, 7, 2, 8, 4, 10, 6]), None);
        // sorted 1..=10, middle six sum to 33, 33/6 rounds up to 6
        assert_eq!(s.calibrate(&mut delay()), Ok(6));
        assert_eq!(s.baseline(), 6);
    }

    #[test]
    fn calibration_rejects_half_range_baselines() {
        let mut s = TouchSampler::new(ScriptedPad::new(&[0x8000]), None);
        assert_eq!(
            s.calibrate(&mut delay()),
            Err(TouchError::CalibrationOutOfRange { baseline: 0x8000 })
        );
        // the suspect baseline is still recorded
        assert_eq!(s.baseline(), 0x8000);

        let mut s = TouchSampler::new(ScriptedPad::new(&[0x7fff]), None);
        assert_eq!(s.calibrate(&mut delay()), Ok(0x7fff));
    }

    #[test]
    fn scan_window_is_open_on_both_ends() {
        let mut d = delay();

        let mut s = calibrated(200, &[300]);
        assert!(!s.scan(&mut d, false), "gate boundary itself must not trigger");

        let mut s = calibrated(200, &[301]);
        assert!(s.scan(&mut d, false));

        let mut s = calibrated(200, &[2000]);
        assert!(!s.scan(&mut d, false), "ten times baseline must be rejected");

        let mut s = calibrated(200, &[1999]);
        assert!(s.scan(&mut d, false));
    }

    #[test]
    fn cooldown_blocks_three_scans() {
        let mut d = delay();
        let mut s = calibrated(200, &[400]);

        assert!(s.scan(&mut d, false));
        for i in 0..3 {
            assert!(!s.scan(&mut d, false), "scan {} after a report must stay quiet", i + 1);
        }
        assert!(s.scan(&mut d, false), "fourth scan after a report may fire");
    }

    #[test]
    fn continuous_scan_rearms_immediately() {
        let mut d = delay();
        let mut s = calibrated(200, &[400]);

        assert!(s.scan(&mut d, false));
        assert!(!s.scan(&mut d, false));
        assert!(s.scan(&mut d, true), "continuous mode ignores the cooldown");
    }

    #[test]
    fn uncalibrated_sampler_never_reports() {
        // with a zero baseline the plausibility ceiling is zero too
        let mut s = TouchSampler::new(ScriptedPad::new(&[400]), None);
        assert!(!s.scan(&mut delay(), false));
    }
}
