//! Device timer derivation.
//!
//! The capture device paces its sampling with a 32-bit timer and its trigger
//! window with a 16-bit timer plus prescaler, both clocked at 72 MHz. The
//! host derives all register values from a requested sample rate and sample
//! count; the 16-bit period must fit its register after applying the minimal
//! integer prescaler.

/// Device timer clock in Hz.
pub const DEVICE_CLOCK_HZ: f64 = 72_000_000.0;

const TIMER16_MAX: f64 = 65_535.0;

#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,

    #[error("Sample count must be non-zero")]
    ZeroSampleCount,

    #[error("Sample rate {0} Hz too high for the device clock")]
    SampleRateTooHigh(u32),

    #[error("Requested timing needs a prescaler beyond 16 bits")]
    PrescalerOverflow,
}

/// Derived register values for one timing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPlan {
    /// 32-bit sample-timer period in device clock ticks.
    pub sample_period: u32,
    /// 16-bit trigger-timer period.
    pub period16: u16,
    /// Trigger-timer prescaler, 1 when no division is needed.
    pub prescaler: u16,
}

impl TimingPlan {
    /// Derive the device registers for `sample_rate_hz` and `sample_count`.
    ///
    /// The sample period is the rounded ratio of the device clock to the
    /// requested rate. The trigger timer spans one full capture window
    /// (`sample_period * sample_count` ticks); when that exceeds the 16-bit
    /// register the prescaler grows until the recomputed period fits.
    pub fn derive(sample_rate_hz: u32, sample_count: u32) -> Result<Self, TimingError> {
        if sample_rate_hz == 0 {
            return Err(TimingError::ZeroSampleRate);
        }
        if sample_count == 0 {
            return Err(TimingError::ZeroSampleCount);
        }

        let sample_period = (DEVICE_CLOCK_HZ / f64::from(sample_rate_hz)).round();
        if sample_period < 1.0 {
            return Err(TimingError::SampleRateTooHigh(sample_rate_hz));
        }
        let sample_period = sample_period as u32;

        let sampling_freq = DEVICE_CLOCK_HZ / f64::from(sample_period);
        let trigger_freq = sampling_freq / f64::from(sample_count);
        let raw_period16 = DEVICE_CLOCK_HZ / trigger_freq;

        let (period16, prescaler) = if raw_period16 > TIMER16_MAX {
            let mut prescaler = (raw_period16 / 65_536.0).ceil();
            loop {
                let scaled = ((DEVICE_CLOCK_HZ / prescaler) / trigger_freq).round();
                if scaled <= TIMER16_MAX {
                    break (scaled, prescaler);
                }
                prescaler += 1.0;
            }
        } else {
            (raw_period16.round(), 1.0)
        };

        if prescaler > TIMER16_MAX {
            return Err(TimingError::PrescalerOverflow);
        }

        log::debug!(
            "timing: rate={sample_rate_hz} Hz count={sample_count} -> period={sample_period} period16={period16} prescaler={prescaler}"
        );

        Ok(Self {
            sample_period,
            period16: period16 as u16,
            prescaler: prescaler as u16,
        })
    }

    /// Effective sample rate after rounding the timer period.
    pub fn effective_sample_rate(&self) -> f64 {
        DEVICE_CLOCK_HZ / f64::from(self.sample_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_megahertz_divides_cleanly() {
        let plan = TimingPlan::derive(1_000_000, 300).unwrap();
        assert_eq!(plan.sample_period, 72);
        // trigger_freq ~= 3333.33 Hz -> period16 = 72 * 300.
        assert_eq!(plan.period16, 21_600);
        assert_eq!(plan.prescaler, 1);
    }

    #[test]
    fn slow_rates_engage_the_prescaler() {
        // 1 kHz over 4096 samples: raw period16 = 72000 * 4096 >> 65535.
        let plan = TimingPlan::derive(1_000, 4_096).unwrap();
        assert!(plan.prescaler > 1);
        let raw = f64::from(plan.sample_period) * 4_096.0;
        let expected = (raw / f64::from(plan.prescaler)).round() as u16;
        assert_eq!(plan.period16, expected);
    }

    #[test]
    fn period16_always_fits_its_register() {
        // An exact power-of-two overflow lands on 65536 with the ceil
        // prescaler alone; the recompute loop must still fit the register.
        for (rate, count) in [(1_000_000u32, 131_072u32), (562, 1_000), (9_600, 50_000)] {
            let plan = TimingPlan::derive(rate, count).unwrap();
            let raw = f64::from(plan.sample_period) * f64::from(count);
            let scaled = (raw / f64::from(plan.prescaler)).round();
            assert!(scaled <= 65_535.0, "rate={rate} count={count}");
            assert_eq!(plan.period16, scaled as u16);
            // Minimality: one step smaller would overflow the register.
            if plan.prescaler > 1 {
                let under = (raw / f64::from(plan.prescaler - 1)).round();
                assert!(under > 65_535.0, "rate={rate} count={count}");
            }
        }
    }

    #[test]
    fn rounding_matches_the_device_clock() {
        // 7 MHz: 72e6 / 7e6 = 10.29 -> 10 ticks.
        let plan = TimingPlan::derive(7_000_000, 100).unwrap();
        assert_eq!(plan.sample_period, 10);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        assert!(matches!(
            TimingPlan::derive(0, 100),
            Err(TimingError::ZeroSampleRate)
        ));
        assert!(matches!(
            TimingPlan::derive(1_000_000, 0),
            Err(TimingError::ZeroSampleCount)
        ));
        assert!(matches!(
            TimingPlan::derive(200_000_000, 100),
            Err(TimingError::SampleRateTooHigh(_))
        ));
    }
}
