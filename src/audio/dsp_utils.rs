// DSP utilities - Output hygiene for the mixer

/// Flush values too small to hear to zero so the callback never runs on denormals
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// tanh saturation; keeps stacked clicks and notes inside [-1, 1]
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// One-pole smoother for gain changes: `y += a * (x - y)`
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// `time_constant_ms` is the time to cover ~63% of a step
    pub fn new(initial_value: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        let time_constant_samples = (time_constant_ms * 0.001 * sample_rate).max(1.0);
        Self {
            current: initial_value,
            coefficient: 1.0 / time_constant_samples,
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current += self.coefficient * (target - self.current);
        self.current = flush_denormals_to_zero(self.current);
        self.current
    }

    pub fn get(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormals() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(-0.1), -0.1);
    }

    #[test]
    fn test_soft_clip_bounds() {
        assert_eq!(soft_clip(0.0), 0.0);
        assert!(soft_clip(3.0) < 1.0);
        assert!(soft_clip(-3.0) > -1.0);
        assert!((soft_clip(0.1) - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_smoother_converges_without_overshoot() {
        let mut smoother = OnePoleSmoother::new(0.0, 10.0, 48000.0);
        let mut last = 0.0;
        for _ in 0..4800 {
            last = smoother.process(1.0);
            assert!(last <= 1.0);
        }
        assert!((last - 1.0).abs() < 0.01);
        assert_eq!(smoother.get(), last);
    }

    #[test]
    fn test_zero_time_constant_is_instant() {
        let mut smoother = OnePoleSmoother::new(0.0, 0.0, 48000.0);
        assert_eq!(smoother.process(0.5), 0.5);
    }
}
