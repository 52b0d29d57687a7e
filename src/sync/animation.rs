//! Time-driven smooth scrolling.

use std::f32::consts::PI;
use std::time::{Duration, Instant};

/// How an animation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEnd {
    Completed,
    Cancelled,
}

/// A programmatic scroll from one offset to another over a fixed duration,
/// easing in and out.
#[derive(Debug, Clone)]
pub struct ScrollAnimation {
    id: u64,
    from: f32,
    to: f32,
    started: Instant,
    duration: Duration,
}

impl ScrollAnimation {
    pub fn new(id: u64, from: f32, to: f32, started: Instant, duration: Duration) -> Self {
        Self {
            id,
            from,
            to,
            started,
            duration,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn fraction(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        let fraction = self.fraction(now);
        if fraction >= 1.0 {
            return self.to;
        }
        let eased = accelerate_decelerate(fraction);
        self.from + (self.to - self.from) * eased
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.fraction(now) >= 1.0
    }
}

fn accelerate_decelerate(t: f32) -> f32 {
    ((t + 1.0) * PI).cos() / 2.0 + 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_and_midpoint() {
        let start = Instant::now();
        let anim = ScrollAnimation::new(1, 100.0, 300.0, start, Duration::from_secs(8));

        assert!((anim.value_at(start) - 100.0).abs() < 0.01);
        assert!((anim.value_at(start + Duration::from_secs(4)) - 200.0).abs() < 0.01);
        assert!((anim.value_at(start + Duration::from_secs(9)) - 300.0).abs() < 0.01);
        assert!(!anim.is_finished(start + Duration::from_secs(7)));
        assert!(anim.is_finished(start + Duration::from_secs(8)));
    }

    #[test]
    fn test_eases_in() {
        let start = Instant::now();
        let anim = ScrollAnimation::new(1, 0.0, 100.0, start, Duration::from_secs(10));
        let early = anim.value_at(start + Duration::from_secs(1));
        // Slower than linear at the start.
        assert!(early < 10.0);
        assert!(early > 0.0);
    }

    #[test]
    fn test_zero_duration_jumps() {
        let start = Instant::now();
        let anim = ScrollAnimation::new(1, 0.0, 50.0, start, Duration::ZERO);
        assert!((anim.value_at(start) - 50.0).abs() < 0.01);
        assert!(anim.is_finished(start));
    }
}
