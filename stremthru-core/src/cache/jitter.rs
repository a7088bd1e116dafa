use std::time::Duration;

use rand::Rng;

/// Uniform random offset added to a base lifetime so entries written
/// together do not expire together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(5 * 60))
    }
}

impl Jitter {
    /// Bounds are reordered if given backwards.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    pub fn apply(&self, base: Duration) -> Duration {
        base.saturating_add(self.sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_inside_window() {
        let jitter = Jitter::default();
        let base = Duration::from_secs(60);
        for _ in 0..200 {
            let lifetime = jitter.apply(base);
            assert!(lifetime >= base + Duration::from_secs(5));
            assert!(lifetime <= base + Duration::from_secs(300));
        }
    }

    #[test]
    fn reversed_bounds_are_normalized() {
        let jitter = Jitter::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(jitter.bounds(), (Duration::from_secs(1), Duration::from_secs(10)));
        assert_eq!(Jitter::none().sample(), Duration::ZERO);
    }
}
