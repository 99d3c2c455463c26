//! Injectable random source for seeding and live ticks.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;
use thiserror::Error;

use super::models::ValueRange;

/// Random source error types.
#[derive(Error, Debug)]
pub enum RandomError {
    #[error("random source unavailable: {0}")]
    Unavailable(#[from] rand::Error),
}

/// Shared, lockable random source.
///
/// Wraps any [`RngCore`] so tests can inject a seeded or failing generator.
pub struct RandomSource {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RandomSource {
    pub fn new<R: RngCore + Send + 'static>(rng: R) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Deterministic source for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Uniform sample in `[0, 1)`.
    pub fn unit(&self) -> Result<f64, RandomError> {
        let mut buf = [0u8; 4];
        {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.try_fill_bytes(&mut buf)?;
        }
        Ok(u32::from_le_bytes(buf) as f64 / (u32::MAX as f64 + 1.0))
    }

    /// Whole number in `[range.min, range.min + range.span)`.
    pub fn draw(&self, range: ValueRange) -> Result<f64, RandomError> {
        Ok(range.min + (self.unit()? * range.span).floor())
    }

    /// Index in `0..len`. `len` must be non-zero.
    pub fn index(&self, len: usize) -> Result<usize, RandomError> {
        let idx = (self.unit()? * len as f64).floor() as usize;
        Ok(idx.min(len.saturating_sub(1)))
    }

    /// Pick one element of `items`, or `None` if it is empty.
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Result<Option<&'a T>, RandomError> {
        if items.is_empty() {
            return Ok(None);
        }
        Ok(items.get(self.index(items.len())?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Generator whose every fallible read fails.
    pub(crate) struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source offline"))
        }
    }

    #[test]
    fn test_seeded_sources_agree() {
        let a = RandomSource::seeded(7);
        let b = RandomSource::seeded(7);
        for _ in 0..50 {
            assert_eq!(a.unit().unwrap(), b.unit().unwrap());
        }
    }

    #[test]
    fn test_draw_stays_in_range() {
        let rng = RandomSource::seeded(42);
        let range = ValueRange::new(20.0, 80.0);
        for _ in 0..1000 {
            let v = rng.draw(range).unwrap();
            assert!((20.0..100.0).contains(&v), "{v} out of range");
            assert_eq!(v, v.floor());
        }
    }

    #[test]
    fn test_choose() {
        let rng = RandomSource::seeded(1);
        let empty: [&str; 0] = [];
        assert!(rng.choose(&empty).unwrap().is_none());

        let items = ["A", "B", "C"];
        for _ in 0..100 {
            let picked = rng.choose(&items).unwrap().unwrap();
            assert!(items.contains(picked));
        }
    }

    #[test]
    fn test_broken_source_errors() {
        let rng = RandomSource::new(BrokenRng);
        assert!(matches!(rng.unit(), Err(RandomError::Unavailable(_))));
        assert!(rng.draw(ValueRange::new(0.0, 10.0)).is_err());
    }
}
