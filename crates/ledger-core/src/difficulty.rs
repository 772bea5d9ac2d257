use std::sync::atomic::{AtomicU32, Ordering};

use tracing::info;

use crate::error::{LedgerError, Result};

/// Administrator-set mining difficulty, bounded to `min..=max`.
///
/// Miners read the value once per attempt, so a change only affects mining
/// started after it.
#[derive(Debug)]
pub struct DifficultyController {
    current: AtomicU32,
    min: u32,
    max: u32,
}

impl DifficultyController {
    pub fn new(initial: u32, min: u32, max: u32) -> Result<Self> {
        let controller = Self {
            current: AtomicU32::new(min),
            min,
            max,
        };
        controller.set(i64::from(initial))?;
        Ok(controller)
    }

    pub fn get(&self) -> u32 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: i64) -> Result<u32> {
        let range = i64::from(self.min)..=i64::from(self.max);
        if !range.contains(&value) {
            return Err(LedgerError::Range {
                value,
                min: self.min,
                max: self.max,
            });
        }
        let value = value as u32;
        let previous = self.current.swap(value, Ordering::SeqCst);
        if previous != value {
            info!("difficulty changed from {previous} to {value}");
        }
        Ok(value)
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_initial_value() {
        let d = DifficultyController::new(4, 1, 6).unwrap();
        assert_eq!(d.get(), 4);
        assert_eq!(d.bounds(), (1, 6));
    }

    #[test]
    fn accepts_bounds_inclusive() {
        let d = DifficultyController::new(4, 1, 6).unwrap();
        assert_eq!(d.set(1).unwrap(), 1);
        assert_eq!(d.set(6).unwrap(), 6);
        assert_eq!(d.get(), 6);
    }

    #[test]
    fn rejects_out_of_range_without_change() {
        let d = DifficultyController::new(4, 1, 6).unwrap();
        for bad in [0, 7, -1, i64::MAX] {
            assert_eq!(
                d.set(bad).unwrap_err(),
                LedgerError::Range {
                    value: bad,
                    min: 1,
                    max: 6
                }
            );
        }
        assert_eq!(d.get(), 4);
    }

    #[test]
    fn rejects_initial_out_of_range() {
        assert!(DifficultyController::new(9, 1, 6).is_err());
    }
}
