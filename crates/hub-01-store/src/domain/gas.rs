//! Gas accounting for store access.

use std::cell::Cell;

pub const READ_COST_FLAT: u64 = 10;
pub const READ_COST_PER_BYTE: u64 = 1;
pub const WRITE_COST_FLAT: u64 = 20;
pub const WRITE_COST_PER_BYTE: u64 = 2;
pub const DELETE_COST: u64 = 10;
pub const ITER_NEXT_COST: u64 = 10;

/// Counts consumed gas against an optional limit.
///
/// Consumption never fails on the spot; callers check [`GasMeter::is_past_limit`]
/// at stage boundaries. Interior mutability lets read-only store access charge
/// gas through a shared reference.
#[derive(Debug, Clone, Default)]
pub struct GasMeter {
    limit: Option<u64>,
    consumed: Cell<u64>,
}

impl GasMeter {
    pub fn infinite() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            consumed: Cell::new(0),
        }
    }

    pub fn consume(&self, amount: u64) {
        self.consumed.set(self.consumed.get().saturating_add(amount));
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn is_past_limit(&self) -> bool {
        matches!(self.limit, Some(limit) if self.consumed.get() > limit)
    }

    /// Consumed gas capped at the limit, as reported in results.
    pub fn consumed_to_limit(&self) -> u64 {
        match self.limit {
            Some(limit) => self.consumed.get().min(limit),
            None => self.consumed.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_tracking() {
        let meter = GasMeter::with_limit(100);
        meter.consume(60);
        assert!(!meter.is_past_limit());
        meter.consume(41);
        assert!(meter.is_past_limit());
        assert_eq!(meter.consumed(), 101);
        assert_eq!(meter.consumed_to_limit(), 100);
    }

    #[test]
    fn test_infinite_never_exceeds() {
        let meter = GasMeter::infinite();
        meter.consume(u64::MAX);
        meter.consume(1);
        assert!(!meter.is_past_limit());
    }
}
