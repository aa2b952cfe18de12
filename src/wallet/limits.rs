//! Spending limits (spec §3 `SpendingLimits`, §4.3 step 6, §5).
//!
//! `atomic_check_and_record` is the one critical section in the whole
//! wallet gate chain that must hold a non-suspending lock across both
//! the check and the write — otherwise two concurrent `execute` calls
//! could each observe a running total that doesn't yet include the
//! other's spend and both pass a cap they jointly violate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub struct SpendingLimits {
    pub per_transaction_max_usd: Decimal,
    pub daily_cap_usd: Decimal,
    pub approval_threshold_usd: Decimal,
    pub max_gas_price_gwei: Decimal,
    history: parking_lot::Mutex<Vec<(DateTime<Utc>, Decimal)>>,
}

impl SpendingLimits {
    pub fn new(
        per_transaction_max_usd: Decimal,
        daily_cap_usd: Decimal,
        approval_threshold_usd: Decimal,
        max_gas_price_gwei: Decimal,
    ) -> Self {
        SpendingLimits {
            per_transaction_max_usd,
            daily_cap_usd,
            approval_threshold_usd,
            max_gas_price_gwei,
            history: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Checks the per-transaction cap and the rolling-24h cap, and if
    /// both pass, records the spend — all inside one lock acquisition.
    /// Returns `Err(reason)` naming which cap was violated.
    pub fn atomic_check_and_record(&self, amount_usd: Decimal) -> Result<(), String> {
        if amount_usd > self.per_transaction_max_usd {
            return Err(format!(
                "per-transaction max exceeded: {amount_usd} > {}",
                self.per_transaction_max_usd
            ));
        }
        let mut history = self.history.lock();
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        history.retain(|(at, _)| *at >= cutoff);
        let rolling_total: Decimal = history.iter().map(|(_, amt)| *amt).sum();
        if rolling_total + amount_usd > self.daily_cap_usd {
            return Err(format!(
                "rolling 24h cap exceeded: {} + {amount_usd} > {}",
                rolling_total, self.daily_cap_usd
            ));
        }
        history.push((Utc::now(), amount_usd));
        Ok(())
    }

    pub fn requires_approval(&self, amount_usd: Decimal) -> bool {
        amount_usd >= self.approval_threshold_usd
    }

    pub fn rolling_total_usd(&self) -> Decimal {
        let mut history = self.history.lock();
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        history.retain(|(at, _)| *at >= cutoff);
        history.iter().map(|(_, amt)| *amt).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> SpendingLimits {
        SpendingLimits::new(dec!(10000), dec!(20000), dec!(5000), dec!(5))
    }

    #[test]
    fn rejects_over_per_transaction_max() {
        let limits = limits();
        let result = limits.atomic_check_and_record(dec!(10001));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_when_rolling_total_would_exceed_daily_cap() {
        let limits = limits();
        assert!(limits.atomic_check_and_record(dec!(9000)).is_ok());
        assert!(limits.atomic_check_and_record(dec!(9000)).is_ok());
        // total now 18000, one more of 3000 would push to 21000 > 20000 cap
        assert!(limits.atomic_check_and_record(dec!(3000)).is_err());
        // but a smaller one that fits still should pass
        assert!(limits.atomic_check_and_record(dec!(2000)).is_ok());
    }

    #[test]
    fn approval_threshold_is_inclusive() {
        let limits = limits();
        assert!(limits.requires_approval(dec!(5000)));
        assert!(!limits.requires_approval(dec!(4999.99)));
    }

    #[test]
    fn concurrent_spends_never_let_total_exceed_cap() {
        use std::sync::Arc;
        use std::thread;

        // 10 threads racing to spend 600 each against a 5000 cap: at most
        // 8 can succeed (4800 <= 5000 < 5400), and the lock must make
        // that boundary exact regardless of interleaving.
        let limits = Arc::new(SpendingLimits::new(dec!(1000), dec!(5000), dec!(100000), dec!(5)));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limits = limits.clone();
                thread::spawn(move || limits.atomic_check_and_record(dec!(600)).is_ok())
            })
            .collect();
        let successes = handles.into_iter().filter(|h| h.join().unwrap()).count();
        assert_eq!(successes, 8);
        assert!(limits.rolling_total_usd() <= dec!(5000));
    }
}
