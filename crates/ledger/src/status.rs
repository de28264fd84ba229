//! Stock-level classification.

use serde::{Deserialize, Serialize};

/// Derived stock-level category of a projection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    /// Stable identifier used in logs and persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::InStock => "in_stock",
        }
    }

    /// True for the categories that warrant an alert when crossed into.
    pub fn is_alertable(&self) -> bool {
        matches!(self, StockStatus::OutOfStock | StockStatus::LowStock)
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a quantity against an item's minimum-stock threshold.
///
/// Deterministic and side-effect-free; both the write path (projection
/// update) and read path (list filters) use this same function.
pub fn classify(quantity: i64, min_stock: i64) -> StockStatus {
    if quantity <= 0 {
        StockStatus::OutOfStock
    } else if quantity <= min_stock {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries() {
        let m = 20;
        assert_eq!(classify(0, m), StockStatus::OutOfStock);
        assert_eq!(classify(-3, m), StockStatus::OutOfStock);
        assert_eq!(classify(1, m), StockStatus::LowStock);
        assert_eq!(classify(m, m), StockStatus::LowStock);
        assert_eq!(classify(m + 1, m), StockStatus::InStock);
    }

    #[test]
    fn zero_threshold_means_never_low() {
        assert_eq!(classify(0, 0), StockStatus::OutOfStock);
        assert_eq!(classify(1, 0), StockStatus::InStock);
    }

    proptest! {
        #[test]
        fn exactly_one_category(quantity in -10_000i64..10_000, min_stock in 0i64..10_000) {
            let status = classify(quantity, min_stock);
            match status {
                StockStatus::OutOfStock => prop_assert!(quantity <= 0),
                StockStatus::LowStock => prop_assert!(quantity > 0 && quantity <= min_stock),
                StockStatus::InStock => prop_assert!(quantity > min_stock),
            }
        }
    }
}
