use rust_decimal::Decimal;

// ------------------------------------------------------------
// Currency table
// ------------------------------------------------------------
//
// The fixed, ordered set of currencies the worker rotates through.
//
// IMPORTANT:
// - The order of this table IS the rotation order.
// - Base values are anchors; the published value is always
//   within [base, base + 0.020].
//

/// A single currency entry: its wire symbol and the anchor value
/// that synthesized quotes are built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    /// Short code published as `Sigla` and as the `moeda` attribute
    pub symbol: &'static str,

    /// Fixed decimal anchor (2 fractional digits)
    pub base_value: Decimal,
}

impl Currency {
    const fn new(symbol: &'static str, base_cents: u32) -> Self {
        Self {
            symbol,
            base_value: Decimal::from_parts(base_cents, 0, 0, false, 2),
        }
    }
}

/// US dollar, anchored at 5.05
pub const USD: Currency = Currency::new("USD", 505);

/// Euro, anchored at 5.27
pub const EUR: Currency = Currency::new("EUR", 527);

/// Pound sterling, anchored at 6.22
pub const LIB: Currency = Currency::new("LIB", 622);

/// Rotation order used by the runner.
pub const CURRENCIES: [Currency; 3] = [USD, EUR, LIB];
