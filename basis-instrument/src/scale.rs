use rust_decimal::Decimal;

/// Round `amount` to `scale` fractional digits using banker's rounding, matching the precision
/// a venue/chain natively supports for a given asset (eg/ 6 d.p. for USDT, 18 d.p. for ETH-unit
/// amounts). Rate math for AAVE indices and oracles is always performed before rounding, so
/// intermediate precision is never lost to an early truncation.
pub fn round_to_scale(amount: Decimal, scale: u32) -> Decimal {
    amount.round_dp(scale)
}

/// `true` if `|a - b| <= tolerance`, the comparison used throughout reconciliation (position
/// mismatch checks, P&L self-check).
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}
