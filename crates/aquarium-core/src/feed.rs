/// Grams dispensed by one feeder dose unless configured otherwise.
pub const DEFAULT_DOSE_GRAMS: u32 = 10;

/// Requested grams, with non-positive requests replaced by one dose.
pub fn normalize_feed_amount(amount_grams: i64, dose_grams: u32) -> u32 {
    if amount_grams <= 0 {
        dose_grams
    } else {
        u32::try_from(amount_grams).unwrap_or(u32::MAX)
    }
}

/// Number of doses for a request: `ceil(normalized / dose)`, at least one.
pub fn feed_doses(amount_grams: i64, dose_grams: u32) -> u32 {
    let dose = dose_grams.max(1);
    let amount = normalize_feed_amount(amount_grams, dose);
    amount.div_ceil(dose).max(1)
}
