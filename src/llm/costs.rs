//! Per-token pricing for known models.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD price per token, `None` for unknown models.
pub fn model_cost(model: &str) -> Option<(Decimal, Decimal)> {
    let per_million = match model {
        m if m.starts_with("gpt-4o-mini") => (dec!(0.15), dec!(0.60)),
        m if m.starts_with("gpt-4o") => (dec!(2.50), dec!(10.00)),
        m if m.starts_with("gpt-4-turbo") => (dec!(10.00), dec!(30.00)),
        m if m.starts_with("claude-sonnet-4") || m.starts_with("claude-3-5-sonnet") => {
            (dec!(3.00), dec!(15.00))
        }
        m if m.starts_with("claude-3-5-haiku") => (dec!(0.80), dec!(4.00)),
        _ => return None,
    };
    let million = dec!(1_000_000);
    Some((per_million.0 / million, per_million.1 / million))
}
