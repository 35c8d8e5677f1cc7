use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::DisplayConfig;

/// Round a USD figure for reporting (half away from zero). Stored values keep
/// full precision; rounding happens only at output time.
pub fn round_usd(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

fn group_int_digits(int_part: &str) -> String {
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        out.push(ch);
        let remaining = len.saturating_sub(i + 1);
        if remaining > 0 && remaining % 3 == 0 {
            out.push(',');
        }
    }
    out
}

fn pad_fraction_to_dp(s: &str, dp: u32) -> String {
    if dp == 0 {
        return s
            .split_once('.')
            .map(|(i, _)| i.to_string())
            .unwrap_or_else(|| s.to_string());
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    let mut out = String::with_capacity(int_part.len() + 1 + dp as usize);
    out.push_str(int_part);
    out.push('.');

    let mut written = 0usize;
    for ch in frac_part.chars().take(dp as usize) {
        out.push(ch);
        written += 1;
    }
    while written < dp as usize {
        out.push('0');
        written += 1;
    }

    out
}

/// Format a USD value for human display: fixed decimals, optional thousands
/// grouping and currency symbol. Never feeds back into stored figures.
pub fn format_usd_display(value: Decimal, display: &DisplayConfig) -> String {
    let rounded = round_usd(value, display.currency_decimals);

    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs();

    let s = pad_fraction_to_dp(&abs.normalize().to_string(), display.currency_decimals);
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (s, None),
    };
    let int_part = if display.currency_grouping {
        group_int_digits(&int_part)
    } else {
        int_part
    };

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if let Some(symbol) = &display.currency_symbol {
        out.push_str(symbol);
    }
    out.push_str(&int_part);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn display(decimals: u32, grouping: bool, symbol: Option<&str>) -> DisplayConfig {
        DisplayConfig {
            currency_decimals: decimals,
            currency_grouping: grouping,
            currency_symbol: symbol.map(str::to_string),
        }
    }

    #[test]
    fn rounds_to_cents_half_away_from_zero() {
        let value = Decimal::from_str("2.005").unwrap();
        assert_eq!(round_usd(value, 2).to_string(), "2.01");
    }

    #[test]
    fn pads_to_fixed_decimals() {
        let value = Decimal::from_str("100").unwrap();
        assert_eq!(format_usd_display(value, &display(2, false, None)), "100.00");
    }

    #[test]
    fn groups_and_prefixes_symbol() {
        let value = Decimal::from_str("1234567.5").unwrap();
        assert_eq!(
            format_usd_display(value, &display(2, true, Some("$"))),
            "$1,234,567.50"
        );
    }

    #[test]
    fn negative_sign_precedes_symbol() {
        let value = Decimal::from_str("-1234.5").unwrap();
        assert_eq!(
            format_usd_display(value, &display(2, true, Some("$"))),
            "-$1,234.50"
        );
    }
}
