//! Money presentation helpers
//!
//! Amounts stay full-precision `Decimal` internally; rounding happens
//! only when an amount is rendered for a message or report.

use rust_decimal::Decimal;

/// Round an amount to two decimal places for display
pub fn round_display(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// Format an amount with its currency code, e.g. `GHS 1,250.00`
pub fn format_amount(currency: &str, amount: Decimal) -> String {
    let rounded = round_display(amount);
    let formatted = group_thousands(&format!("{rounded:.2}"));
    format!("{currency} {formatted}")
}

fn group_thousands(plain: &str) -> String {
    let (int_part, frac_part) = match plain.split_once('.') {
        Some((i, f)) => (i, f),
        None => (plain, "00"),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}.{frac_part}")
}
