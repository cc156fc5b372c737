//! `BASE-QUOTE` instrument symbols

use thiserror::Error;

/// Symbol not in `BASE-QUOTE` form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid symbol format: {0} (expected format: BASE-QUOTE, e.g., BTC-USD)")]
pub struct InvalidSymbol(pub String);

/// Check a symbol is two alphanumeric currency codes joined by a single dash
pub fn check_symbol(symbol: &str) -> Result<(), InvalidSymbol> {
    let is_code = |code: &str| !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric());
    match symbol.split_once('-') {
        Some((base, quote)) if is_code(base) && is_code(quote) => Ok(()),
        _ => Err(InvalidSymbol(symbol.to_string())),
    }
}
