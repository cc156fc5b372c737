//! Price level types with decimal precision

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// A single aggregated price level in the orderbook
///
/// On the wire a level is `{"px": .., "qty": .., "num": ..}` where `num` is the
/// number of resting orders at the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Price of this level
    #[serde(rename = "px", deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    /// Quantity at this price level
    #[serde(deserialize_with = "deserialize_decimal")]
    pub qty: Decimal,
    /// Number of orders resting at this price
    #[serde(rename = "num", default)]
    pub orders: u32,
}

impl Level {
    /// Create a new price level
    pub fn new(price: Decimal, qty: Decimal, orders: u32) -> Self {
        Self { price, qty, orders }
    }

    /// Check if this level has zero quantity (should be removed)
    pub fn is_zero(&self) -> bool {
        self.qty.is_zero()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn decimal_from<E: serde::de::Error>(value: StringOrNumber) -> Result<Decimal, E> {
    use rust_decimal::prelude::FromPrimitive;
    use std::str::FromStr;

    match value {
        StringOrNumber::String(s) => Decimal::from_str(&s).map_err(E::custom),
        StringOrNumber::Number(n) => {
            let s = n.to_string();
            // Scientific notation (e.g. 5e-6) has no exact decimal parse path
            if s.contains('e') || s.contains('E') {
                let f = n.as_f64().ok_or_else(|| E::custom("invalid number"))?;
                Decimal::from_f64(f).ok_or_else(|| E::custom("cannot convert to decimal"))
            } else {
                Decimal::from_str(&s).map_err(E::custom)
            }
        }
    }
}

/// Deserialize a decimal from either a JSON string or a JSON number without
/// passing through `f64`.
pub fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    decimal_from(StringOrNumber::deserialize(deserializer)?)
}

/// Optional variant of [`deserialize_decimal`]; `null` and absent fields map to `None`.
pub fn deserialize_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(value) => decimal_from(value).map(Some),
        None => Ok(None),
    }
}
