//! Request payloads and normalized channel data for the mercury gateway

use crate::level::{deserialize_decimal, deserialize_opt_decimal};
use crate::{BookSide, Channel, Level, OrderStatus, OrderType, Side, TimeInForce};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Default candle granularity in seconds for the `prices` channel
pub const DEFAULT_GRANULARITY: u32 = 60;

/// Candle granularities (seconds) the `prices` channel accepts
pub const SUPPORTED_GRANULARITIES: [u32; 6] = [60, 300, 900, 3600, 21600, 86400];

// ============================================================================
// Request Types
// ============================================================================

/// Subscribe / unsubscribe request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeRequest {
    /// "subscribe" or "unsubscribe"
    pub action: &'static str,
    /// Channel to (un)subscribe
    pub channel: Channel,
    /// Symbol for market data channels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Candle granularity in seconds (prices channel only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<u32>,
    /// Requested book depth (l2 channel only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl SubscribeRequest {
    /// Create a subscribe request
    pub fn subscribe(channel: Channel, symbol: Option<String>) -> Self {
        Self {
            action: "subscribe",
            channel,
            symbol,
            granularity: None,
            depth: None,
        }
    }

    /// Create an unsubscribe request
    pub fn unsubscribe(channel: Channel, symbol: Option<String>) -> Self {
        Self {
            action: "unsubscribe",
            ..Self::subscribe(channel, symbol)
        }
    }

    /// Set the candle granularity
    pub fn with_granularity(mut self, granularity: Option<u32>) -> Self {
        self.granularity = granularity;
        self
    }

    /// Set the book depth
    pub fn with_depth(mut self, depth: Option<u32>) -> Self {
        self.depth = depth;
        self
    }
}

/// Authentication request on the `auth` channel
#[derive(Clone, Serialize)]
pub struct AuthRequest {
    /// Always "subscribe"
    pub action: &'static str,
    /// Always [`Channel::Auth`]
    pub channel: Channel,
    /// API secret
    pub token: String,
}

impl AuthRequest {
    /// Create an auth request carrying the API secret
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            action: "subscribe",
            channel: Channel::Auth,
            token: token.into(),
        }
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("action", &self.action)
            .field("channel", &self.channel)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Client-side order validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderValidationError {
    #[error("{order_type:?} orders must have a price")]
    MissingPrice { order_type: OrderType },

    #[error("{order_type:?} orders must have a time in force")]
    MissingTimeInForce { order_type: OrderType },

    #[error("market orders cannot have a price")]
    UnexpectedPrice,

    #[error("market orders cannot have a time in force")]
    UnexpectedTimeInForce,

    #[error("GTD orders must have an expiry date")]
    MissingExpiry,

    #[error("{order_type:?} orders must have a stop price")]
    MissingStopPrice { order_type: OrderType },

    #[error("IOC orders must have a minimum quantity")]
    MissingMinQty,

    #[error("order quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("cancel requests must have an order id")]
    MissingOrderId,
}

/// A new order (`NewOrderSingle`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    /// Client order id, generated if not supplied
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: String,
    /// Trading pair
    pub symbol: String,
    /// Order type
    #[serde(rename = "ordType")]
    pub order_type: OrderType,
    /// Time in force
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    /// Buy or sell
    pub side: Side,
    /// Order quantity
    #[serde(rename = "orderQty")]
    pub quantity: Decimal,
    /// Limit price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Trigger price for stop orders
    #[serde(rename = "stopPx", skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Minimum fill quantity for IOC orders
    #[serde(rename = "minQty", skip_serializing_if = "Option::is_none")]
    pub min_qty: Option<Decimal>,
    /// Expiry date for GTD orders
    #[serde(
        rename = "expireDate",
        serialize_with = "serialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_date: Option<NaiveDate>,
    /// Post-only execution instruction
    #[serde(
        rename = "execInst",
        serialize_with = "serialize_post_only",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub post_only: bool,
}

impl NewOrder {
    fn base(symbol: impl Into<String>, order_type: OrderType, side: Side, quantity: Decimal) -> Self {
        Self {
            cl_ord_id: generate_client_order_id(),
            symbol: symbol.into(),
            order_type,
            time_in_force: None,
            side,
            quantity,
            price: None,
            stop_price: None,
            min_qty: None,
            expire_date: None,
            post_only: false,
        }
    }

    /// Market order
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self::base(symbol, OrderType::Market, side, quantity)
    }

    /// Good-till-cancelled limit order
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            price: Some(price),
            time_in_force: Some(TimeInForce::Gtc),
            ..Self::base(symbol, OrderType::Limit, side, quantity)
        }
    }

    /// Stop (market) order
    pub fn stop(symbol: impl Into<String>, side: Side, quantity: Decimal, stop_price: Decimal) -> Self {
        Self {
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::Gtc),
            ..Self::base(symbol, OrderType::Stop, side, quantity)
        }
    }

    /// Stop-limit order
    pub fn stop_limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            price: Some(price),
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::Gtc),
            ..Self::base(symbol, OrderType::StopLimit, side, quantity)
        }
    }

    /// Set the time in force (`None` clears it)
    pub fn with_time_in_force(mut self, tif: Option<TimeInForce>) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Set the limit price (`None` clears it)
    pub fn with_price(mut self, price: Option<Decimal>) -> Self {
        self.price = price;
        self
    }

    /// Set the stop price
    pub fn with_stop_price(mut self, stop_price: Option<Decimal>) -> Self {
        self.stop_price = stop_price;
        self
    }

    /// Set the minimum fill quantity
    pub fn with_min_qty(mut self, min_qty: Decimal) -> Self {
        self.min_qty = Some(min_qty);
        self
    }

    /// Set the GTD expiry date
    pub fn with_expiry(mut self, date: NaiveDate) -> Self {
        self.expire_date = Some(date);
        self
    }

    /// Mark as post-only (add liquidity only)
    pub fn post_only(mut self) -> Self {
        self.post_only = true;
        self
    }

    /// Override the generated client order id
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.cl_ord_id = id.into();
        self
    }

    /// Check the field combinations the exchange requires
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.quantity <= Decimal::ZERO {
            return Err(OrderValidationError::NonPositiveQuantity(self.quantity));
        }

        let order_type = self.order_type;
        if order_type.requires_price() {
            if self.price.is_none() {
                return Err(OrderValidationError::MissingPrice { order_type });
            }
            if self.time_in_force.is_none() {
                return Err(OrderValidationError::MissingTimeInForce { order_type });
            }
        }

        if order_type == OrderType::Market {
            if self.price.is_some() {
                return Err(OrderValidationError::UnexpectedPrice);
            }
            if self.time_in_force.is_some() {
                return Err(OrderValidationError::UnexpectedTimeInForce);
            }
        }

        if order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(OrderValidationError::MissingStopPrice { order_type });
        }

        match self.time_in_force {
            Some(TimeInForce::Gtd) if self.expire_date.is_none() => {
                Err(OrderValidationError::MissingExpiry)
            }
            Some(TimeInForce::Ioc) if self.min_qty.is_none() => {
                Err(OrderValidationError::MissingMinQty)
            }
            _ => Ok(()),
        }
    }
}

fn serialize_expiry<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => {
            let yyyymmdd: u32 = date
                .format("%Y%m%d")
                .to_string()
                .parse()
                .map_err(serde::ser::Error::custom)?;
            serializer.serialize_u32(yyyymmdd)
        }
        None => serializer.serialize_none(),
    }
}

fn serialize_post_only<S: Serializer>(_: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("ALO")
}

/// Generate a client order id
pub fn generate_client_order_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("bcx{}", &id[..16])
}

/// Order commands sent on the `trading` channel
#[derive(Debug, Clone, PartialEq)]
pub enum OrderRequest {
    /// Place a new order
    New(NewOrder),
    /// Cancel one order by exchange order id
    Cancel { order_id: String },
    /// Cancel every open order of the session
    CancelAll,
}

impl OrderRequest {
    /// Exchange action name
    pub fn action(&self) -> &'static str {
        match self {
            Self::New(_) => "NewOrderSingle",
            Self::Cancel { .. } => "CancelOrderRequest",
            Self::CancelAll => "BulkCancelOrderRequest",
        }
    }

    /// Validate before sending
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        match self {
            Self::New(order) => order.validate(),
            Self::Cancel { order_id } if order_id.trim().is_empty() => {
                Err(OrderValidationError::MissingOrderId)
            }
            _ => Ok(()),
        }
    }

    /// Client order id, for new orders
    pub fn client_order_id(&self) -> Option<&str> {
        match self {
            Self::New(order) => Some(&order.cl_ord_id),
            _ => None,
        }
    }
}

impl From<NewOrder> for OrderRequest {
    fn from(order: NewOrder) -> Self {
        Self::New(order)
    }
}

/// Sentinel order id the exchange uses for bulk cancel
pub const BULK_CANCEL_ORDER_ID: i64 = -999;

// ============================================================================
// Normalized channel data
// ============================================================================

/// A single price level change within a book delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    /// Book side
    pub side: BookSide,
    /// Price of the level
    pub price: Decimal,
    /// New quantity, zero removes the level
    pub qty: Decimal,
    /// Resting order count
    pub orders: u32,
}

impl LevelChange {
    /// Create a level change
    pub fn new(side: BookSide, price: Decimal, qty: Decimal, orders: u32) -> Self {
        Self { side, price, qty, orders }
    }

    /// Build a change from a wire level
    pub fn from_level(side: BookSide, level: &Level) -> Self {
        Self::new(side, level.price, level.qty, level.orders)
    }
}

/// Full L2 book state for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Trading pair
    pub symbol: String,
    /// Book sequence number
    pub sequence: u64,
    /// Bid levels
    pub bids: Vec<Level>,
    /// Ask levels
    pub asks: Vec<Level>,
}

/// Incremental L2 update, applied atomically under one sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDelta {
    /// Trading pair
    pub symbol: String,
    /// Book sequence number
    pub sequence: u64,
    /// Level changes in wire order
    pub changes: Vec<LevelChange>,
}

impl BookDelta {
    /// Delta carrying a single level change
    pub fn single(
        symbol: impl Into<String>,
        sequence: u64,
        side: BookSide,
        price: Decimal,
        qty: Decimal,
        orders: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            sequence,
            changes: vec![LevelChange::new(side, price, qty, orders)],
        }
    }
}

/// Public trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeData {
    /// Trading pair
    pub symbol: String,
    /// Exchange trade id
    pub trade_id: String,
    /// Execution price
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    /// Executed quantity
    #[serde(deserialize_with = "deserialize_decimal")]
    pub qty: Decimal,
    /// Aggressor side
    pub side: Side,
    /// Execution time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Ticker statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerData {
    /// Trading pair
    pub symbol: String,
    /// Last traded price
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub last_trade_price: Option<Decimal>,
    /// Price 24 hours ago
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub price_24h: Option<Decimal>,
    /// Traded volume over 24 hours
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub volume_24h: Option<Decimal>,
}

impl TickerData {
    /// Price change over 24 hours, when both prices are known
    pub fn change_24h(&self) -> Option<Decimal> {
        Some(self.last_trade_price? - self.price_24h?)
    }
}

/// OHLCV candle from the `prices` channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleData {
    /// Trading pair
    pub symbol: String,
    /// Candle open time, epoch milliseconds
    pub timestamp: i64,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Volume
    pub volume: Decimal,
}

/// Order state report from the `trading` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    /// Exchange order id
    #[serde(rename = "orderID", default, deserialize_with = "deserialize_id")]
    pub order_id: Option<String>,
    /// Client order id
    #[serde(rename = "clOrdID", default)]
    pub cl_ord_id: Option<String>,
    /// Trading pair
    #[serde(default)]
    pub symbol: Option<String>,
    /// Order side
    #[serde(default)]
    pub side: Option<Side>,
    /// Order type as reported
    #[serde(rename = "ordType", default)]
    pub order_type: Option<String>,
    /// Lifecycle status
    #[serde(rename = "ordStatus", deserialize_with = "deserialize_status")]
    pub status: OrderStatus,
    /// Limit price
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub price: Option<Decimal>,
    /// Average fill price
    #[serde(rename = "avgPx", default, deserialize_with = "deserialize_opt_decimal")]
    pub avg_price: Option<Decimal>,
    /// Original quantity
    #[serde(rename = "orderQty", default, deserialize_with = "deserialize_opt_decimal")]
    pub order_qty: Option<Decimal>,
    /// Filled quantity
    #[serde(rename = "cumQty", default, deserialize_with = "deserialize_opt_decimal")]
    pub cum_qty: Option<Decimal>,
    /// Remaining quantity
    #[serde(rename = "leavesQty", default, deserialize_with = "deserialize_opt_decimal")]
    pub leaves_qty: Option<Decimal>,
    /// Execution id
    #[serde(rename = "execID", default, deserialize_with = "deserialize_id")]
    pub exec_id: Option<String>,
    /// Execution type
    #[serde(rename = "execType", default)]
    pub exec_type: Option<String>,
    /// Free text, usually a rejection reason
    #[serde(default)]
    pub text: Option<String>,
}

impl OrderReport {
    /// Returns true once the order can no longer change
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Balance of one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceData {
    /// Currency code
    pub currency: String,
    /// Total balance
    #[serde(deserialize_with = "deserialize_decimal")]
    pub balance: Decimal,
    /// Balance available for trading
    #[serde(deserialize_with = "deserialize_decimal")]
    pub available: Decimal,
}

/// Instrument reference data from the `symbols` channel
///
/// The exchange sends one symbol per frame and may add fields over time, so
/// everything besides the symbol is kept as raw JSON. Updates carry only the
/// fields that changed and are merged over the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDetails {
    /// Trading pair
    pub symbol: String,
    /// Remaining fields as sent
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SymbolDetails {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Raw field by name
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Overwrite fields with those present in `update`
    pub fn merge(&mut self, update: SymbolDetails) {
        self.fields.extend(update.fields);
    }

    pub fn base_currency(&self) -> Option<&str> {
        self.get("base_currency").and_then(|v| v.as_str())
    }

    pub fn counter_currency(&self) -> Option<&str> {
        self.get("counter_currency").and_then(|v| v.as_str())
    }

    /// Trading status, e.g. "open" or "halt"
    pub fn status(&self) -> Option<&str> {
        self.get("status").and_then(|v| v.as_str())
    }

    /// Decimal places allowed on base currency quantities
    pub fn base_currency_scale(&self) -> Option<u32> {
        self.scale("base_currency_scale")
    }

    /// Smallest price step, `min_price_increment` scaled down by its scale
    pub fn tick_size(&self) -> Option<Decimal> {
        self.scaled("min_price_increment", "min_price_increment_scale")
    }

    /// Smallest order quantity, `min_order_size` scaled down by its scale
    pub fn lot_size(&self) -> Option<Decimal> {
        self.scaled("min_order_size", "min_order_size_scale")
    }

    fn scale(&self, field: &str) -> Option<u32> {
        self.get(field)
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
    }

    fn scaled(&self, value: &str, scale: &str) -> Option<Decimal> {
        let mantissa = self.get(value)?.as_i64()?;
        Decimal::try_new(mantissa, self.scale(scale)?).ok()
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<OrderStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(OrderStatus::parse(&s))
}

/// Order and execution ids arrive as either strings or integers
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    }))
}
