//! Wire codec for the mercury gateway
//!
//! [`WireCodec`] is the exchange adapter seam: the connection actor only sees
//! encoded frames going out and [`Decoded`] events coming in.
//!
//! Inbound frames look like
//!
//! ```text
//! {"seqnum": 12, "event": "updated", "channel": "l2", "symbol": "BTC-USD",
//!  "bids": [{"px": 8723.45, "qty": 1.1, "num": 1}], "asks": []}
//! ```
//!
//! `seqnum` counts every frame on the connection. L2 frames may also carry a
//! per-symbol `seq`; when they do not, book frames are numbered here per
//! symbol (snapshot resets, each update increments) and loss is caught by the
//! connection-level `seqnum` check instead. A frame whose `seqnum` does not
//! move forward leaves the per-symbol numbering untouched.

use crate::events::{AckStatus, Event};
use crate::subscription::Subscription;
use bcx_auth::Credentials;
use bcx_types::{
    deserialize_decimal, AuthRequest, BalanceData, BookDelta, BookSide, BookSnapshot, CandleData,
    Channel, Decimal, FrameEvent, Level, LevelChange, OrderReport, OrderRequest, SymbolDetails,
    TickerData, BULK_CANCEL_ORDER_ID,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Encoding / decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame is not valid JSON or does not match the channel schema
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Required field absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Channel name not understood
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Event name not understood
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Outbound payload could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::InvalidFrame(e.to_string())
    }
}

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Connection-level sequence number, when present
    pub seqnum: Option<u64>,
    /// Normalized event
    pub event: Event,
}

/// Exchange adapter: encodes commands and decodes frames
pub trait WireCodec: Send {
    fn encode_subscribe(&self, subscription: &Subscription) -> Result<String, CodecError>;

    fn encode_unsubscribe(&self, subscription: &Subscription) -> Result<String, CodecError>;

    /// Auth frame carrying the secret; never log the result
    fn encode_auth(&self, credentials: &Credentials) -> Result<String, CodecError>;

    fn encode_order(&self, order: &OrderRequest) -> Result<String, CodecError>;

    /// Frames that make the exchange send a fresh book snapshot
    fn encode_snapshot_request(&self, subscription: &Subscription) -> Result<Vec<String>, CodecError> {
        Ok(vec![
            self.encode_unsubscribe(subscription)?,
            self.encode_subscribe(subscription)?,
        ])
    }

    fn decode(&mut self, frame: &str) -> Result<Decoded, CodecError>;

    /// Forget per-connection state
    fn reset(&mut self);
}

/// JSON codec for the mercury protocol
#[derive(Debug, Default)]
pub struct JsonCodec {
    book_counters: HashMap<String, u64>,
    last_seqnum: Option<u64>,
}

#[derive(Deserialize)]
struct L2Frame {
    symbol: String,
    #[serde(default)]
    seq: Option<u64>,
    #[serde(default)]
    bids: Vec<Level>,
    #[serde(default)]
    asks: Vec<Level>,
}

#[derive(Deserialize)]
struct Dec(#[serde(deserialize_with = "deserialize_decimal")] Decimal);

#[derive(Deserialize)]
struct PricesFrame {
    symbol: String,
    price: (i64, Dec, Dec, Dec, Dec, Dec),
}

#[derive(Deserialize)]
struct HeartbeatFrame {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct OrdersFrame {
    orders: Vec<OrderReport>,
}

#[derive(Deserialize)]
struct BalancesFrame {
    balances: Vec<BalanceData>,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seqnum`; false when it did not move past the last one seen
    fn advance_seqnum(&mut self, seqnum: Option<u64>) -> bool {
        match (seqnum, self.last_seqnum) {
            (Some(n), Some(last)) if n <= last => false,
            (Some(n), _) => {
                self.last_seqnum = Some(n);
                true
            }
            (None, _) => true,
        }
    }

    fn book_sequence(&mut self, symbol: &str, explicit: Option<u64>, snapshot: bool, seqnum: Option<u64>, late: bool) -> u64 {
        let counter = self.book_counters.get(symbol).copied();
        let sequence = match explicit {
            Some(seq) => seq,
            None if snapshot => seqnum.unwrap_or(0),
            // A late update reuses the current number and never advances it
            None if late => counter.unwrap_or_else(|| seqnum.unwrap_or(0)),
            None => match counter {
                Some(last) => last + 1,
                None => seqnum.unwrap_or(0),
            },
        };
        if !late {
            self.book_counters.insert(symbol.to_string(), sequence);
        }
        sequence
    }

    fn decode_l2(&mut self, value: Value, event: FrameEvent, seqnum: Option<u64>, late: bool) -> Result<Event, CodecError> {
        let frame: L2Frame = serde_json::from_value(value)?;
        match event {
            FrameEvent::Snapshot => {
                let sequence = self.book_sequence(&frame.symbol, frame.seq, true, seqnum, late);
                Ok(Event::BookSnapshot(BookSnapshot {
                    symbol: frame.symbol,
                    sequence,
                    bids: frame.bids,
                    asks: frame.asks,
                }))
            }
            FrameEvent::Updated => {
                let sequence = self.book_sequence(&frame.symbol, frame.seq, false, seqnum, late);
                let changes = frame
                    .bids
                    .iter()
                    .map(|l| LevelChange::from_level(BookSide::Bid, l))
                    .chain(frame.asks.iter().map(|l| LevelChange::from_level(BookSide::Ask, l)))
                    .collect();
                Ok(Event::BookDelta(BookDelta {
                    symbol: frame.symbol,
                    sequence,
                    changes,
                }))
            }
            other => Err(CodecError::UnknownEvent(format!("{:?} on l2", other))),
        }
    }

    fn decode_trading(value: Value, event: FrameEvent) -> Result<Event, CodecError> {
        match event {
            FrameEvent::Snapshot => {
                let frame: OrdersFrame = serde_json::from_value(value)?;
                Ok(Event::OrderUpdate {
                    orders: frame.orders,
                    is_snapshot: true,
                })
            }
            FrameEvent::Updated => Ok(Event::OrderUpdate {
                orders: vec![serde_json::from_value(value)?],
                is_snapshot: false,
            }),
            // An order rejection carries the order; anything else rejects the subscription
            FrameEvent::Rejected if value.get("orderID").is_some() => {
                let mut value = value;
                if let Some(map) = value.as_object_mut() {
                    map.entry("ordStatus").or_insert_with(|| json!("rejected"));
                }
                Ok(Event::OrderUpdate {
                    orders: vec![serde_json::from_value(value)?],
                    is_snapshot: false,
                })
            }
            _ => Ok(ack_event(Channel::Trading, &value, event)),
        }
    }
}

/// Envelope keys that are not part of a channel payload
const ENVELOPE: [&str; 3] = ["seqnum", "event", "channel"];

fn text_of(value: &Value) -> Option<String> {
    value.get("text").and_then(Value::as_str).map(str::to_string)
}

fn ack_event(channel: Channel, value: &Value, event: FrameEvent) -> Event {
    let status = match event {
        FrameEvent::Subscribed => AckStatus::Subscribed,
        FrameEvent::Unsubscribed => AckStatus::Unsubscribed,
        _ => AckStatus::Rejected {
            reason: text_of(value).unwrap_or_else(|| "rejected".to_string()),
        },
    };
    Event::SubscriptionAck {
        channel,
        symbol: value.get("symbol").and_then(Value::as_str).map(str::to_string),
        status,
    }
}

fn to_frame(value: &impl serde::Serialize) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
}

impl WireCodec for JsonCodec {
    fn encode_subscribe(&self, subscription: &Subscription) -> Result<String, CodecError> {
        to_frame(&subscription.to_request())
    }

    fn encode_unsubscribe(&self, subscription: &Subscription) -> Result<String, CodecError> {
        to_frame(&subscription.to_unsubscribe_request())
    }

    fn encode_auth(&self, credentials: &Credentials) -> Result<String, CodecError> {
        to_frame(&AuthRequest::new(credentials.expose_token()))
    }

    fn encode_order(&self, order: &OrderRequest) -> Result<String, CodecError> {
        let mut value = match order {
            OrderRequest::New(new_order) => {
                serde_json::to_value(new_order).map_err(|e| CodecError::Encode(e.to_string()))?
            }
            OrderRequest::Cancel { order_id } => match order_id.parse::<i64>() {
                Ok(id) => json!({ "orderID": id }),
                Err(_) => json!({ "orderID": order_id }),
            },
            OrderRequest::CancelAll => json!({ "orderID": BULK_CANCEL_ORDER_ID }),
        };

        let map = value
            .as_object_mut()
            .ok_or_else(|| CodecError::Encode("order did not serialize to an object".into()))?;
        map.insert("action".into(), json!(order.action()));
        map.insert("channel".into(), json!(Channel::Trading.as_str()));
        to_frame(&value)
    }

    fn decode(&mut self, frame: &str) -> Result<Decoded, CodecError> {
        let value: Value = serde_json::from_str(frame)?;

        let seqnum = value.get("seqnum").and_then(Value::as_u64);
        let late = !self.advance_seqnum(seqnum);
        let channel_name = value
            .get("channel")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("channel"))?;
        let channel = Channel::parse(channel_name)
            .ok_or_else(|| CodecError::UnknownChannel(channel_name.to_string()))?;
        let event_name = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("event"))?;
        let event = serde_json::from_value::<FrameEvent>(json!(event_name))
            .map_err(|_| CodecError::UnknownEvent(event_name.to_string()))?;

        let event = match (channel, event) {
            (Channel::Auth, FrameEvent::Subscribed) => Event::AuthResult {
                authenticated: true,
                reason: None,
            },
            (Channel::Auth, FrameEvent::Rejected) => Event::AuthResult {
                authenticated: false,
                reason: Some(text_of(&value).unwrap_or_else(|| "authentication rejected".into())),
            },
            (Channel::Trading, event) => Self::decode_trading(value, event)?,
            (channel, FrameEvent::Subscribed | FrameEvent::Unsubscribed | FrameEvent::Rejected) => {
                ack_event(channel, &value, event)
            }
            (Channel::Heartbeat, _) => {
                let frame: HeartbeatFrame = serde_json::from_value(value)?;
                Event::Heartbeat {
                    timestamp: frame.timestamp,
                }
            }
            (Channel::L2, event) => self.decode_l2(value, event, seqnum, late)?,
            (Channel::Trades, _) => Event::Trade(serde_json::from_value(value)?),
            (Channel::Ticker, _) => Event::Ticker(serde_json::from_value::<TickerData>(value)?),
            (Channel::Prices, _) => {
                let frame: PricesFrame = serde_json::from_value(value)?;
                let (timestamp, open, high, low, close, volume) = frame.price;
                Event::Candle(CandleData {
                    symbol: frame.symbol,
                    timestamp,
                    open: open.0,
                    high: high.0,
                    low: low.0,
                    close: close.0,
                    volume: volume.0,
                })
            }
            (Channel::Symbols, event) => {
                let mut details: SymbolDetails = serde_json::from_value(value)?;
                for key in ENVELOPE {
                    details.fields.remove(key);
                }
                Event::SymbolDetails {
                    details,
                    is_snapshot: event == FrameEvent::Snapshot,
                }
            }
            (Channel::Balances, event) => {
                let frame: BalancesFrame = serde_json::from_value(value)?;
                Event::BalanceUpdate {
                    balances: frame.balances,
                    is_snapshot: event == FrameEvent::Snapshot,
                }
            }
            (Channel::Auth, other) => {
                return Err(CodecError::UnknownEvent(format!("{:?} on auth", other)));
            }
        };

        Ok(Decoded { seqnum, event })
    }

    fn reset(&mut self) {
        self.book_counters.clear();
        self.last_seqnum = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcx_types::{NewOrder, OrderStatus, Side};
    use rust_decimal_macros::dec;

    fn decode(codec: &mut JsonCodec, frame: Value) -> Decoded {
        codec.decode(&frame.to_string()).unwrap()
    }

    #[test]
    fn test_subscribe_then_ack_recovers_key() {
        let mut codec = JsonCodec::new();
        let sub = Subscription::l2("BTC-USD");
        let frame: Value = serde_json::from_str(&codec.encode_subscribe(&sub).unwrap()).unwrap();
        assert_eq!(frame, json!({"action": "subscribe", "channel": "l2", "symbol": "BTC-USD"}));

        // The exchange echoes the request fields in its ack
        let mut ack = frame.clone();
        ack["event"] = json!("subscribed");
        ack["seqnum"] = json!(0);
        let decoded = decode(&mut codec, ack);
        assert_eq!(decoded.seqnum, Some(0));
        assert_eq!(
            decoded.event,
            Event::SubscriptionAck {
                channel: Channel::L2,
                symbol: Some("BTC-USD".into()),
                status: AckStatus::Subscribed,
            }
        );
    }

    #[test]
    fn test_prices_subscribe_carries_granularity() {
        let codec = JsonCodec::new();
        let frame: Value =
            serde_json::from_str(&codec.encode_subscribe(&Subscription::prices("ETH-USD", 300)).unwrap())
                .unwrap();
        assert_eq!(frame["granularity"], 300);
    }

    #[test]
    fn test_auth_frame() {
        let codec = JsonCodec::new();
        let creds = Credentials::new("secret-token").unwrap();
        let frame: Value = serde_json::from_str(&codec.encode_auth(&creds).unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"action": "subscribe", "channel": "auth", "token": "secret-token"})
        );
    }

    #[test]
    fn test_auth_results() {
        let mut codec = JsonCodec::new();
        let ok = decode(&mut codec, json!({"seqnum": 1, "event": "subscribed", "channel": "auth"}));
        assert_eq!(
            ok.event,
            Event::AuthResult {
                authenticated: true,
                reason: None
            }
        );

        let rejected = decode(
            &mut codec,
            json!({"seqnum": 1, "event": "rejected", "channel": "auth", "text": "Authentication Failed"}),
        );
        assert_eq!(
            rejected.event,
            Event::AuthResult {
                authenticated: false,
                reason: Some("Authentication Failed".into())
            }
        );
    }

    #[test]
    fn test_l2_snapshot_and_update_with_counter() {
        let mut codec = JsonCodec::new();
        let snapshot = decode(
            &mut codec,
            json!({
                "seqnum": 2, "event": "snapshot", "channel": "l2", "symbol": "BTC-USD",
                "bids": [{"px": 8723.45, "qty": 1.1, "num": 1}],
                "asks": [{"px": "8730.0", "qty": "0.5", "num": 2}]
            }),
        );
        let Event::BookSnapshot(book) = snapshot.event else {
            panic!("expected snapshot");
        };
        assert_eq!(book.sequence, 2);
        assert_eq!(book.bids[0].price, dec!(8723.45));
        assert_eq!(book.asks[0].orders, 2);

        let update = decode(
            &mut codec,
            json!({
                "seqnum": 7, "event": "updated", "channel": "l2", "symbol": "BTC-USD",
                "bids": [{"px": 8723.45, "qty": 0, "num": 0}],
                "asks": [{"px": 8731, "qty": 2, "num": 1}]
            }),
        );
        let Event::BookDelta(delta) = update.event else {
            panic!("expected delta");
        };
        assert_eq!(delta.sequence, 3);
        assert_eq!(
            delta.changes,
            vec![
                LevelChange::new(BookSide::Bid, dec!(8723.45), dec!(0), 0),
                LevelChange::new(BookSide::Ask, dec!(8731), dec!(2), 1),
            ]
        );

        codec.reset();
        let after_reset = decode(
            &mut codec,
            json!({"seqnum": 1, "event": "updated", "channel": "l2", "symbol": "BTC-USD", "bids": [], "asks": []}),
        );
        let Event::BookDelta(delta) = after_reset.event else {
            panic!("expected delta");
        };
        assert_eq!(delta.sequence, 1);
    }

    #[test]
    fn test_late_l2_update_does_not_advance_counter() {
        let mut codec = JsonCodec::new();
        let l2 = |seqnum: u64, event: &str| {
            json!({"seqnum": seqnum, "event": event, "channel": "l2", "symbol": "BTC-USD",
                   "bids": [{"px": 100, "qty": 1, "num": 1}], "asks": []})
        };
        decode(&mut codec, l2(1, "snapshot"));
        let next = decode(&mut codec, l2(2, "updated"));
        assert!(matches!(next.event, Event::BookDelta(BookDelta { sequence: 2, .. })));

        // Replayed seqnum 1 keeps the current number instead of taking 3
        let late = decode(&mut codec, l2(1, "updated"));
        assert_eq!(late.seqnum, Some(1));
        assert!(matches!(late.event, Event::BookDelta(BookDelta { sequence: 2, .. })));

        let following = decode(&mut codec, l2(3, "updated"));
        assert!(matches!(following.event, Event::BookDelta(BookDelta { sequence: 3, .. })));
    }

    #[test]
    fn test_l2_explicit_seq_wins() {
        let mut codec = JsonCodec::new();
        decode(
            &mut codec,
            json!({"seqnum": 2, "seq": 100, "event": "snapshot", "channel": "l2", "symbol": "BTC-USD", "bids": [], "asks": []}),
        );
        let update = decode(
            &mut codec,
            json!({"seqnum": 3, "seq": 103, "event": "updated", "channel": "l2", "symbol": "BTC-USD", "bids": [], "asks": []}),
        );
        assert!(matches!(update.event, Event::BookDelta(BookDelta { sequence: 103, .. })));
    }

    #[test]
    fn test_market_data_frames() {
        let mut codec = JsonCodec::new();

        let trade = decode(
            &mut codec,
            json!({
                "seqnum": 21, "event": "updated", "channel": "trades", "symbol": "BTC-USD",
                "timestamp": "2019-08-13T11:30:06.100140Z", "side": "sell",
                "qty": 8.5E-5, "price": 11252.4, "trade_id": "12884909920"
            }),
        );
        let Event::Trade(trade) = trade.event else {
            panic!("expected trade");
        };
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.price, dec!(11252.4));
        assert!(trade.timestamp.is_some());

        let ticker = decode(
            &mut codec,
            json!({"seqnum": 8, "event": "snapshot", "channel": "ticker", "symbol": "BTC-USD",
                   "price_24h": 4988.0, "volume_24h": 0.3015, "last_trade_price": 5000.0}),
        );
        assert!(matches!(
            ticker.event,
            Event::Ticker(TickerData { last_trade_price: Some(p), .. }) if p == dec!(5000)
        ));

        let candle = decode(
            &mut codec,
            json!({"seqnum": 2, "event": "updated", "channel": "prices", "symbol": "BTC-USD",
                   "price": [1559039640000u64, 8697.24, 8700.98, 8697.27, 8700.98, 0.431]}),
        );
        let Event::Candle(candle) = candle.event else {
            panic!("expected candle");
        };
        assert_eq!(candle.timestamp, 1559039640000);
        assert_eq!(candle.high, dec!(8700.98));
        assert_eq!(candle.volume, dec!(0.431));

        let heartbeat = decode(
            &mut codec,
            json!({"seqnum": 1, "event": "updated", "channel": "heartbeat", "timestamp": "2019-05-31T08:36:45.666753Z"}),
        );
        assert!(matches!(heartbeat.event, Event::Heartbeat { timestamp: Some(_) }));
    }

    #[test]
    fn test_symbols_frames() {
        let mut codec = JsonCodec::new();
        let snapshot = decode(
            &mut codec,
            json!({"seqnum": 3, "event": "snapshot", "channel": "symbols", "symbol": "BTC-USD",
                   "base_currency": "BTC", "base_currency_scale": 8, "counter_currency": "USD",
                   "min_price_increment": 10, "min_price_increment_scale": 2, "status": "open"}),
        );
        let Event::SymbolDetails { details, is_snapshot } = snapshot.event else {
            panic!("expected symbol details");
        };
        assert!(is_snapshot);
        assert_eq!(details.symbol, "BTC-USD");
        assert_eq!(details.tick_size(), Some(dec!(0.1)));
        assert!(details.get("seqnum").is_none());
        assert!(details.get("channel").is_none());

        let update = decode(
            &mut codec,
            json!({"seqnum": 4, "event": "updated", "channel": "symbols", "symbol": "BTC-USD", "status": "halt"}),
        );
        assert!(matches!(
            update.event,
            Event::SymbolDetails { ref details, is_snapshot: false } if details.status() == Some("halt")
        ));

        let ack = decode(
            &mut codec,
            json!({"seqnum": 5, "event": "subscribed", "channel": "symbols", "symbol": "ETH-USD"}),
        );
        assert!(matches!(ack.event, Event::SubscriptionAck { channel: Channel::Symbols, .. }));
    }

    #[test]
    fn test_private_frames() {
        let mut codec = JsonCodec::new();

        let balances = decode(
            &mut codec,
            json!({"seqnum": 2, "event": "snapshot", "channel": "balances",
                   "balances": [{"currency": "BTC", "balance": 0.00366963, "available": 0.00266963}]}),
        );
        let Event::BalanceUpdate { balances, is_snapshot } = balances.event else {
            panic!("expected balances");
        };
        assert!(is_snapshot);
        assert_eq!(balances[0].available, dec!(0.00266963));

        let snapshot = decode(
            &mut codec,
            json!({"seqnum": 3, "event": "snapshot", "channel": "trading",
                   "orders": [{"orderID": "1", "ordStatus": "open", "symbol": "BTC-USD"}]}),
        );
        assert!(matches!(
            snapshot.event,
            Event::OrderUpdate { ref orders, is_snapshot: true } if orders.len() == 1
        ));

        let rejected_order = decode(
            &mut codec,
            json!({"seqnum": 4, "event": "rejected", "channel": "trading",
                   "orderID": 0, "clOrdID": "abc", "text": "Invalid price"}),
        );
        let Event::OrderUpdate { orders, .. } = rejected_order.event else {
            panic!("expected order update");
        };
        assert_eq!(orders[0].status, OrderStatus::Rejected);
        assert_eq!(orders[0].text.as_deref(), Some("Invalid price"));

        let rejected_sub = decode(
            &mut codec,
            json!({"seqnum": 5, "event": "rejected", "channel": "trading", "text": "Not authenticated"}),
        );
        assert!(matches!(
            rejected_sub.event,
            Event::SubscriptionAck { channel: Channel::Trading, status: AckStatus::Rejected { .. }, .. }
        ));
    }

    #[test]
    fn test_order_frames() {
        let codec = JsonCodec::new();
        let order = NewOrder::limit("BTC-USD", Side::Buy, dec!(1), dec!(100)).with_client_order_id("c1");
        let frame: Value = serde_json::from_str(&codec.encode_order(&order.into()).unwrap()).unwrap();
        assert_eq!(frame["action"], "NewOrderSingle");
        assert_eq!(frame["channel"], "trading");
        assert_eq!(frame["clOrdID"], "c1");

        let cancel = codec
            .encode_order(&OrderRequest::Cancel { order_id: "12345".into() })
            .unwrap();
        let frame: Value = serde_json::from_str(&cancel).unwrap();
        assert_eq!(
            frame,
            json!({"action": "CancelOrderRequest", "channel": "trading", "orderID": 12345})
        );

        let bulk: Value =
            serde_json::from_str(&codec.encode_order(&OrderRequest::CancelAll).unwrap()).unwrap();
        assert_eq!(bulk["action"], "BulkCancelOrderRequest");
        assert_eq!(bulk["orderID"], -999);
    }

    #[test]
    fn test_snapshot_request_is_unsubscribe_then_subscribe() {
        let codec = JsonCodec::new();
        let frames = codec.encode_snapshot_request(&Subscription::l2("ETH-USD")).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"unsubscribe\""));
        assert!(frames[1].contains("\"subscribe\""));
    }

    #[test]
    fn test_decode_errors() {
        let mut codec = JsonCodec::new();
        assert!(matches!(codec.decode("not json"), Err(CodecError::InvalidFrame(_))));
        assert_eq!(
            codec.decode(r#"{"seqnum":1,"event":"updated","channel":"l3"}"#),
            Err(CodecError::UnknownChannel("l3".into()))
        );
        assert_eq!(
            codec.decode(r#"{"seqnum":1,"event":"exploded","channel":"l2"}"#),
            Err(CodecError::UnknownEvent("exploded".into()))
        );
        assert_eq!(
            codec.decode(r#"{"seqnum":1,"event":"updated"}"#),
            Err(CodecError::MissingField("channel"))
        );
        assert!(codec
            .decode(r#"{"seqnum":1,"event":"updated","channel":"l2","symbol":"BTC-USD","bids":[{"px":"abc","qty":1}]}"#)
            .is_err());
    }
}
