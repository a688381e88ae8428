//! Command and result types exchanged with callers of the executor.

use std::fmt;

use chrono::{DateTime, Local};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::persistence::LogArtifact;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
    Cancel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceMode {
    #[default]
    Limit,
    /// Synthesize an aggressive limit price from the supplied base price.
    Market,
}

/// A trade intent as handed over by the strategy layer.
///
/// `price` is the limit price in `Limit` mode and the base price in `Market` mode.
/// Cancels carry `order_id` and nothing else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    #[serde(default)]
    pub symbol: String,
    pub price: Option<String>,
    pub quantity: Option<u64>,
    #[serde(default)]
    pub price_mode: PriceMode,
    pub order_id: Option<String>,
}

impl OrderRequest {
    pub fn buy(symbol: &str, price: &str, quantity: u64, price_mode: PriceMode) -> Self {
        Self::order(Side::Buy, symbol, price, quantity, price_mode)
    }

    pub fn sell(symbol: &str, price: &str, quantity: u64, price_mode: PriceMode) -> Self {
        Self::order(Side::Sell, symbol, price, quantity, price_mode)
    }

    pub fn cancel(order_id: &str) -> Self {
        Self {
            side: Side::Cancel,
            symbol: String::new(),
            price: None,
            quantity: None,
            price_mode: PriceMode::Limit,
            order_id: Some(order_id.to_string()),
        }
    }

    fn order(side: Side, symbol: &str, price: &str, quantity: u64, price_mode: PriceMode) -> Self {
        Self {
            side,
            symbol: symbol.to_string(),
            price: Some(price.to_string()),
            quantity: Some(quantity),
            price_mode,
            order_id: None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self.side {
            Side::Buy => CommandKind::Buy,
            Side::Sell => CommandKind::Sell,
            Side::Cancel => CommandKind::Cancel,
        }
    }

    /// Symbol for buy/sell, order id for cancels.
    pub fn target(&self) -> String {
        match self.side {
            Side::Cancel => self.order_id.clone().unwrap_or_default(),
            _ => self.symbol.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Launch,
    Activate,
    Buy,
    Sell,
    Cancel,
    QueryAssets,
    QueryPositions,
    QueryTrades,
    QueryOrders,
}

impl CommandKind {
    /// Commands that change account state and are subject to trading-hours gating.
    pub fn is_mutating(&self) -> bool {
        matches!(self, CommandKind::Buy | CommandKind::Sell | CommandKind::Cancel)
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self,
            CommandKind::QueryAssets
                | CommandKind::QueryPositions
                | CommandKind::QueryTrades
                | CommandKind::QueryOrders
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Launch => "launch",
            CommandKind::Activate => "activate",
            CommandKind::Buy => "buy",
            CommandKind::Sell => "sell",
            CommandKind::Cancel => "cancel",
            CommandKind::QueryAssets => "query_assets",
            CommandKind::QueryPositions => "query_positions",
            CommandKind::QueryTrades => "query_trades",
            CommandKind::QueryOrders => "query_orders",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-command state machine. Failures jump straight to `Recording`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStage {
    Idle,
    Focusing,
    Dispatching,
    Capturing,
    Extracting,
    Recording,
}

impl fmt::Display for CommandStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStage::Idle => "idle",
            CommandStage::Focusing => "focusing",
            CommandStage::Dispatching => "dispatching",
            CommandStage::Capturing => "capturing",
            CommandStage::Extracting => "extracting",
            CommandStage::Recording => "recording",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderResult {
    pub command_id: Uuid,
    pub kind: CommandKind,
    pub success: bool,
    /// Resolved symbol code, or the order id for cancels.
    pub target: String,
    /// Price actually typed into the client.
    pub price: Option<String>,
    pub quantity: Option<u64>,
    /// Confirmation screenshot. `None` only when writing it to disk failed.
    pub confirmation: Option<LogArtifact>,
    /// Text read back from the confirmation screen, when verification ran.
    pub confirmation_text: Option<String>,
    pub error: Option<ErrorKind>,
    pub timestamp: DateTime<Local>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Ok,
    Degraded,
    Skipped,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub code: String,
    pub name: String,
    pub quantity: Option<u64>,
    pub cost_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub profit_loss: Option<Decimal>,
    /// Percent, e.g. `6.67` for "+6.67%".
    pub profit_loss_rate: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountAssets {
    pub total_assets: Option<Decimal>,
    pub available_cash: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub frozen_amount: Option<Decimal>,
    pub holdings: Vec<Holding>,
}

impl AccountAssets {
    /// Reads the object returned by the asset prompt. Numbers may arrive as strings
    /// with thousands separators, signs, percent signs or currency suffixes.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got {}", value))?;

        let holdings = match obj.get("stocks").or_else(|| obj.get("holdings")) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object())
                .map(|h| Holding {
                    code: text_field(h.get("code")),
                    name: text_field(h.get("name")),
                    quantity: lenient_decimal(h.get("quantity"))
                        .and_then(|d| d.trunc().to_u64()),
                    cost_price: lenient_decimal(h.get("cost_price")),
                    current_price: lenient_decimal(h.get("current_price")),
                    market_value: lenient_decimal(h.get("market_value")),
                    profit_loss: lenient_decimal(h.get("profit_loss")),
                    profit_loss_rate: lenient_decimal(h.get("profit_loss_rate")),
                })
                .filter(|h| !h.code.is_empty() || !h.name.is_empty())
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(format!("`stocks` is not an array: {}", other)),
        };

        Ok(Self {
            total_assets: lenient_decimal(obj.get("total_assets")),
            available_cash: lenient_decimal(obj.get("available_cash")),
            market_value: lenient_decimal(obj.get("market_value")),
            frozen_amount: lenient_decimal(obj.get("frozen_amount")),
            holdings,
        })
    }
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Best-effort numeric parse of a screen-scraped value. Empty strings are `None`.
pub fn lenient_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | ' ' | '+' | '%' | '元' | '¥'))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

/// Result of the asset page query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub command_id: Uuid,
    /// `None` only when writing the screenshot to disk failed.
    pub screenshot: Option<LogArtifact>,
    pub assets: Option<AccountAssets>,
    /// Object exactly as returned by the extractor.
    pub raw: Option<Value>,
    pub status: ExtractionStatus,
    pub extraction_error: Option<String>,
    pub taken_at: DateTime<Local>,
}

/// Result of the positions / trades / orders pages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResult {
    pub command_id: Uuid,
    pub kind: CommandKind,
    pub screenshot: Option<LogArtifact>,
    pub extracted: Option<Value>,
    pub status: ExtractionStatus,
    pub extraction_error: Option<String>,
    pub taken_at: DateTime<Local>,
}
