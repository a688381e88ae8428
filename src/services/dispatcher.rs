use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::PacingConfig;
use crate::constants::keys;
use crate::error::ExecutorError;
use crate::pricing::PriceCalculator;
use crate::services::gating::{trading_window_check, Clock, TradingWindowPolicy};
use crate::symbols::SymbolBook;
use crate::types::{CommandKind, OrderRequest, Side};
use crate::window::{Actuator, Key};

/// Buy / sell order with every field resolved to the text typed into the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedOrder {
    pub side: Side,
    pub code: String,
    pub price: String,
    pub quantity: u64,
}

/// Turns commands into the client's key sequences. Assumes the window already
/// has focus; focusing and capturing are the worker's job.
pub struct CommandDispatcher {
    actuator: Arc<dyn Actuator>,
    pricing: PriceCalculator,
    symbols: SymbolBook,
    policy: TradingWindowPolicy,
    clock: Arc<dyn Clock>,
    pacing: PacingConfig,
}

impl CommandDispatcher {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        pricing: PriceCalculator,
        symbols: SymbolBook,
        policy: TradingWindowPolicy,
        clock: Arc<dyn Clock>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            actuator,
            pricing,
            symbols,
            policy,
            clock,
            pacing,
        }
    }

    /// Only buy / sell / cancel are gated.
    pub fn trading_window_check(&self, kind: CommandKind) -> Result<(), ExecutorError> {
        if !kind.is_mutating() {
            return Ok(());
        }
        trading_window_check(self.clock.now(), &self.policy)
    }

    /// Resolves symbol, price and board lot before anything is typed.
    pub fn prepare(&self, req: &OrderRequest) -> Result<PreparedOrder, ExecutorError> {
        if req.side == Side::Cancel {
            return Err(invalid("cancel requests are not priced"));
        }
        if req.symbol.trim().is_empty() {
            return Err(invalid("symbol is required"));
        }
        let code = self.symbols.resolve(&req.symbol);
        let raw_price = req
            .price
            .as_deref()
            .ok_or_else(|| invalid(format!("price is required for {}", code)))?;
        let quantity = req
            .quantity
            .ok_or_else(|| invalid(format!("quantity is required for {}", code)))?;

        let price = self.pricing.resolve_price(&code, req.side, raw_price, req.price_mode)?;
        let quantity = self.pricing.round_quantity(&code, quantity)?;

        Ok(PreparedOrder {
            side: req.side,
            code,
            price,
            quantity,
        })
    }

    /// F1 (buy) / F2 (sell), then code, price and quantity fields, then confirm.
    pub async fn send_order(&self, order: &PreparedOrder) -> Result<(), ExecutorError> {
        let mode_key = match order.side {
            Side::Buy => Key::F1,
            Side::Sell => Key::F2,
            Side::Cancel => return Err(invalid("cancel is not an order entry")),
        };
        info!(
            "⌨️ [DISPATCH] {:?} {} x{} @ {}",
            order.side, order.code, order.quantity, order.price
        );

        self.key(mode_key).await?;
        self.pause(self.pacing.field_delay_ms).await;
        self.clear_field().await?;
        self.field(&order.code).await?;
        self.field(&order.price).await?;
        self.field(&order.quantity.to_string()).await?;
        self.confirm().await
    }

    /// F3, order id, confirm.
    pub async fn send_cancel(&self, order_id: &str) -> Result<(), ExecutorError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(invalid("order id is required"));
        }
        info!("⌨️ [DISPATCH] Cancel {}", order_id);

        self.key(Key::F3).await?;
        self.pause(self.pacing.field_delay_ms).await;
        self.clear_field().await?;
        self.field(order_id).await?;
        self.confirm().await
    }

    /// Switches the client to the page a query reads, then waits for it to settle.
    pub async fn open_page(&self, kind: CommandKind) -> Result<(), ExecutorError> {
        let sequence: &[Key] = match kind {
            CommandKind::QueryAssets => &[Key::F4],
            // Position / trade / order tabs live under the buy page
            CommandKind::QueryPositions => &[Key::F1, Key::F6],
            CommandKind::QueryTrades => &[Key::F1, Key::F7],
            CommandKind::QueryOrders => &[Key::F1, Key::F8],
            other => return Err(invalid(format!("{} is not a query", other))),
        };
        debug!("[DISPATCH] Opening {} page", kind);

        for key in sequence {
            self.key(*key).await?;
            self.pause(self.pacing.field_delay_ms).await;
        }
        self.pause(self.pacing.settle_delay_ms).await;
        Ok(())
    }

    async fn clear_field(&self) -> Result<(), ExecutorError> {
        for _ in 0..keys::FIELD_CLEAR_BACKSPACES {
            self.key(Key::Backspace).await?;
        }
        Ok(())
    }

    /// Types a value and moves to the next field.
    async fn field(&self, value: &str) -> Result<(), ExecutorError> {
        self.actuator
            .send_text(value, Duration::from_millis(self.pacing.char_delay_ms))
            .await
            .map_err(|e| input_error(format!("typing '{}': {}", value, e)))?;
        self.pause(self.pacing.key_delay_ms).await;
        self.key(Key::Enter).await?;
        self.pause(self.pacing.field_delay_ms).await;
        Ok(())
    }

    async fn confirm(&self) -> Result<(), ExecutorError> {
        for _ in 0..keys::CONFIRM_ENTERS {
            self.key(Key::Enter).await?;
            self.pause(self.pacing.field_delay_ms).await;
        }
        Ok(())
    }

    async fn key(&self, key: Key) -> Result<(), ExecutorError> {
        debug!("[DISPATCH] key {}", key.keysym());
        self.actuator
            .send_key(key)
            .await
            .map_err(|e| input_error(format!("key {}: {}", key.keysym(), e)))?;
        self.pause(self.pacing.key_delay_ms).await;
        Ok(())
    }

    async fn pause(&self, base_ms: u64) {
        let ms = base_ms + jitter(self.pacing.jitter_ms);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

fn jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max_ms)
    }
}

fn invalid(reason: impl Into<String>) -> ExecutorError {
    ExecutorError::InvalidOrder { reason: reason.into() }
}

fn input_error(reason: String) -> ExecutorError {
    ExecutorError::InputError { reason }
}
