//! Symbol book: display-name resolution and per-symbol trading parameters.
//!
//! Codes are the six-digit exchange codes typed into the client ("600519").
//! Display names ("贵州茅台") are accepted wherever a symbol is expected.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::constants::{defaults, ticks};

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SymbolParams {
    pub name: Option<String>,
    /// Tick decimals accepted by the client for this code.
    pub price_decimals: Option<u32>,
    pub lot_size: Option<u64>,
    /// Per-symbol override of `pricing.market_offset`.
    pub market_offset: Option<Decimal>,
}

#[derive(Clone, Default)]
pub struct SymbolBook {
    by_code: Arc<DashMap<String, SymbolParams>>,
    by_name: Arc<DashMap<String, String>>,
}

impl SymbolBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(symbols: &HashMap<String, SymbolParams>) -> Self {
        let book = Self::new();
        for (code, params) in symbols {
            book.insert(code, params.clone());
        }
        book
    }

    /// Adds or replaces a symbol at runtime.
    pub fn insert(&self, code: &str, params: SymbolParams) {
        if let Some(name) = params.name.as_deref() {
            self.by_name.insert(name.trim().to_string(), code.to_string());
        }
        self.by_code.insert(code.to_string(), params);
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Resolves user input to the code typed into the client.
    ///
    /// All-digit input is already a code. Unknown names pass through unchanged
    /// so the client can still try its own lookup.
    pub fn resolve(&self, symbol: &str) -> String {
        let symbol = symbol.trim();
        if is_code(symbol) {
            return symbol.to_string();
        }
        match self.by_name.get(symbol) {
            Some(code) => code.value().clone(),
            None => {
                warn!("⚠️ [SYMBOLS] Unknown symbol name '{}', typing it as given", symbol);
                symbol.to_string()
            }
        }
    }

    pub fn params(&self, code: &str) -> Option<SymbolParams> {
        self.by_code.get(code).map(|p| p.value().clone())
    }

    pub fn price_decimals(&self, code: &str) -> u32 {
        self.params(code)
            .and_then(|p| p.price_decimals)
            .unwrap_or_else(|| default_price_decimals(code))
    }

    pub fn lot_size(&self, code: &str) -> u64 {
        self.params(code)
            .and_then(|p| p.lot_size)
            .unwrap_or(defaults::LOT_SIZE)
    }

    pub fn market_offset(&self, code: &str) -> Option<Decimal> {
        self.params(code).and_then(|p| p.market_offset)
    }
}

pub fn is_code(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_digit())
}

/// Funds and ETFs (leading 1 or 5) tick in 0.001, everything else in 0.01.
pub fn default_price_decimals(code: &str) -> u32 {
    match code.chars().next() {
        Some('1') | Some('5') => ticks::FUND_PRICE_DECIMALS,
        _ => ticks::STOCK_PRICE_DECIMALS,
    }
}
