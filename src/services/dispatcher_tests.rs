//! Unit tests for the dispatcher - key sequences, order preparation and gating.

#[cfg(test)]
mod dispatcher_tests {
    use crate::config::{PacingConfig, PricingConfig};
    use crate::error::ExecutorError;
    use crate::pricing::PriceCalculator;
    use crate::services::dispatcher::*;
    use crate::services::gating::{FixedClock, TradingWindowPolicy};
    use crate::symbols::{SymbolBook, SymbolParams};
    use crate::types::{CommandKind, OrderRequest, PriceMode, Side};
    use crate::window::{ActuatorEvent, FakeActuator, Key};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        // Friday
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn dispatcher(fake: Arc<FakeActuator>, now: NaiveDateTime) -> CommandDispatcher {
        let symbols = SymbolBook::new();
        symbols.insert(
            "600519",
            SymbolParams {
                name: Some("贵州茅台".to_string()),
                ..Default::default()
            },
        );
        CommandDispatcher::new(
            fake,
            PriceCalculator::new(&PricingConfig::default(), symbols.clone()),
            symbols,
            TradingWindowPolicy::default(),
            Arc::new(FixedClock::new(now)),
            PacingConfig::immediate(),
        )
    }

    fn keys(k: &[Key]) -> Vec<ActuatorEvent> {
        k.iter().map(|k| ActuatorEvent::Key(*k)).collect()
    }

    fn text(s: &str) -> ActuatorEvent {
        ActuatorEvent::Text(s.to_string())
    }

    // ============= Gating Tests =============

    #[test]
    fn test_gating_applies_to_mutating_commands_only() {
        let d = dispatcher(Arc::new(FakeActuator::new()), at(20, 0));

        for kind in [CommandKind::Buy, CommandKind::Sell, CommandKind::Cancel] {
            assert!(matches!(d.trading_window_check(kind), Err(ExecutorError::GatingError { .. })));
        }
        for kind in [
            CommandKind::Launch,
            CommandKind::Activate,
            CommandKind::QueryAssets,
            CommandKind::QueryPositions,
            CommandKind::QueryTrades,
            CommandKind::QueryOrders,
        ] {
            assert!(d.trading_window_check(kind).is_ok());
        }
    }

    #[test]
    fn test_gating_allows_inside_session() {
        let d = dispatcher(Arc::new(FakeActuator::new()), at(10, 30));
        assert!(d.trading_window_check(CommandKind::Buy).is_ok());
    }

    // ============= Prepare Tests =============

    #[test]
    fn test_prepare_resolves_name_price_and_lot() {
        let d = dispatcher(Arc::new(FakeActuator::new()), at(10, 0));

        let order = d
            .prepare(&OrderRequest::buy("贵州茅台", "1700.5", 150, PriceMode::Limit))
            .unwrap();

        assert_eq!(
            order,
            PreparedOrder {
                side: Side::Buy,
                code: "600519".to_string(),
                price: "1700.50".to_string(),
                quantity: 100,
            }
        );
    }

    #[test]
    fn test_prepare_market_order() {
        let d = dispatcher(Arc::new(FakeActuator::new()), at(10, 0));

        let order = d.prepare(&OrderRequest::sell("000001", "10.50", 200, PriceMode::Market)).unwrap();
        assert_eq!(order.price, "10.39");
    }

    #[test]
    fn test_prepare_rejects_incomplete_orders() {
        let d = dispatcher(Arc::new(FakeActuator::new()), at(10, 0));

        let mut no_price = OrderRequest::buy("600519", "10", 100, PriceMode::Limit);
        no_price.price = None;
        assert!(matches!(d.prepare(&no_price), Err(ExecutorError::InvalidOrder { .. })));

        let mut no_qty = OrderRequest::buy("600519", "10", 100, PriceMode::Limit);
        no_qty.quantity = None;
        assert!(d.prepare(&no_qty).is_err());

        assert!(d.prepare(&OrderRequest::buy("", "10", 100, PriceMode::Limit)).is_err());
        assert!(d.prepare(&OrderRequest::buy("600519", "10", 50, PriceMode::Limit)).is_err());
        assert!(d.prepare(&OrderRequest::cancel("123")).is_err());
    }

    // ============= Key Sequence Tests =============

    #[tokio::test]
    async fn test_buy_key_sequence() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let d = dispatcher(fake.clone(), at(10, 0));
        let order = d.prepare(&OrderRequest::buy("600519", "1700", 100, PriceMode::Limit)).unwrap();

        d.send_order(&order).await.unwrap();

        let mut expected = keys(&[Key::F1]);
        expected.extend(keys(&[Key::Backspace; 6]));
        expected.push(text("600519"));
        expected.extend(keys(&[Key::Enter]));
        expected.push(text("1700.00"));
        expected.extend(keys(&[Key::Enter]));
        expected.push(text("100"));
        expected.extend(keys(&[Key::Enter, Key::Enter, Key::Enter]));
        assert_eq!(fake.inputs(), expected);
    }

    #[tokio::test]
    async fn test_sell_uses_f2() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let d = dispatcher(fake.clone(), at(10, 0));
        let order = d.prepare(&OrderRequest::sell("600519", "1700", 100, PriceMode::Limit)).unwrap();

        d.send_order(&order).await.unwrap();

        assert_eq!(fake.inputs()[0], ActuatorEvent::Key(Key::F2));
    }

    #[tokio::test]
    async fn test_cancel_key_sequence() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let d = dispatcher(fake.clone(), at(10, 0));

        d.send_cancel(" 2301 ").await.unwrap();

        let mut expected = keys(&[Key::F3]);
        expected.extend(keys(&[Key::Backspace; 6]));
        expected.push(text("2301"));
        expected.extend(keys(&[Key::Enter, Key::Enter, Key::Enter]));
        assert_eq!(fake.inputs(), expected);
    }

    #[tokio::test]
    async fn test_cancel_requires_order_id() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let d = dispatcher(fake.clone(), at(10, 0));

        assert!(d.send_cancel("  ").await.is_err());
        assert!(fake.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_query_pages() {
        let cases = [
            (CommandKind::QueryAssets, vec![Key::F4]),
            (CommandKind::QueryPositions, vec![Key::F1, Key::F6]),
            (CommandKind::QueryTrades, vec![Key::F1, Key::F7]),
            (CommandKind::QueryOrders, vec![Key::F1, Key::F8]),
        ];
        for (kind, expected) in cases {
            let fake = Arc::new(FakeActuator::with_window("下单"));
            let d = dispatcher(fake.clone(), at(22, 0));
            d.open_page(kind).await.unwrap();
            assert_eq!(fake.inputs(), keys(&expected), "{}", kind);
        }
    }
}
