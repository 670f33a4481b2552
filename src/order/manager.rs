// =============================================================================
// Order Manager — lifecycle for active orders (place / monitor / reconcile)
// =============================================================================
//
// SAFETY POLICY: this manager will adopt broker positions it doesn't know
// about, and it will warn loudly about drift, but it never cancels an order
// or closes a position on the broker's behalf outside of the exit conditions
// it was told to watch for.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, OrderRequest, TimeInForce};
use crate::error::EngineError;
use crate::order::calculator::OrderCalculator;
use crate::types::{ActiveOrder, OrderOrigin, OrderParams, Side};

/// Reason an active order was exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// An exit decision produced by [`OrderManager::monitor`].
#[derive(Debug, Clone)]
pub struct MonitorExit {
    pub order_id: String,
    pub symbol: String,
    pub reason: ExitReason,
    pub exit_price: Decimal,
}

/// Summary of one `sync_positions` pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub matched: u32,
    pub adopted: u32,
    pub orphaned: u32,
}

/// Owns every order this process has placed or adopted and enforces the
/// at-most-one-active-order-per-symbol invariant.
pub struct OrderManager {
    broker: Arc<dyn BrokerClient>,
    order_params: OrderParams,
    active: RwLock<HashMap<String, ActiveOrder>>,
}

impl OrderManager {
    pub fn new(broker: Arc<dyn BrokerClient>, order_params: OrderParams) -> Self {
        Self {
            broker,
            order_params,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// All currently active orders, keyed by order id.
    pub fn active_orders(&self) -> Vec<ActiveOrder> {
        self.active.read().values().cloned().collect()
    }

    pub fn has_active_order_for(&self, symbol: &str) -> bool {
        self.active.read().values().any(|o| o.symbol == symbol)
    }

    // -------------------------------------------------------------------
    // Place
    // -------------------------------------------------------------------

    /// Size and submit a new entry for `symbol`. Fails with
    /// `EngineError::StateConflict` if an order is already active for this
    /// symbol — the manager never opens a second concurrent position on the
    /// same name.
    pub async fn place(
        &self,
        symbol: &str,
        side: Side,
        capital: Decimal,
        entry_price: Decimal,
        lot_size: Option<Decimal>,
    ) -> Result<ActiveOrder, EngineError> {
        if self.has_active_order_for(symbol) {
            return Err(EngineError::StateConflict {
                symbol: symbol.to_string(),
            });
        }

        let sized = OrderCalculator::calculate(capital, entry_price, &self.order_params, lot_size)?;

        let broker_order_id = self
            .broker
            .submit_market_order(OrderRequest {
                symbol: symbol.to_string(),
                side,
                quantity: sized.quantity,
                tif: TimeInForce::Gtc,
            })
            .await?;

        let order = ActiveOrder {
            id: broker_order_id,
            symbol: symbol.to_string(),
            side,
            quantity: sized.quantity,
            entry_price,
            stop_loss: sized.stop_loss,
            take_profit: sized.take_profit,
            opened_at: Utc::now(),
            origin: OrderOrigin::Placed,
        };

        info!(
            order_id = %order.id,
            symbol,
            side = %side,
            quantity = %order.quantity,
            entry_price = %entry_price,
            stop_loss = %order.stop_loss,
            take_profit = %order.take_profit,
            "order placed"
        );

        self.active.write().insert(order.id.clone(), order.clone());
        Ok(order)
    }

    // -------------------------------------------------------------------
    // Monitor
    // -------------------------------------------------------------------

    /// Check the active order for `symbol` (if any) against `current_price`.
    /// On a stop-loss or take-profit breach, submit a closing market order
    /// for the full quantity and remove the order from tracking. Stop-loss
    /// takes precedence when both thresholds straddle the same bar (spec
    /// §4.5). Must be called before the bar is folded into the aggregator,
    /// so the exit decision is based on last-known rather than in-progress
    /// price — this guarantees an entry placed on this bar's close cannot be
    /// immediately stopped out by the same close.
    ///
    /// If the closing submission fails, the order is left in `active` and
    /// re-evaluated on the next bar — this method does not retry internally
    /// (spec §4.5, §9 open question).
    pub async fn monitor(&self, symbol: &str, current_price: Decimal) -> Option<MonitorExit> {
        let (order_id, quantity, reason) = {
            let active = self.active.read();
            let order = active.values().find(|o| o.symbol == symbol)?;
            let is_long = order.side == Side::Buy;

            let sl_hit = if is_long {
                current_price <= order.stop_loss
            } else {
                current_price >= order.stop_loss
            };
            let tp_hit = if is_long {
                current_price >= order.take_profit
            } else {
                current_price <= order.take_profit
            };

            let reason = if sl_hit {
                ExitReason::StopLoss
            } else if tp_hit {
                ExitReason::TakeProfit
            } else {
                return None;
            };

            (order.id.clone(), order.quantity, reason)
        };

        let closing_side = match self.active.read().get(&order_id)?.side {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        };

        let close_result = self
            .broker
            .submit_market_order(OrderRequest {
                symbol: symbol.to_string(),
                side: closing_side,
                quantity,
                tif: TimeInForce::Gtc,
            })
            .await;

        if let Err(e) = close_result {
            warn!(
                order_id = %order_id,
                symbol,
                reason = ?reason,
                error = %e,
                "closing submission failed — leaving order active, will re-evaluate next bar"
            );
            return None;
        }

        self.active.write().remove(&order_id);

        let exit = MonitorExit {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            reason,
            exit_price: current_price,
        };

        info!(
            order_id = %exit.order_id,
            symbol,
            reason = ?exit.reason,
            exit_price = %current_price,
            "order exited"
        );

        Some(exit)
    }

    // -------------------------------------------------------------------
    // Reconcile
    // -------------------------------------------------------------------

    /// Compare internally tracked orders against the broker's reported
    /// positions. Exactly one call is made before streaming starts.
    ///
    /// - A broker position with no internal match is **adopted**: an
    ///   `ActiveOrder` is synthesised from the broker's avg entry price using
    ///   the configured `order_params`, tagged `OrderOrigin::Adopted`.
    /// - An internal order with no matching broker position is logged as
    ///   drift and left in place; this manager never auto-closes.
    pub async fn sync_positions(&self) -> Result<ReconcileReport, EngineError> {
        let broker_positions = self.broker.get_all_positions().await?;
        let mut report = ReconcileReport::default();

        let broker_symbols: std::collections::HashSet<&str> =
            broker_positions.iter().map(|p| p.symbol.as_str()).collect();

        {
            let active = self.active.read();
            for order in active.values() {
                if broker_symbols.contains(order.symbol.as_str()) {
                    report.matched += 1;
                } else {
                    report.orphaned += 1;
                    warn!(
                        order_id = %order.id,
                        symbol = %order.symbol,
                        "active order has no matching broker position — possible drift"
                    );
                }
            }
        }

        let internal_symbols: std::collections::HashSet<String> =
            self.active.read().values().map(|o| o.symbol.clone()).collect();

        for pos in broker_positions {
            if internal_symbols.contains(&pos.symbol) {
                continue;
            }

            let sized = OrderCalculator::calculate(
                pos.avg_entry_price * pos.quantity,
                pos.avg_entry_price,
                &self.order_params,
                None,
            )?;

            let adopted = ActiveOrder {
                id: format!("sync:{}:{}", pos.symbol, pos.position_id),
                symbol: pos.symbol.clone(),
                side: pos.side,
                quantity: pos.quantity,
                entry_price: pos.avg_entry_price,
                stop_loss: sized.stop_loss,
                take_profit: sized.take_profit,
                opened_at: Utc::now(),
                origin: OrderOrigin::Adopted,
            };

            debug!(
                symbol = %adopted.symbol,
                entry_price = %adopted.entry_price,
                "adopting untracked broker position"
            );

            self.active.write().insert(adopted.id.clone(), adopted);
            report.adopted += 1;
        }

        info!(
            matched = report.matched,
            adopted = report.adopted,
            orphaned = report.orphaned,
            "reconciliation pass complete"
        );

        Ok(report)
    }
}
