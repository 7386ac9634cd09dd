use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::ExchangeGateway;
use crate::config::BotConfig;
use crate::error::{TradingError, TradingResult};
use crate::execution::{
    ExitOutcome, OrderOrchestrator, PositionManager, TrailingStopManager,
};
use crate::models::Signal;
use crate::strategy::momentum::MomentumStrategy;
use crate::strategy::signals::{interval_seconds, validate_candle_uniformity};
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// What one cycle saw and decided
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub price: f64,
    pub oscillator: f64,
    pub signal: Signal,
    /// Set when the entry or exit attempt failed
    pub action_error: Option<String>,
    pub open_positions: usize,
}

/// Polls market data and drives entries, exits and trailing stops
pub struct TradingBot {
    config: BotConfig,
    gateway: Arc<dyn ExchangeGateway>,
    strategy: MomentumStrategy,
    orchestrator: OrderOrchestrator,
    trailing: TrailingStopManager,
    positions: PositionManager,
    state: BotState,
    cycles: u64,
}

impl TradingBot {
    pub fn new(config: BotConfig, gateway: Arc<dyn ExchangeGateway>) -> Self {
        let strategy = MomentumStrategy::new(config.signal.clone());
        let orchestrator = OrderOrchestrator::new(gateway.clone(), config.orders.clone());
        let trailing = TrailingStopManager::new(gateway.clone(), config.trailing.clone());

        Self {
            config,
            gateway,
            strategy,
            orchestrator,
            trailing,
            positions: PositionManager::new(),
            state: BotState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    fn transition(&mut self, next: BotState) {
        tracing::info!(from = ?self.state, to = ?next, "Bot state change");
        self.state = next;
    }

    /// Run cycles until `shutdown` is cancelled
    ///
    /// Cycle errors are logged and never end the loop. Open positions are
    /// left in place on shutdown, guarded by their exchange-side orders.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        self.transition(BotState::Running);
        tracing::info!(
            symbol = %self.config.symbol,
            interval = %self.config.kline_interval,
            poll_interval_secs = self.config.poll_interval_secs,
            strategy = self.strategy.name(),
            "💹 Trading loop starting"
        );

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Cancellation is only observed between cycles
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) => {
                    tracing::debug!(
                        cycle = self.cycles,
                        price = report.price,
                        oscillator = report.oscillator,
                        signal = ?report.signal,
                        "Cycle complete"
                    );
                }
                Err(e) => log_cycle_error(&self.config.symbol, &e),
            }
        }

        self.transition(BotState::Stopping);
        for position in self.positions.open_positions() {
            tracing::warn!(
                symbol = %position.symbol,
                quantity = position.quantity,
                stop_price = position.stop_price,
                protective_order = ?position.protective_order,
                "Leaving position open on shutdown"
            );
        }
        self.transition(BotState::Stopped);
        tracing::info!(cycles = self.cycles, "👋 Trading loop stopped");
    }

    /// One pass: fetch candles, decide, act, then maintain protective orders
    pub async fn run_cycle(&mut self) -> TradingResult<CycleReport> {
        self.cycles += 1;
        let symbol = self.config.symbol.clone();

        let candles = self
            .gateway
            .get_klines(
                &symbol,
                &self.config.kline_interval,
                self.config.kline_lookback,
            )
            .await
            .map_err(TradingError::data_unavailable)?;

        if self.config.check_candle_gaps {
            if let Some(expected) = interval_seconds(&self.config.kline_interval) {
                validate_candle_uniformity(&candles, expected)
                    .map_err(|e| TradingError::DataUnavailable(e.to_string()))?;
            }
        }

        let price = candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| TradingError::DataUnavailable(format!("no candles for {}", symbol)))?;

        let oscillator = self.strategy.oscillator_value(&candles).ok_or_else(|| {
            TradingError::DataUnavailable(format!(
                "need {} candles for {}, have {}",
                self.strategy.min_candles_required(),
                symbol,
                candles.len()
            ))
        })?;

        let in_position = self.positions.has_open_position(&symbol);
        let signal = self.strategy.evaluate(oscillator, in_position);

        tracing::info!(
            symbol = %symbol,
            price,
            rsi = oscillator,
            in_position,
            signal = ?signal,
            "💹 [TRADING] Tick"
        );

        if let Some(position) = self.positions.get_open_position(&symbol) {
            tracing::info!(
                symbol = %symbol,
                entry_price = position.entry_price,
                stop_price = position.stop_price,
                unrealized_pnl = position.unrealized_pnl(price),
                protected = position.is_protected(),
                "Holding position"
            );
        }

        let action_error = match self.act(signal, &symbol, price).await {
            Ok(()) => None,
            Err(e) => {
                log_cycle_error(&symbol, &e);
                Some(e.to_string())
            }
        };

        self.orchestrator.protect_exposed(&mut self.positions).await;
        self.trailing.update_all(&mut self.positions).await;

        Ok(CycleReport {
            price,
            oscillator,
            signal,
            action_error,
            open_positions: self.positions.len(),
        })
    }

    async fn act(&mut self, signal: Signal, symbol: &str, price: f64) -> TradingResult<()> {
        match signal {
            Signal::Hold => Ok(()),
            Signal::Enter => {
                let quote_balance = self
                    .gateway
                    .get_balance(&self.config.quote_asset)
                    .await
                    .map_err(TradingError::data_unavailable)?
                    .free;

                let position = self
                    .orchestrator
                    .enter_position(
                        &mut self.positions,
                        symbol,
                        &self.config.base_asset,
                        price,
                        quote_balance,
                    )
                    .await?;

                tracing::info!(
                    symbol,
                    entry_price = position.entry_price,
                    quantity = position.quantity,
                    stop_price = position.stop_price,
                    protected = position.is_protected(),
                    "✓ Entered position"
                );
                Ok(())
            }
            Signal::Exit => {
                match self.orchestrator.exit_position(&mut self.positions, symbol).await? {
                    ExitOutcome::Closed { fill, realized_pnl } => {
                        tracing::info!(
                            symbol,
                            exit_price = fill.avg_price,
                            quantity = fill.executed_qty,
                            realized_pnl,
                            "✓ Exited position"
                        );
                    }
                    ExitOutcome::NothingToSell => {
                        tracing::warn!(symbol, "Exit found no balance, position kept");
                    }
                    ExitOutcome::Released => {
                        tracing::warn!(symbol, "Exit found no balance, position released");
                    }
                }
                Ok(())
            }
        }
    }
}

fn log_cycle_error(symbol: &str, err: &TradingError) {
    match err {
        TradingError::InsufficientQuantity { .. } => {
            tracing::info!(symbol, "Skipping entry: {}", err);
        }
        TradingError::DataUnavailable(_) => {
            tracing::warn!(symbol, "Skipping cycle: {}", err);
        }
        _ => {
            tracing::error!(symbol, "✗ {}", err);
        }
    }
}
