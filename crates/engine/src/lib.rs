pub mod error;
pub mod instance;
pub mod registry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use core_types::{Account, Candle, InstanceId, StrategyConfig, Symbol, Timeframe};
use events::{EngineEvent, InstanceNotice, OrderNotice};
use execution::OrderSink;
use futures::future;
use risk::RiskManager;
use strategies::{StrategyContext, StrategyResult};
use tokio::sync::broadcast;

pub use error::{Error, Result};
pub use instance::{LifecycleState, StrategyInstance};
pub use registry::{StrategyFactory, StrategyRegistry};

use crate::instance::InstanceInner;

/// Capacity of the engine event channel. Slow subscribers lag, they never
/// block dispatch.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Consecutive callback failures after which an instance is parked in
    /// the `Errored` state.
    pub max_callback_failures: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_callback_failures: 3,
        }
    }
}

/// The orchestrator for all trading activity.
///
/// Owns the strategy registry and every live instance, routes market
/// events to subscribed instances, gates every order they produce through
/// the shared risk manager, and forwards accepted orders to the order
/// sink. The backtester drives the exact same engine against replayed
/// data; nothing here knows which mode it is in.
pub struct StrategyEngine {
    registry: RwLock<StrategyRegistry>,
    instances: RwLock<HashMap<InstanceId, Arc<StrategyInstance>>>,
    subscriptions: RwLock<HashMap<(Symbol, Timeframe), Vec<InstanceId>>>,
    risk: Arc<Mutex<RiskManager>>,
    account: Arc<RwLock<Account>>,
    sink: Box<dyn OrderSink>,
    events: broadcast::Sender<EngineEvent>,
    next_instance_id: AtomicU64,
    settings: EngineSettings,
}

impl StrategyEngine {
    pub fn new(
        sink: Box<dyn OrderSink>,
        account: Arc<RwLock<Account>>,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(StrategyRegistry::with_builtins()),
            instances: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            risk: Arc::new(Mutex::new(RiskManager::new())),
            account,
            sink,
            events,
            next_instance_id: AtomicU64::new(1),
            settings,
        }
    }

    /// The risk manager shared by every instance of this engine. Operators
    /// use this handle to administer rules at runtime.
    pub fn risk_manager(&self) -> Arc<Mutex<RiskManager>> {
        Arc::clone(&self.risk)
    }

    /// Subscribes to the engine's observable events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// A sender handle onto the engine's event channel, for collaborators
    /// that publish alongside the engine (e.g. the backtester's completion
    /// event).
    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    /// Adds a strategy implementation to the registry.
    pub fn register_strategy_class(
        &self,
        class_id: impl Into<String>,
        factory: StrategyFactory,
    ) -> Result<()> {
        self.registry
            .write()
            .expect("registry lock poisoned")
            .register(class_id, factory)
    }

    /// Creates a new instance of a registered strategy class.
    ///
    /// Validates the configuration, allocates a fresh instance id, builds
    /// the context, and runs the strategy's `initialize` hook (which may
    /// register risk rules). The instance starts out `Created`.
    pub fn create_strategy(&self, class_id: &str, config: StrategyConfig) -> Result<InstanceId> {
        config
            .validate()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mut strategy = self
            .registry
            .read()
            .expect("registry lock poisoned")
            .create(class_id, &config)?;

        let id = InstanceId(self.next_instance_id.fetch_add(1, Ordering::SeqCst));
        let config = Arc::new(config);
        let mut ctx = StrategyContext::new(
            id,
            Arc::clone(&config),
            Arc::downgrade(&self.risk),
            Arc::downgrade(&self.account),
        );

        strategy
            .initialize(&mut ctx)
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let instance = Arc::new(StrategyInstance::new(id, Arc::clone(&config), strategy, ctx));
        self.instances
            .write()
            .expect("instances lock poisoned")
            .insert(id, Arc::clone(&instance));

        tracing::info!(instance = %id, strategy = %config.name, "strategy instance created");
        self.emit(EngineEvent::InstanceCreated(self.notice(&instance)));
        Ok(id)
    }

    /// Transitions `Created|Stopped → Running` and subscribes the instance
    /// to its configured (symbol, timeframe) pairs.
    pub async fn start_strategy(&self, id: InstanceId) -> Result<()> {
        let instance = self.instance(id)?;
        // Waiting on the inner lock keeps the transition mutually
        // exclusive with an in-flight dispatch to this instance.
        let _inner = instance.inner.lock().await;
        match instance.state() {
            LifecycleState::Created | LifecycleState::Stopped => {}
            state => {
                return Err(Error::InvalidState {
                    id,
                    state,
                    action: "start",
                });
            }
        }
        instance.set_state(LifecycleState::Running);
        drop(_inner);

        let mut subscriptions = self.subscriptions.write().expect("subscriptions lock poisoned");
        for key in instance.config.subscriptions() {
            let subscribers = subscriptions.entry(key).or_default();
            if !subscribers.contains(&id) {
                subscribers.push(id);
            }
        }
        drop(subscriptions);

        tracing::info!(instance = %id, "strategy instance started");
        self.emit(EngineEvent::InstanceStarted(self.notice(&instance)));
        Ok(())
    }

    /// Transitions `Running → Stopped` and removes dispatch subscriptions.
    /// Instance state survives for a later restart.
    pub async fn stop_strategy(&self, id: InstanceId) -> Result<()> {
        let instance = self.instance(id)?;
        let mut inner = instance.inner.lock().await;
        match instance.state() {
            LifecycleState::Running => {}
            state => {
                return Err(Error::InvalidState {
                    id,
                    state,
                    action: "stop",
                });
            }
        }
        instance.set_state(LifecycleState::Stopped);
        let InstanceInner { strategy, ctx } = &mut *inner;
        strategy.on_stop(ctx);
        drop(inner);

        self.unsubscribe(id);
        tracing::info!(instance = %id, "strategy instance stopped");
        self.emit(EngineEvent::InstanceStopped(self.notice(&instance)));
        Ok(())
    }

    /// Releases a `Stopped` or `Errored` instance and its context.
    pub fn remove_strategy(&self, id: InstanceId) -> Result<()> {
        let instance = self.instance(id)?;
        match instance.state() {
            LifecycleState::Stopped | LifecycleState::Errored => {}
            state => {
                return Err(Error::InvalidState {
                    id,
                    state,
                    action: "remove",
                });
            }
        }
        self.unsubscribe(id);
        self.instances
            .write()
            .expect("instances lock poisoned")
            .remove(&id);
        tracing::info!(instance = %id, "strategy instance removed");
        Ok(())
    }

    pub fn instance_state(&self, id: InstanceId) -> Result<LifecycleState> {
        Ok(self.instance(id)?.state())
    }

    pub fn instance_config(&self, id: InstanceId) -> Result<Arc<StrategyConfig>> {
        Ok(Arc::clone(&self.instance(id)?.config))
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances
            .read()
            .expect("instances lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Routes one market event to every running instance subscribed to its
    /// (symbol, timeframe) pair. Dispatch fans out concurrently; the round
    /// completes when every target has returned or been marked failed.
    pub async fn on_market_event(&self, candle: &Candle) {
        // Feed the shared risk context from the event stream so rules see
        // current prices and event time in live trading and replay alike.
        {
            let mut risk = self.risk.lock().expect("risk manager lock poisoned");
            risk.context_mut()
                .mark_price(candle.symbol.clone(), candle.close);
            risk.context_mut().set_clock(candle.timestamp);
        }

        let targets: Vec<Arc<StrategyInstance>> = {
            let subscriptions = self.subscriptions.read().expect("subscriptions lock poisoned");
            let instances = self.instances.read().expect("instances lock poisoned");
            subscriptions
                .get(&(candle.symbol.clone(), candle.timeframe.clone()))
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| instances.get(id))
                        .filter(|instance| instance.state() == LifecycleState::Running)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            return;
        }

        future::join_all(
            targets
                .iter()
                .map(|instance| self.dispatch_to(instance, candle)),
        )
        .await;
    }

    async fn dispatch_to(&self, instance: &Arc<StrategyInstance>, candle: &Candle) {
        let mut inner = instance.inner.lock().await;
        // A stop that raced this dispatch wins: discard the event.
        if instance.state() != LifecycleState::Running {
            return;
        }
        inner.ctx.set_current_time(candle.timestamp);

        let InstanceInner { strategy, ctx } = &mut *inner;
        match strategy.on_market_event(candle, ctx) {
            Ok(result) => {
                instance.reset_failures();
                self.process_result(instance, result).await;
            }
            Err(e) => {
                let failures = instance.count_failure();
                tracing::error!(
                    instance = %instance.id,
                    error = %e,
                    failures,
                    "strategy callback failed"
                );
                if failures >= self.settings.max_callback_failures {
                    instance.set_state(LifecycleState::Errored);
                    drop(inner);
                    self.unsubscribe(instance.id);
                    tracing::error!(
                        instance = %instance.id,
                        "failure threshold reached, instance errored"
                    );
                    self.emit(EngineEvent::InstanceErrored {
                        instance: self.notice(instance),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Applies one strategy result: risk-gate and forward its orders,
    /// forward its cancellations unconditionally, surface its logs.
    async fn process_result(&self, instance: &Arc<StrategyInstance>, result: StrategyResult) {
        for log in &result.logs {
            tracing::info!(instance = %instance.id, "{log}");
        }

        for order in result.orders {
            let snapshot = self
                .account
                .read()
                .expect("account lock poisoned")
                .clone();
            let verdict = self
                .risk
                .lock()
                .expect("risk manager lock poisoned")
                .check_order(&order, &snapshot);

            match verdict {
                risk::RiskVerdict::Accepted => {
                    self.emit(EngineEvent::OrderAccepted(OrderNotice::from(&order)));
                    if let Err(e) = self.sink.submit(order).await {
                        tracing::error!(instance = %instance.id, error = %e, "order submission failed");
                    }
                }
                risk::RiskVerdict::Rejected { rule, reason } => {
                    tracing::warn!(
                        instance = %instance.id,
                        order = %order.id,
                        rule = %rule,
                        %reason,
                        "order rejected"
                    );
                    self.emit(EngineEvent::OrderRejected {
                        order: OrderNotice::from(&order),
                        rule,
                        reason,
                    });
                }
            }
        }

        // Cancellation is not risk-gated.
        for order_id in result.cancel_order_ids {
            if let Err(e) = self.sink.cancel(&order_id).await {
                tracing::warn!(instance = %instance.id, order = %order_id, error = %e, "cancel failed");
            }
        }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn notice(&self, instance: &StrategyInstance) -> InstanceNotice {
        InstanceNotice {
            id: instance.id,
            strategy: instance.config.name.clone(),
            symbols: instance.config.symbols.clone(),
            occurred_at: Utc::now(),
        }
    }

    fn instance(&self, id: InstanceId) -> Result<Arc<StrategyInstance>> {
        self.instances
            .read()
            .expect("instances lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownInstance(id))
    }

    fn unsubscribe(&self, id: InstanceId) {
        let mut subscriptions = self.subscriptions.write().expect("subscriptions lock poisoned");
        for subscribers in subscriptions.values_mut() {
            subscribers.retain(|subscriber| *subscriber != id);
        }
        subscriptions.retain(|_, subscribers| !subscribers.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use core_types::{Order, OrderId, Side};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use strategies::Strategy;

    /// Order sink that records everything it is given.
    #[derive(Default)]
    struct RecordingSink {
        submitted: Mutex<Vec<Order>>,
        canceled: Mutex<Vec<OrderId>>,
    }

    /// Newtype wrapper so a shared `Arc<RecordingSink>` can be handed to the
    /// engine as a `Box<dyn OrderSink>` without violating the orphan rule.
    #[derive(Clone)]
    struct SharedSink(Arc<RecordingSink>);

    #[async_trait]
    impl OrderSink for SharedSink {
        fn name(&self) -> &'static str {
            "RecordingSink"
        }

        async fn submit(&self, order: Order) -> execution::Result<OrderId> {
            let id = order.id.clone();
            self.0.submitted.lock().unwrap().push(order);
            Ok(id)
        }

        async fn cancel(&self, order_id: &OrderId) -> execution::Result<()> {
            self.0.canceled.lock().unwrap().push(order_id.clone());
            Ok(())
        }
    }

    /// Emits one market buy on every event.
    struct Pulse;

    impl Strategy for Pulse {
        fn name(&self) -> &'static str {
            "pulse"
        }

        fn on_market_event(
            &mut self,
            candle: &Candle,
            ctx: &mut StrategyContext,
        ) -> strategies::Result<StrategyResult> {
            let mut result = StrategyResult::new();
            result.add_order(ctx.market_order(candle.symbol.clone(), Side::Buy, dec!(0.01))?);
            Ok(result)
        }
    }

    /// Fails every callback.
    struct Faulty;

    impl Strategy for Faulty {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn on_market_event(
            &mut self,
            _candle: &Candle,
            _ctx: &mut StrategyContext,
        ) -> strategies::Result<StrategyResult> {
            Err(strategies::Error::Callback("boom".into()))
        }
    }

    struct AlwaysReject;

    impl risk::RiskRule for AlwaysReject {
        fn name(&self) -> &str {
            "always_reject"
        }

        fn enabled(&self) -> bool {
            true
        }

        fn set_enabled(&mut self, _enabled: bool) {}

        fn update_params(&mut self, _params: &toml::value::Table) {}

        fn check_order(
            &mut self,
            _order: &Order,
            _account: &Account,
            _ctx: &risk::RiskContext,
        ) -> Option<String> {
            Some("rejects everything".to_string())
        }
    }

    fn engine_with_sink(settings: EngineSettings) -> (Arc<RecordingSink>, StrategyEngine) {
        let sink = Arc::new(RecordingSink::default());
        let mut account = Account::new("test");
        account.add("USDT", dec!(10000));
        let engine = StrategyEngine::new(
            Box::new(SharedSink(Arc::clone(&sink))),
            Arc::new(RwLock::new(account)),
            settings,
        );
        engine
            .register_strategy_class("pulse", Box::new(|_| Ok(Box::new(Pulse))))
            .unwrap();
        engine
            .register_strategy_class("faulty", Box::new(|_| Ok(Box::new(Faulty))))
            .unwrap();
        (sink, engine)
    }

    fn config() -> StrategyConfig {
        StrategyConfig::new(
            "test-run",
            vec![Symbol::new("BTC/USDT")],
            vec!["test".into()],
            vec![Timeframe::new("1h")],
            toml::Value::Table(toml::value::Table::new()),
        )
    }

    fn candle(hour: u32, close: Decimal) -> Candle {
        Candle {
            symbol: Symbol::new("BTC/USDT"),
            timeframe: Timeframe::new("1h"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    #[tokio::test]
    async fn lifecycle_restart_round_trip() {
        let (_sink, engine) = engine_with_sink(EngineSettings::default());
        let id = engine.create_strategy("pulse", config()).unwrap();
        assert_eq!(engine.instance_state(id).unwrap(), LifecycleState::Created);

        engine.start_strategy(id).await.unwrap();
        assert_eq!(engine.instance_state(id).unwrap(), LifecycleState::Running);

        engine.stop_strategy(id).await.unwrap();
        assert_eq!(engine.instance_state(id).unwrap(), LifecycleState::Stopped);

        engine.start_strategy(id).await.unwrap();
        assert_eq!(engine.instance_state(id).unwrap(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn starting_a_running_instance_is_invalid() {
        let (_sink, engine) = engine_with_sink(EngineSettings::default());
        let id = engine.create_strategy("pulse", config()).unwrap();
        engine.start_strategy(id).await.unwrap();
        assert!(matches!(
            engine.start_strategy(id).await,
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn invalid_configuration_fails_creation() {
        let (_sink, engine) = engine_with_sink(EngineSettings::default());
        let mut bad = config();
        bad.symbols.clear();
        assert!(matches!(
            engine.create_strategy("pulse", bad),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_class_registration_fails() {
        let (_sink, engine) = engine_with_sink(EngineSettings::default());
        let err = engine.register_strategy_class("pulse", Box::new(|_| Ok(Box::new(Pulse))));
        assert!(matches!(err, Err(Error::DuplicateRegistration(_))));
    }

    #[tokio::test]
    async fn events_route_only_to_matching_subscriptions() {
        let (sink, engine) = engine_with_sink(EngineSettings::default());
        let id = engine.create_strategy("pulse", config()).unwrap();
        engine.start_strategy(id).await.unwrap();

        engine.on_market_event(&candle(0, dec!(100))).await;
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);

        // Different symbol, nobody subscribed.
        let mut other = candle(1, dec!(100));
        other.symbol = Symbol::new("ETH/USDT");
        engine.on_market_event(&other).await;
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);

        // Different timeframe, nobody subscribed.
        let mut other = candle(2, dec!(100));
        other.timeframe = Timeframe::new("5m");
        engine.on_market_event(&other).await;
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_orders_never_reach_the_sink() {
        let (sink, engine) = engine_with_sink(EngineSettings::default());
        engine
            .risk_manager()
            .lock()
            .unwrap()
            .add_rule(Box::new(AlwaysReject))
            .unwrap();
        let mut events = engine.subscribe_events();

        let id = engine.create_strategy("pulse", config()).unwrap();
        engine.start_strategy(id).await.unwrap();
        engine.on_market_event(&candle(0, dec!(100))).await;

        assert!(sink.submitted.lock().unwrap().is_empty());
        let rejected = std::iter::from_fn(|| events.try_recv().ok())
            .find(|e| matches!(e, EngineEvent::OrderRejected { .. }));
        match rejected {
            Some(EngineEvent::OrderRejected { rule, .. }) => assert_eq!(rule, "always_reject"),
            other => panic!("expected an order rejection event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_failures_park_the_instance() {
        let (_sink, engine) = engine_with_sink(EngineSettings {
            max_callback_failures: 2,
        });
        let id = engine.create_strategy("faulty", config()).unwrap();
        engine.start_strategy(id).await.unwrap();

        engine.on_market_event(&candle(0, dec!(100))).await;
        assert_eq!(engine.instance_state(id).unwrap(), LifecycleState::Running);

        engine.on_market_event(&candle(1, dec!(100))).await;
        assert_eq!(engine.instance_state(id).unwrap(), LifecycleState::Errored);

        // Errored is terminal for start, the engine itself stays live.
        assert!(matches!(
            engine.start_strategy(id).await,
            Err(Error::InvalidState { .. })
        ));
        let other = engine.create_strategy("pulse", config()).unwrap();
        engine.start_strategy(other).await.unwrap();
        assert_eq!(engine.instance_state(other).unwrap(), LifecycleState::Running);

        // Removal is the one way out.
        engine.remove_strategy(id).unwrap();
        assert!(matches!(
            engine.instance_state(id),
            Err(Error::UnknownInstance(_))
        ));
    }

    #[tokio::test]
    async fn removal_requires_a_stopped_instance() {
        let (_sink, engine) = engine_with_sink(EngineSettings::default());
        let id = engine.create_strategy("pulse", config()).unwrap();
        engine.start_strategy(id).await.unwrap();
        assert!(matches!(
            engine.remove_strategy(id),
            Err(Error::InvalidState { .. })
        ));
        engine.stop_strategy(id).await.unwrap();
        engine.remove_strategy(id).unwrap();
    }

    #[tokio::test]
    async fn stopped_instances_discard_events() {
        let (sink, engine) = engine_with_sink(EngineSettings::default());
        let id = engine.create_strategy("pulse", config()).unwrap();
        engine.start_strategy(id).await.unwrap();
        engine.on_market_event(&candle(0, dec!(100))).await;
        engine.stop_strategy(id).await.unwrap();
        engine.on_market_event(&candle(1, dec!(100))).await;
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
    }
}

