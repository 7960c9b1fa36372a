use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use core_types::{InstanceId, StrategyConfig};
use strategies::{Strategy, StrategyContext};
use tokio::sync::Mutex as AsyncMutex;

/// Lifecycle of one strategy instance.
///
/// `Created → Running ⇄ Stopped → (removed)`. Any state can fall into
/// `Errored` when callback failures pass the engine's threshold; `Errored`
/// is terminal except for explicit removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Stopped,
    Errored,
}

/// The strategy object together with its private context.
///
/// Both live behind one async mutex: an instance processes at most one
/// event at a time, and lifecycle transitions wait for an in-flight
/// callback to finish.
pub struct InstanceInner {
    pub strategy: Box<dyn Strategy>,
    pub ctx: StrategyContext,
}

/// One running (or stopped) occurrence of a strategy, owned by the engine.
pub struct StrategyInstance {
    pub id: InstanceId,
    pub config: Arc<StrategyConfig>,
    state: Mutex<LifecycleState>,
    pub(crate) inner: AsyncMutex<InstanceInner>,
    consecutive_failures: AtomicU32,
}

impl StrategyInstance {
    pub fn new(
        id: InstanceId,
        config: Arc<StrategyConfig>,
        strategy: Box<dyn Strategy>,
        ctx: StrategyContext,
    ) -> Self {
        Self {
            id,
            config,
            state: Mutex::new(LifecycleState::Created),
            inner: AsyncMutex::new(InstanceInner { strategy, ctx }),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().expect("instance state lock poisoned")
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        *self.state.lock().expect("instance state lock poisoned") = state;
    }

    /// Counts one callback failure and reports the new consecutive total.
    pub(crate) fn count_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }
}
