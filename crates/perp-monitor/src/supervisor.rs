//! Per-position monitor supervisor.
//!
//! Every open position gets its own monitoring task that ticks the exit
//! state machine until the position reaches a terminal status. The
//! supervisor keeps the task registry consistent with the ledger: a
//! periodic health check catches unwatched or overdue positions and
//! restarts the whole monitor fleet when it finds any.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use perp_core::error::EngineResult;
use perp_engine::{ExecutionEngine, ExitTick};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct MonitorSupervisor {
    engine: Arc<ExecutionEngine>,
    interval: Duration,
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl MonitorSupervisor {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        let interval = Duration::from_secs(engine.strategy().monitor_interval_secs);
        Self {
            engine,
            interval,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the monitoring cadence.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start a monitoring task for the position unless one is already
    /// running.
    pub async fn watch(self: &Arc<Self>, position_id: Uuid) {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&position_id) {
            return;
        }
        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            supervisor.monitor_loop(position_id).await;
            supervisor.tasks.lock().await.remove(&position_id);
        });
        tasks.insert(position_id, handle);
        debug!(%position_id, "Monitor started");
    }

    async fn monitor_loop(&self, position_id: Uuid) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.engine.evaluate_exits(position_id).await {
                Ok(ExitTick::Open) => {}
                Ok(ExitTick::Closed(reason)) => {
                    info!(%position_id, %reason, "Position closed, monitor stopping");
                    return;
                }
                Ok(ExitTick::Finished) => {
                    debug!(%position_id, "Position terminal, monitor stopping");
                    return;
                }
                // Transient failures skip the tick; the next one retries
                Err(e) => warn!(%position_id, error = %e, "Monitor tick failed"),
            }
        }
    }

    /// Spawn a monitor for every open position. Called at startup and
    /// after a fleet restart.
    pub async fn resume(self: &Arc<Self>) -> EngineResult<usize> {
        let open = self.engine.open_positions().await?;
        for position in &open {
            self.watch(position.id).await;
        }
        Ok(open.len())
    }

    /// One scan cycle: evaluate every configured symbol for entries,
    /// promote or expire resting limit orders, and let the regime gate
    /// flatten against a synchronized reversal.
    pub async fn scan_cycle(self: &Arc<Self>) {
        let symbols = self.engine.strategy().symbols.clone();
        for symbol in symbols {
            match self.engine.evaluate(&symbol).await {
                Ok(Some(position_id)) => self.watch(position_id).await,
                Ok(None) => {}
                Err(e) => warn!(%symbol, error = %e, "Signal scan failed"),
            }
        }
        if let Err(e) = self.engine.sweep_resting(Utc::now()).await {
            warn!(error = %e, "Resting order sweep failed");
        }
        match self.engine.check_regime().await {
            Ok(0) => {}
            Ok(flattened) => warn!(flattened, "Emergency flatten executed"),
            Err(e) => warn!(error = %e, "Regime check failed"),
        }
    }

    /// Verify the task registry matches the ledger. Any open position
    /// without a live monitor, or past its planned close, triggers a full
    /// fleet restart. Returns true when a restart happened.
    pub async fn health_check(self: &Arc<Self>) -> EngineResult<bool> {
        let open = self.engine.open_positions().await?;
        let now = Utc::now();
        let degraded = {
            let tasks = self.tasks.lock().await;
            open.iter().any(|p| {
                if !tasks.contains_key(&p.id) {
                    error!(position_id = %p.id, "Open position has no monitor");
                    return true;
                }
                if p.is_overdue(now) {
                    error!(position_id = %p.id, "Position past planned close");
                    return true;
                }
                false
            })
        };
        if !degraded {
            return Ok(false);
        }
        let restarted = self.restart_all().await?;
        warn!(restarted, "Monitor fleet restarted");
        Ok(true)
    }

    /// Cancel every monitor and respawn one per open position.
    pub async fn restart_all(self: &Arc<Self>) -> EngineResult<usize> {
        {
            let mut tasks = self.tasks.lock().await;
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
        self.resume().await
    }

    /// Position ids currently under a monitor.
    pub async fn watched(&self) -> Vec<Uuid> {
        self.tasks.lock().await.keys().copied().collect()
    }

    /// Cancel every monitor task.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        info!("Monitor supervisor shut down");
    }
}
