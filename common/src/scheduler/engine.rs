// Scheduler engine: evaluates cadence rules on a fixed tick

use crate::config::SchedulerConfig;
use crate::models::Cadence;
use crate::runner::JobTrigger;
use crate::schedule::CadenceRule;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

/// Scheduler trait for digest scheduling operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start the tick loop; returns once stopped
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the scheduler gracefully
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Fire every rule that became due since the previous evaluation
    async fn process_due_rules(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

/// A rule together with the instant it was last evaluated up to
struct ArmedRule {
    rule: CadenceRule,
    cursor: DateTime<Utc>,
}

pub struct SchedulerEngine {
    config: SchedulerConfig,
    rules: Mutex<Vec<ArmedRule>>,
    trigger: Arc<dyn JobTrigger>,
    stopped: AtomicBool,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl SchedulerEngine {
    pub fn new(config: SchedulerConfig, trigger: Arc<dyn JobTrigger>) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            rules: Mutex::new(Vec::new()),
            trigger,
            stopped: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Register rules; only instants strictly after `armed_at` can fire
    pub fn arm(&self, rules: Vec<CadenceRule>, armed_at: DateTime<Utc>) {
        let mut armed = self.lock_rules();
        for rule in rules {
            info!(
                cadence = %rule.cadence(),
                expression = rule.expression(),
                next = ?rule.next_after(armed_at),
                "Rule armed"
            );
            armed.push(ArmedRule {
                rule,
                cursor: armed_at,
            });
        }
    }

    pub fn rule_count(&self) -> usize {
        self.lock_rules().len()
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Evaluate all rules at `now` and trigger the due ones
    ///
    /// Each rule fires at most once per evaluation, however many of its
    /// instants were missed. Cursors never move backwards, so a clock that
    /// jumps back cannot fire an instant twice.
    pub fn evaluate_at(&self, now: DateTime<Utc>) -> Vec<Cadence> {
        let mut due = Vec::new();

        {
            let mut armed = self.lock_rules();
            for entry in armed.iter_mut() {
                if now <= entry.cursor {
                    continue;
                }
                if let Some(instant) = entry.rule.due_between(entry.cursor, now) {
                    debug!(cadence = %entry.rule.cadence(), scheduled = %instant, "Rule due");
                    due.push(entry.rule.cadence());
                }
                entry.cursor = now;
            }
        }

        for cadence in &due {
            info!(cadence = %cadence, "Triggering scheduled digest");
            self.trigger.trigger(*cadence);
        }

        due
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<ArmedRule>> {
        // A poisoned lock only means a panic mid-evaluation; cursors stay valid
        self.rules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            tick_seconds = self.config.tick_seconds,
            rules = self.rule_count(),
            "Starting scheduler engine"
        );

        let mut tick = interval(Duration::from_secs(self.config.tick_seconds));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_receiver();

        if self.stopped.load(Ordering::SeqCst) {
            info!("Scheduler stopped before start");
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.process_due_rules().await {
                        Ok(count) if count > 0 => info!(fired = count, "Processed due rules"),
                        Ok(_) => debug!("No rules due"),
                        Err(e) => error!(error = %e, "Error processing due rules"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        info!("Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Stopping scheduler engine");
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        Ok(())
    }

    async fn process_due_rules(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.evaluate_at(Utc::now()).len())
    }
}
