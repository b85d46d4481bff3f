// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Periodic consolidation timer.
//!
//! At most one timer runs at a time. A started timer ticks once right away
//! and then every `interval` until stopped. Stopping never interrupts a tick
//! in flight; it only prevents the next one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::executor::Executor;

struct RunningTimer {
    interval: Duration,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningTimer {
    fn is_live(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.handle.is_finished()
    }
}

pub struct Scheduler {
    executor: Arc<Executor>,
    timer: Mutex<Option<RunningTimer>>,
}

impl Scheduler {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            timer: Mutex::new(None),
        }
    }

    /// Start the timer. Returns `false` if one is already running, in which
    /// case its interval is left unchanged.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = timer.as_ref() {
            if running.is_live() {
                info!(
                    interval_secs = running.interval.as_secs(),
                    "Consolidation timer already running"
                );
                return false;
            }
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_timer(
            self.executor.clone(),
            interval,
            shutdown.clone(),
        ));
        *timer = Some(RunningTimer {
            interval,
            shutdown,
            handle,
        });
        true
    }

    /// Stop the timer. Returns `false` if none was running.
    pub fn stop(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        match timer.take() {
            Some(running) => {
                let was_live = running.is_live();
                running.shutdown.cancel();
                was_live
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(RunningTimer::is_live)
    }
}

async fn run_timer(executor: Arc<Executor>, interval: Duration, shutdown: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Consolidation timer started");

    loop {
        executor.run_tick().await;

        if shutdown.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = shutdown.cancelled() => break,
        }
    }

    info!("Consolidation timer stopped");
}
