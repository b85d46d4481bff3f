// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Consolidation Task Engine
//!
//! Sweeps balances from custodial accounts into configured collection
//! addresses on a timer.
//!
//! - [`task_store`]: the active task and its reset/append/remove edits
//! - [`precheck`]: validation and setting hydration before activation
//! - [`executor`]: one sweep pass over the active task
//! - [`scheduler`]: the single periodic timer driving the executor

pub mod executor;
pub mod precheck;
pub mod scheduler;
pub mod task_store;

pub use executor::{Executor, SweepError, TickReport, WINDOW_SIZE};
pub use precheck::{hydrate_and_validate, PrecheckError};
pub use scheduler::Scheduler;
pub use task_store::TaskStore;
