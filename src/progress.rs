// src/progress.rs

//! Install progress reporting
//!
//! The installer reports every state transition and every stage start to a
//! [`StateObserver`]. Implementations:
//! - `LogObserver`: logs to tracing at info level
//! - `SilentObserver`: no-op for embedding and quiet modes
//! - `RecordingObserver`: keeps the transitions in memory

use crate::kitchen::InstallState;
use crate::recipe::Stage;
use std::sync::Mutex;
use tracing::{info, warn};

/// Receives install progress events
///
/// Implementations must be thread-safe: dependencies may install
/// concurrently and report through the same observer.
pub trait StateObserver: Send + Sync {
    /// `package` moved from `from` to `to`
    fn on_transition(&self, package: &str, from: &InstallState, to: &InstallState);

    /// Stage `index` of `package` is about to run
    fn on_stage(&self, _package: &str, _index: usize, _stage: &Stage) {}
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl StateObserver for SilentObserver {
    fn on_transition(&self, _package: &str, _from: &InstallState, _to: &InstallState) {}
}

/// Observer that logs transitions
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StateObserver for LogObserver {
    fn on_transition(&self, package: &str, from: &InstallState, to: &InstallState) {
        match to {
            InstallState::Failed(reason) => warn!("{}: {} -> failed ({})", package, from, reason),
            _ => info!("{}: {} -> {}", package, from, to),
        }
    }
}

/// Observer that records `(package, state)` pairs in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(String, InstallState)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded `(package, new state)` pair
    pub fn events(&self) -> Vec<(String, InstallState)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// States visited by one package, starting with `Pending`
    pub fn states_of(&self, package: &str) -> Vec<InstallState> {
        let mut states = vec![InstallState::Pending];
        states.extend(
            self.events()
                .into_iter()
                .filter(|(name, _)| name == package)
                .map(|(_, state)| state),
        );
        states
    }
}

impl StateObserver for RecordingObserver {
    fn on_transition(&self, package: &str, _from: &InstallState, to: &InstallState) {
        if let Ok(mut events) = self.events.lock() {
            events.push((package.to_string(), to.clone()));
        }
    }
}
