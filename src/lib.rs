// src/lib.rs

//! formulary: a declarative install-recipe executor
//!
//! A recipe names a package, its source archive and SHA-256, the packages
//! it depends on, and an ordered list of configure/build/install stages
//! plus an optional test stage. formulary resolves the dependencies,
//! fetches and verifies the source, runs the stages and records the
//! install.
//!
//! # Architecture
//!
//! - `recipe`: parsing and validation of recipe files
//! - `fetch`: checksum-keyed download cache and archive unpacking
//! - `resolver`: dependency graph walk and dependencies-first install
//! - `kitchen`: stage execution, tests and the install state machine

pub mod config;
mod error;
pub mod fetch;
pub mod hash;
pub mod kitchen;
pub mod progress;
pub mod recipe;
pub mod resolver;

pub use config::Config;
pub use error::{Error, Result};
pub use hash::{Checksum, Hasher};
pub use kitchen::{InstallOptions, InstallReport, InstallState, Installer};
pub use progress::{LogObserver, RecordingObserver, SilentObserver, StateObserver};
pub use recipe::{Recipe, Stage, StageKind};
