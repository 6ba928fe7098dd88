//! The Rust SDK for Molasses, a feature flag and experimentation platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that decides whether a feature is active for a [`User`].
//! Each user has an id and a set of string params that segments constrain on. The client keeps a
//! local copy of the [`FeatureCatalog`], refreshed by a background thread, so evaluation is
//! in-memory and never blocks on the network.
//!
//! Percentage rollouts are deterministic: the same user always lands on the same side of a
//! rollout for a given feature, across processes and restarts.
//!
//! Evaluations and experiment successes are reported to Molasses in the background. Sending events
//! can be disabled with [`ClientConfig::send_events`].
//!
//! ```no_run
//! use molasses::{ClientConfig, User};
//!
//! let client = ClientConfig::from_api_key("api-key").init()?;
//!
//! let user = User::new("user-1").with_param("country", "us");
//! if client.is_active("NEW_CHECKOUT", Some(&user)) {
//!     // ...
//! }
//!
//! client.stop();
//! # Ok::<(), molasses::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Only [`ClientConfig::init`] returns errors to the
//! caller: evaluation never fails and returns `false` when it cannot decide. Errors that happen in
//! the background are logged and can be observed with a [`DiagnosticHook`].
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `molasses` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the `demos` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod background;
mod catalog;
mod client;
mod config;
mod configuration_fetcher;
mod configuration_store;
mod diagnostics;
mod error;
mod eval;
mod event_dispatcher;
mod events;
mod poller;
mod rules;
mod sharder;
mod user;

pub use catalog::{
    ConstraintMode, ConstraintValues, Feature, FeatureCatalog, Segment, SegmentType,
    UserConstraint,
};
pub use client::Client;
pub use config::ClientConfig;
pub use diagnostics::DiagnosticHook;
pub use error::{Error, Result};
pub use event_dispatcher::EventStats;
pub use events::{EvaluationEvent, Event, ExperimentResult, ExperimentSuccessEvent};
pub use rules::Operator;
pub use user::{User, UserParams};
