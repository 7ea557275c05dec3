//! The Rust SDK for Schematic, a billing and feature-entitlement platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that evaluates feature flag values for an
//! [`EvaluationContext`] (named company/user key groups identifying *who* flags are
//! evaluated for) and records analytics events (`identify`/`track`) against the same
//! context.
//!
//! Two evaluation modes are supported:
//!
//! - **REST mode** (default): [`Client::check_flag`] issues a one-shot HTTP check per
//!   call, carrying the current context in the request body.
//! - **WebSocket mode** ([`ClientConfig::use_websocket`]): [`Client::set_context`] sends
//!   the context over a persistent connection and resolves once the server's first flag
//!   snapshot for it has been cached. Flag reads ([`Client::flag_value`],
//!   [`Client::flag_check`]) are then synchronous cache lookups, kept fresh by server
//!   pushes, and consumers can subscribe to changes ([`Client::on_flag_value`],
//!   [`Client::on_flag_check`], [`Client::on_pending_change`]) instead of polling. The
//!   listener registry is the seam UI bindings build their reactive adapters on.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum, but flag evaluation never surfaces
//! them: [`Client::check_flag`] and the cache reads degrade to fallback values so
//! rendering never crashes on flag evaluation. [`Client::set_context`] is the one
//! operation that reports failures (including a configurable
//! [timeout](ClientConfig::set_context_timeout) waiting for the first snapshot).
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod anonymous_id;
mod api;
mod client;
mod config;
mod context;
mod error;
mod events;
mod flag_store;
mod flags;
mod listeners;
mod timestamp;
mod websocket;

pub use anonymous_id::{MemoryStoragePersister, StoragePersister};
pub use client::Client;
pub use config::ClientConfig;
pub use context::{ContextKeys, EvaluationContext};
pub use error::{Error, Result};
pub use events::{
    CompanyIdentify, Event, EventBody, EventType, IdentifyBody, TrackBody, TraitValue, Traits,
};
pub use flags::FlagCheckResult;
pub use listeners::ListenerHandle;
pub use timestamp::Timestamp;
