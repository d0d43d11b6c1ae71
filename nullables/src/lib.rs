//! Nullable infrastructure for deterministic testing.
//!
//! The wallet manager talks to the outside world through two seams: the
//! consensus notifier and the transaction handlers. This crate provides
//! test-friendly implementations of both that
//! - behave deterministically,
//! - record what they were asked to do,
//! - can be told to fail at a chosen call.
//!
//! [`ChainBuilder`] produces consecutive blocks with a [`NullClock`].

pub mod chain;
pub mod clock;
pub mod handler;
pub mod notifier;

pub use chain::ChainBuilder;
pub use clock::NullClock;
pub use handler::ScriptedHandler;
pub use notifier::{NullNotifier, RecordedEffect, RecordingNotifier};
