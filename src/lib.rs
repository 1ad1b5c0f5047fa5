//! Offline-first upload queue for field-captured media.
//!
//! Field operators capture photos and signatures on devices with unreliable
//! connectivity. This library stages every capture in durable local storage
//! together with an upload intent, and replays pending intents against the
//! remote collector whenever connectivity returns, so a capture never fails
//! just because the network is down at capture time.

pub mod config;
pub mod models;
pub mod services;
