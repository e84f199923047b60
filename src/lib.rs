//! Aviator Round Predictor
//!
//! Ingests round results from the upstream game feed, issues a heuristic
//! forecast for the next round and serves state, history and accuracy over a
//! small read-only HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! Feed (WebSocket) → SessionCoordinator → Engine (forecast) → Snapshot → Query API
//!                           ↓      ↑
//!                 AccuracyTracker  ResultHistory
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod history;
pub mod session;
pub mod tracker;
pub mod types;
