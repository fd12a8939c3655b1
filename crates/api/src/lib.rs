//! HTTP API: routing and request/response mapping over the reconciliation engine.

pub mod app;
