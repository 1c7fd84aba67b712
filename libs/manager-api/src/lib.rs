//! Deploy manager HTTP API models

pub mod models;
