//! Cluster scheduler wire models

pub mod models;
