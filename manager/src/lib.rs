//! Deploy Manager Library
//!
//! Orchestrates the build and run phases of deploys: an image build job is
//! scheduled, its progress is followed over the build-event bus, and the
//! workload is scheduled once the image is pushed.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod message;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;
