//! # rnetdiag - Network Device Session & Diagnostic Workflow Engine
//!
//! `rnetdiag` opens interactive SSH shells on routers and switches, runs
//! vendor-aware diagnostic command sequences and turns the raw CLI output
//! into typed, severity-ranked findings.
//!
//! ## Features
//!
//! - **Session Registry**: At most one live session per device, reused across calls
//! - **Retry Policy**: Timeouts and transport errors are retried, authentication failures are not
//! - **Liveness Checks**: Cached sessions are probed before use and evicted when stale
//! - **Vendor Profiles**: Cisco, Juniper, HP, Huawei, MikroTik and Aruba prompt/paging handling
//! - **Diagnostic Workflows**: Interface, CPU/memory, connectivity and log analyzers
//! - **Bounded Batches**: Connect or diagnose many devices with a fixed worker pool
//! - **Session Recording**: JSONL transcripts that can be replayed offline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rnetdiag::config::EngineConfig;
//! use rnetdiag::device::{Credentials, Device, InMemoryCredentials};
//! use rnetdiag::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = InMemoryCredentials::new()
//!         .with("lab", Credentials::new("admin", "password").with_enable("secret"));
//!     let engine = Engine::ssh(EngineConfig::default(), Arc::new(credentials))?;
//!
//!     let mut device = Device::new("192.168.1.1")
//!         .with_vendor("Cisco")
//!         .with_credential("lab");
//!
//!     if engine.connect(&mut device).await {
//!         let result = engine.run_workflow(&device, "interface_health").await;
//!         println!("{}: {}", result.overall_severity(), result.summary);
//!         engine.disconnect(&mut device).await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::SessionManager`] - Per-device session lifecycle
//! - [`executor::CommandExecutor`] - Command execution over live sessions
//! - [`diagnostics::DiagnosticEngine`] - Workflow runs and output analyzers
//! - [`engine::Engine`] - Facade with batch helpers
//! - [`error::ConnectError`] - Error types and their retry classes
//! - [`config`] - Engine configuration and SSH algorithm lists

pub mod batch;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod executor;
pub mod prompt;
pub mod session;
pub mod vendor;
