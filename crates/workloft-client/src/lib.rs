//! Typed asynchronous client for the Workloft content-management API
//!
//! The client dispatches requests off the caller's context and hands back
//! [`RequestTask`] handles to attach result/error/session listeners to.
//!
//! ## Features
//!
//! - **Queue pair**: ordinary traffic on a main FIFO queue, auth
//!   exchanges on a dedicated refresh queue
//! - **Transparent re-authentication**: expired-session failures trigger
//!   a single refresh exchange and a one-shot replay
//! - **Listener bubbling**: per-task listeners first, then the client's
//!   global registry, with consume-to-stop semantics
//! - **Injectable session**: [`SessionStore`] is shared state passed into
//!   the client, not a process-wide global

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod provider;
pub mod retry;
pub mod session;
pub mod task;

pub use callback::GlobalRegistry;
pub use client::Client;
pub use config::{ClientConfig, RequestOptions};
pub use error::{ApiError, ClientError, ErrorRequest, Result};
pub use filter::Filter;
pub use provider::Provider;
pub use retry::RetryConfig;
pub use session::{Session, SessionStore};
pub use task::RequestTask;

/// Re-export commonly used types
pub use reqwest::Method;
pub use workloft_runtime::{ListenerId, TaskState};
