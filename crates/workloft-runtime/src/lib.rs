//! Execution primitives for the Workloft SDK
//!
//! Everything here is shared by the network client and the local store:
//!
//! - [`Delivery`]: the single fixed context all settle callbacks run on
//! - [`ListenerSet`] / [`CallbackSet`]: ordered listeners with
//!   consume-to-stop-propagation semantics
//! - [`SerialQueue`]: a single-worker FIFO queue with pause/resume/drain
//! - [`TaskHandle`]: a settle-once, listener-observable unit of work

pub mod callback;
pub mod delivery;
pub mod queue;
pub mod task;

pub use callback::{CallbackSet, ListenerId, ListenerSet};
pub use delivery::Delivery;
pub use queue::SerialQueue;
pub use task::{TaskHandle, TaskState};
