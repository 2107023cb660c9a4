//! Self-Trigger Adapters
//!
//! - LocalTrigger: 进程内 mpsc 通道，由 TickDispatcher 消费
//! - HttpTrigger: 向 worker tick 端点发起即发即弃的 POST

mod http_trigger;
mod local_trigger;

pub use http_trigger::{HttpTrigger, HttpTriggerConfig, TickRequest};
pub use local_trigger::{local_trigger_channel, LocalTrigger, Tick};
