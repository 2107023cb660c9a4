//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod generator;
pub mod notifier;
pub mod trigger;

pub use generator::*;
pub use notifier::*;
pub use trigger::*;
