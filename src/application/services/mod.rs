//! 应用服务 - 两个驱动器共用的编排步骤

mod aggregator;
mod launcher;
mod planner;
mod stage;

pub use aggregator::{AggregateOutcome, ProgressAggregator};
pub use launcher::LeasedLauncher;
pub use planner::JobPlanner;
pub use stage::{outline_request, scene_request};
