//! Longform - 长篇小说生成编排服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Outline Context: 场景大纲解析与校验
//! - Scheduling Context: 失败分类、重试退避、任务排序、完成判定
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Repositories, LeaseStore, Generator, Notifier, SelfTrigger, Clock）
//! - Commands: 开始 / 暂停 / 恢复 / 取消
//! - Queries: 项目进度
//! - Services: 任务规划与进度汇总
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: 生成控制与 worker tick API
//! - Worker: 租约 Worker、顺序驱动器、触发分发、租约清扫
//! - Persistence: SQLite 存储
//! - Adapters: Generator Client, Notifier, Self-Trigger

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub mod test_support;

pub use config::{load_config, AppConfig};
