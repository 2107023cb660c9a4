//! Persistence Layer - 数据持久化
//!
//! SQLite 存储实现：项目、章节、任务队列

pub mod sqlite;
