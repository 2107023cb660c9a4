//! SQLite Persistence - SQLite 数据库持久化实现

mod chapter_repo;
mod database;
mod lease_store;
mod project_repo;
mod timestamp;

pub use chapter_repo::*;
pub use database::*;
pub use lease_store::*;
pub use project_repo::SqliteProjectRepository;
