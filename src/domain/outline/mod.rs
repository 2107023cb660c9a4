//! Outline Context - 场景大纲限界上下文
//!
//! 职责:
//! - 场景描述（Scene Descriptor）值对象
//! - 生成服务返回的大纲文本解析与校验

mod errors;
mod parser;
mod scene;

pub use errors::OutlineParseError;
pub use parser::parse_scene_outline;
pub use scene::{SceneDescriptor, SceneStatus};
