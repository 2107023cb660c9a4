//! Generator Adapter - 生成式文本服务客户端

mod fake_generator;
mod http_generator_client;
mod prompts;

pub use fake_generator::{FakeGenerator, FakeGeneratorConfig};
pub use http_generator_client::*;
