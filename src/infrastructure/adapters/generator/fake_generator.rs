//! Fake Generator - 本地运行用的生成器
//!
//! 不调用外部服务，返回确定性的大纲和正文

use async_trait::async_trait;
use std::time::Duration;

use crate::application::ports::{
    GeneratorError, GeneratorPort, OutlineRequest, SceneDraft, SceneRequest,
};
use crate::domain::count_words;
use crate::domain::outline::SceneDescriptor;

/// Fake Generator 配置
#[derive(Debug, Clone)]
pub struct FakeGeneratorConfig {
    /// 每章场景数
    pub scenes_per_chapter: usize,
    /// 单个场景正文的字数上限（None 表示按场景目标字数）
    pub max_scene_words: Option<u32>,
    /// 模拟调用延迟
    pub latency: Duration,
}

impl Default for FakeGeneratorConfig {
    fn default() -> Self {
        Self {
            scenes_per_chapter: 3,
            max_scene_words: Some(400),
            latency: Duration::from_millis(200),
        }
    }
}

/// Fake Generator
pub struct FakeGenerator {
    config: FakeGeneratorConfig,
}

impl FakeGenerator {
    pub fn new(config: FakeGeneratorConfig) -> Self {
        tracing::info!(
            scenes_per_chapter = config.scenes_per_chapter,
            max_scene_words = ?config.max_scene_words,
            "FakeGenerator initialized"
        );
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeGeneratorConfig::default())
    }

    async fn simulate_latency(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

#[async_trait]
impl GeneratorPort for FakeGenerator {
    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<SceneDescriptor>, GeneratorError> {
        self.simulate_latency().await;

        let count = self.config.scenes_per_chapter.max(1);
        let per_scene = request.target_words / count as u32;
        let scenes = (1..=count)
            .map(|n| {
                let mut scene = SceneDescriptor::new(
                    n as u32,
                    format!("{} - part {}", request.chapter_title, n),
                    per_scene,
                );
                scene.description = request.chapter_summary.clone();
                scene
            })
            .collect();

        tracing::debug!(chapter = request.chapter_number, scenes = count, "FakeGenerator: outline");
        Ok(scenes)
    }

    async fn write_scene(&self, request: &SceneRequest) -> Result<SceneDraft, GeneratorError> {
        self.simulate_latency().await;

        let target = match self.config.max_scene_words {
            Some(max) => request.scene.target_words.min(max),
            None => request.scene.target_words,
        }
        .max(1);

        let opening = format!(
            "Chapter {}, scene {}: {}.",
            request.chapter_number, request.scene.scene_number, request.scene.title
        );
        let mut text = opening;
        while count_words(&text) < target as u64 {
            text.push_str(" The story moves on.");
        }
        let word_count = count_words(&text);

        tracing::debug!(
            chapter = request.chapter_number,
            scene = request.scene.scene_number,
            word_count = word_count,
            "FakeGenerator: scene"
        );
        Ok(SceneDraft { text, word_count })
    }
}
