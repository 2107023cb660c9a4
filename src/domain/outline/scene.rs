//! Outline Context - Scene Descriptor

use serde::{Deserialize, Serialize};

/// 场景状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    #[default]
    Pending,
    Written,
    Failed,
}

/// 场景描述 - 单个正文生成单元的结构化计划
///
/// 不变量:
/// - 由大纲生成产出，之后不可变
/// - 只被一个场景写作任务消费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    #[serde(default)]
    pub scene_number: u32,
    pub title: String,
    #[serde(default, alias = "pov")]
    pub point_of_view: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_events: Vec<String>,
    #[serde(default)]
    pub emotional_arc: String,
    #[serde(default)]
    pub target_words: u32,
    #[serde(default)]
    pub status: SceneStatus,
}

impl SceneDescriptor {
    /// 构造最小场景描述（测试与 Fake 生成器使用）
    pub fn new(scene_number: u32, title: impl Into<String>, target_words: u32) -> Self {
        Self {
            scene_number,
            title: title.into(),
            point_of_view: String::new(),
            location: String::new(),
            time: String::new(),
            description: String::new(),
            key_events: Vec::new(),
            emotional_arc: String::new(),
            target_words,
            status: SceneStatus::Pending,
        }
    }

    /// 渲染为提示词片段，供场景写作请求使用
    pub fn to_brief(&self) -> String {
        let mut brief = format!("Scene {}: {}\n", self.scene_number, self.title);
        let fields = [
            ("Point of view", &self.point_of_view),
            ("Location", &self.location),
            ("Time", &self.time),
            ("Description", &self.description),
            ("Emotional arc", &self.emotional_arc),
        ];
        for (label, value) in fields {
            if !value.is_empty() {
                brief.push_str(&format!("{}: {}\n", label, value));
            }
        }
        if !self.key_events.is_empty() {
            brief.push_str("Key events:\n");
            for event in &self.key_events {
                brief.push_str(&format!("- {}\n", event));
            }
        }
        brief.push_str(&format!("Target length: {} words\n", self.target_words));
        brief
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_pov_alias_and_defaults() {
        let json = r#"{"title": "Arrival", "pov": "Mara", "key_events": ["storm"]}"#;
        let scene: SceneDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(scene.title, "Arrival");
        assert_eq!(scene.point_of_view, "Mara");
        assert_eq!(scene.key_events, vec!["storm".to_string()]);
        assert_eq!(scene.status, SceneStatus::Pending);
        assert_eq!(scene.target_words, 0);
    }

    #[test]
    fn test_brief_skips_empty_fields() {
        let mut scene = SceneDescriptor::new(2, "The Letter", 800);
        scene.location = "Harbor".to_string();

        let brief = scene.to_brief();
        assert!(brief.starts_with("Scene 2: The Letter"));
        assert!(brief.contains("Location: Harbor"));
        assert!(!brief.contains("Point of view"));
        assert!(brief.contains("Target length: 800 words"));
    }
}
