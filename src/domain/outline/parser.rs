//! 大纲解析器
//!
//! 生成服务返回的大纲可能是裸 JSON 数组、`{"scenes": [...]}` 对象，
//! 也可能被包在 Markdown 代码块里。解析后统一重新编号并补齐目标字数。

use serde::Deserialize;

use super::{OutlineParseError, SceneDescriptor, SceneStatus};

#[derive(Deserialize)]
#[serde(untagged)]
enum OutlinePayload {
    List(Vec<SceneDescriptor>),
    Wrapped { scenes: Vec<SceneDescriptor> },
}

/// 去掉 Markdown 代码块围栏
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过语言标记（如 ```json）
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// 解析场景大纲
///
/// # 参数
/// - `raw` - 生成服务返回的原始文本
/// - `chapter_target_words` - 章节目标字数，用于补齐未给出 target_words 的场景
///
/// # 返回
/// 按叙事顺序排列、scene_number 从 1 连续编号的场景列表
pub fn parse_scene_outline(
    raw: &str,
    chapter_target_words: u32,
) -> Result<Vec<SceneDescriptor>, OutlineParseError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(OutlineParseError::Empty);
    }

    let payload: OutlinePayload = serde_json::from_str(body)
        .map_err(|e| OutlineParseError::InvalidJson(e.to_string()))?;
    let mut scenes = match payload {
        OutlinePayload::List(scenes) => scenes,
        OutlinePayload::Wrapped { scenes } => scenes,
    };

    if scenes.is_empty() {
        return Err(OutlineParseError::NoScenes);
    }

    let fallback_words = chapter_target_words / scenes.len() as u32;
    for (index, scene) in scenes.iter_mut().enumerate() {
        scene.title = scene.title.trim().to_string();
        if scene.title.is_empty() {
            return Err(OutlineParseError::MissingTitle { index });
        }
        scene.scene_number = index as u32 + 1;
        scene.status = SceneStatus::Pending;
        if scene.target_words == 0 {
            scene.target_words = fallback_words;
        }
    }

    Ok(scenes)
}
