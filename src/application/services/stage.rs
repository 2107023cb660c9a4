//! 生成请求构造

use crate::application::ports::{ChapterRecord, OutlineRequest, ProjectRecord, SceneRequest};
use crate::domain::outline::SceneDescriptor;
use crate::domain::{context_tail, DEFAULT_CONTEXT_CHARS};

/// 未指定章节目标字数时的兜底值
const FALLBACK_CHAPTER_WORDS: u64 = 3000;

/// 章节目标字数：显式值优先，否则按项目目标均分
fn chapter_target_words(project: &ProjectRecord, chapter_total: usize, chapter: &ChapterRecord) -> u32 {
    let words = match chapter.target_word_count {
        Some(words) if words > 0 => words,
        _ if chapter_total > 0 && project.target_word_count > 0 => {
            project.target_word_count / chapter_total as u64
        }
        _ => FALLBACK_CHAPTER_WORDS,
    };
    u32::try_from(words).unwrap_or(u32::MAX)
}

/// 构造章节大纲请求
///
/// `position` 是章节在项目中的 0 基位置
pub fn outline_request(
    project: &ProjectRecord,
    chapter: &ChapterRecord,
    position: usize,
    chapter_total: usize,
) -> OutlineRequest {
    OutlineRequest {
        project_title: project.title.clone(),
        genre: project.genre.clone(),
        chapter_number: position + 1,
        chapter_title: chapter.title.clone(),
        chapter_summary: chapter.summary.clone(),
        target_words: chapter_target_words(project, chapter_total, chapter),
    }
}

/// 构造场景正文请求，带上章节已有正文的末尾作衔接
pub fn scene_request(
    project: &ProjectRecord,
    chapter: &ChapterRecord,
    position: usize,
    scene: &SceneDescriptor,
) -> SceneRequest {
    SceneRequest {
        project_title: project.title.clone(),
        genre: project.genre.clone(),
        chapter_number: position + 1,
        chapter_title: chapter.title.clone(),
        scene: scene.clone(),
        previous_text: context_tail(&chapter.content, DEFAULT_CONTEXT_CHARS).to_string(),
    }
}
