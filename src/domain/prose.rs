//! 正文文本工具
//!
//! 字数统计、场景拼接与上下文截取

/// 场景之间的分隔
pub const SCENE_SEPARATOR: &str = "\n\n";

/// 默认上下文截取长度（字符）
pub const DEFAULT_CONTEXT_CHARS: usize = 2000;

/// 统计字数
///
/// 以空白分词；CJK 字符每个计一个字
pub fn count_words(text: &str) -> u64 {
    let mut count = 0u64;
    let mut in_word = false;

    for ch in text.chars() {
        if is_cjk(ch) {
            count += 1;
            in_word = false;
        } else if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }

    count
}

#[inline]
fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// 生成追加到章节正文的片段
///
/// 累加器只做纯拼接，分隔符由调用方放进新文本：
/// 第一个场景不加前缀，之后的场景前加空行
pub fn scene_fragment(scene_index: usize, prose: &str) -> String {
    let prose = prose.trim();
    if scene_index == 0 {
        prose.to_string()
    } else {
        format!("{}{}", SCENE_SEPARATOR, prose)
    }
}

/// 截取章节末尾的上下文，供下一个场景衔接
pub fn context_tail(content: &str, max_chars: usize) -> &str {
    let total = content.chars().count();
    if total <= max_chars {
        return content;
    }
    let skip = total - max_chars;
    match content.char_indices().nth(skip) {
        Some((offset, _)) => &content[offset..],
        None => "",
    }
}
