//! 提示词构造

use crate::application::ports::{OutlineRequest, SceneRequest};

pub(super) const OUTLINE_SYSTEM: &str = "You are a novelist planning a chapter. \
Reply with JSON only: an object with a \"scenes\" array. Each scene has scene_number, title, \
point_of_view, location, time, description, key_events (array of strings), emotional_arc \
and target_words.";

pub(super) const SCENE_SYSTEM: &str = "You are a novelist writing one scene of a longer book. \
Reply with the scene prose only, no headings and no commentary.";

pub(super) fn outline_prompt(request: &OutlineRequest) -> String {
    format!(
        "Book: {}\nGenre: {}\nChapter {}: {}\nSummary: {}\n\
         Plan this chapter as a sequence of scenes totalling about {} words.",
        request.project_title,
        request.genre,
        request.chapter_number,
        request.chapter_title,
        request.chapter_summary,
        request.target_words,
    )
}

pub(super) fn scene_prompt(request: &SceneRequest) -> String {
    let scene = &request.scene;
    let mut prompt = format!(
        "Book: {}\nGenre: {}\nChapter {}: {}\n\nScene {}: {}\n",
        request.project_title,
        request.genre,
        request.chapter_number,
        request.chapter_title,
        scene.scene_number,
        scene.title,
    );
    if !scene.point_of_view.is_empty() {
        prompt.push_str(&format!("Point of view: {}\n", scene.point_of_view));
    }
    if !scene.location.is_empty() {
        prompt.push_str(&format!("Location: {}\n", scene.location));
    }
    if !scene.time.is_empty() {
        prompt.push_str(&format!("Time: {}\n", scene.time));
    }
    if !scene.description.is_empty() {
        prompt.push_str(&format!("Description: {}\n", scene.description));
    }
    if !scene.key_events.is_empty() {
        prompt.push_str("Key events:\n");
        for event in &scene.key_events {
            prompt.push_str(&format!("- {}\n", event));
        }
    }
    if !scene.emotional_arc.is_empty() {
        prompt.push_str(&format!("Emotional arc: {}\n", scene.emotional_arc));
    }
    prompt.push_str(&format!("Length: about {} words.\n", scene.target_words));

    if !request.previous_text.is_empty() {
        prompt.push_str("\nThe chapter so far ends with:\n");
        prompt.push_str(&request.previous_text);
        prompt.push_str("\n\nContinue seamlessly from there.");
    }
    prompt
}
