//! Plain-text answer preview
//!
//! The downstream chat service replaces this with a model-written answer;
//! the preview only lists what was retrieved.

use super::Candidate;
use crate::filtering::truncate_chars;

pub const EMPTY_QUESTION_ANSWER: &str = "请输入问题。";

pub const NO_RESULTS_ANSWER: &str = "抱歉，在知识库中没有找到直接相关的信息。\n\
建议你换一种问法（更具体一点），比如：\n\
• 你想问的是“遗传方式/症状/治疗/康复/检查/生活注意事项”的哪一类？\n\
• 症状持续多久、部位、严重程度、是否影响日常活动？\n\
（这不是医疗诊断，请咨询专业医生。）";

const PREVIEW_ITEMS: usize = 5;
const PREVIEW_CHARS: usize = 220;

/// Compose the preview for `question` from the selected passages
pub fn compose(question: &str, selected: &[Candidate]) -> String {
    if selected.is_empty() {
        return NO_RESULTS_ANSWER.to_string();
    }

    let mut parts = vec![format!(
        "根据知识库检索，关于“{}”可能相关的资料片段：\n",
        question
    )];

    for (idx, chunk) in selected.iter().take(PREVIEW_ITEMS).enumerate() {
        let (head, truncated) = truncate_chars(&chunk.content, PREVIEW_CHARS);
        let ellipsis = if truncated { "..." } else { "" };
        parts.push(format!("{}. {}{}", idx + 1, head, ellipsis));
    }

    parts.push("\n---".to_string());
    parts.push("提示：上面只是检索到的资料片段预览；最终解读仍需结合医生建议。".to_string());
    parts.push("（这不是医疗诊断，请咨询专业医生。）".to_string());
    parts.join("\n")
}
