//! Language detection and language-aware chunking
use crate::filtering::{char_len, normalize};
use whatlang::Lang;

/// Characters inspected by [`detect_language`]
const LANGUAGE_SAMPLE_CHARS: usize = 1000;

/// Sentences end at any run of `.`, `!` or `?`
fn sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(|s| s.trim().to_string())
        .collect()
}

/// Paragraphs are separated by blank or whitespace-only lines
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                out.push(normalize(&lines.join("\n")));
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        out.push(normalize(&lines.join("\n")));
    }
    out
}

/// Two-letter code for the languages the collection is likely to hold,
/// ISO 639-3 for the rest
fn language_code(lang: Lang) -> &'static str {
    match lang {
        Lang::Cmn => "zh",
        Lang::Eng => "en",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Spa => "es",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Rus => "ru",
        other => other.code(),
    }
}

/// Guess the document language from its first characters
///
/// `"unknown"` when the sample is under 10 characters or has no detectable
/// script.
pub fn detect_language(text: &str) -> &'static str {
    let sample: String = text.chars().take(LANGUAGE_SAMPLE_CHARS).collect();
    if char_len(sample.trim()) < 10 {
        return "unknown";
    }

    whatlang::detect(&sample)
        .map(|info| language_code(info.lang()))
        .unwrap_or("unknown")
}

/// Split `text` into chunks of roughly `chunk_size` characters
///
/// English text is packed sentence by sentence (each re-terminated with
/// `". "`); everything else paragraph by paragraph, whitespace collapsed and
/// joined with blank lines. A single unit longer than `chunk_size` becomes its
/// own chunk.
pub fn chunk_text(text: &str, language: &str, chunk_size: usize) -> Vec<String> {
    let (units, separator) = if language == "en" {
        (sentences(text), ". ")
    } else {
        (paragraphs(text), "\n\n")
    };

    let mut chunks = Vec::new();
    let mut current = String::new();

    for unit in units.iter().filter(|u| !u.is_empty()) {
        if char_len(&current) + char_len(unit) > chunk_size && !current.is_empty() {
            chunks.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(unit);
        current.push_str(separator);
    }

    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }
    chunks
}

/// Stable record id: 16 hex chars of BLAKE3 over the chunk's coordinates
pub fn record_id(category: &str, filename: &str, language: &str, chunk_index: usize) -> String {
    let key = format!("{}_{}_{}_{}", category, filename, language, chunk_index);
    let hex = blake3::hash(key.as_bytes()).to_hex();
    hex.as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("short"), "unknown");
        assert_eq!(
            detect_language("面肩肱型肌营养不良症是一种常见的遗传性肌肉疾病。"),
            "zh"
        );
        assert_eq!(
            detect_language(
                "Facioscapulohumeral muscular dystrophy is one of the most common inherited \
                 muscle diseases in adults, and it usually starts in the face and shoulders."
            ),
            "en"
        );
        assert_eq!(
            detect_language("FSHD（面肩肱型肌营养不良症）的 D4Z4 重复序列缩短"),
            "zh"
        );
        assert_eq!(detect_language("1234567890 ---- 12345"), "unknown");
    }

    #[test]
    fn test_english_chunking_packs_sentences() {
        let text = "First sentence here. Second one! Third?? Fourth.";
        let chunks = chunk_text(text, "en", 32);
        assert_eq!(
            chunks,
            vec!["First sentence here. Second one.", "Third. Fourth."]
        );
    }

    #[test]
    fn test_paragraph_chunking() {
        let text = "第一段 内容\n继续\n\n  第二段   内容  \n \n第三段";
        let chunks = chunk_text(text, "zh", 100);
        assert_eq!(chunks, vec!["第一段 内容 继续\n\n第二段 内容\n\n第三段"]);

        let chunks = chunk_text(text, "unknown", 8);
        assert_eq!(chunks, vec!["第一段 内容 继续", "第二段 内容", "第三段"]);
    }

    #[test]
    fn test_oversized_unit_is_its_own_chunk() {
        let long = "x".repeat(50);
        let text = format!("a\n\n{}\n\nb", long);
        let chunks = chunk_text(&text, "zh", 10);
        assert_eq!(chunks, vec!["a".to_string(), long, "b".to_string()]);
    }

    #[test]
    fn test_record_id_is_stable_and_short() {
        let a = record_id("genetics", "d4z4.txt", "en", 0);
        assert_eq!(a.len(), 16);
        assert_eq!(a, record_id("genetics", "d4z4.txt", "en", 0));
        assert_ne!(a, record_id("genetics", "d4z4.txt", "en", 1));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
