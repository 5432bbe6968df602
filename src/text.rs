//! Text helpers for narration paragraphs.
//!
//! Sentence splitting and word limits for narration, plus cleanup of LLM
//! replies and article HTML.

use scraper::{ElementRef, Html};

/// Split text into sentences at .!? boundaries.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let end = i + 1;
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }

    // Remainder
    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Break a paragraph into pieces of at most `max_words` words.
///
/// Sentences are kept whole where possible; a single sentence longer than
/// the limit is cut at word boundaries.
pub fn limit_words(text: &str, max_words: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_words = max_words.max(1);
    if word_count(text) <= max_words {
        return vec![collapse_whitespace(text)];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for sentence in split_sentences(text) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if current.len() + words.len() <= max_words {
            current.extend(words);
            continue;
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
            current.clear();
        }
        if words.len() <= max_words {
            current.extend(words);
        } else {
            let mut pieces = words.chunks(max_words).peekable();
            while let Some(piece) = pieces.next() {
                if pieces.peek().is_some() {
                    chunks.push(piece.join(" "));
                } else {
                    current.extend_from_slice(piece);
                }
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Strip a surrounding Markdown code fence (```json ... ```) from an LLM reply.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest.trim_start_matches("json"),
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

/// Collapse runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Preview length for paragraph text in log lines.
pub const LOG_PREVIEW_CHARS: usize = 60;

/// First `max_chars` characters of `text`, on one line, for log output.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = collapse_whitespace(text);
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}...")
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Elements whose content is never shown to a reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Reduce an HTML document to its visible text.
///
/// Comments and the bodies of script-like elements are dropped. Entities are
/// decoded by the parser; whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    collect_text(document.root_element(), &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if HIDDEN_ELEMENTS.contains(&child.value().name()) {
                continue;
            }
            out.push(' ');
            collect_text(child, out);
            out.push(' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("One. Two! Three? Four");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn does_not_split_decimals() {
        let s = split_sentences("Growth was 3.5 percent. Calm night.");
        assert_eq!(s, vec!["Growth was 3.5 percent.", "Calm night."]);
    }

    #[test]
    fn short_paragraph_is_untouched() {
        assert_eq!(limit_words("  A calm   night. ", 10), vec!["A calm night."]);
    }

    #[test]
    fn long_paragraph_splits_at_sentences() {
        let text = "one two three. four five six. seven eight.";
        let chunks = limit_words(text, 6);
        assert_eq!(chunks, vec!["one two three. four five six.", "seven eight."]);
        assert!(chunks.iter().all(|c| word_count(c) <= 6));
    }

    #[test]
    fn overlong_sentence_splits_at_words() {
        let text = "a b c d e f g h i j";
        let chunks = limit_words(text, 4);
        assert_eq!(chunks, vec!["a b c d", "e f g h", "i j"]);
    }

    #[test]
    fn overlong_sentence_tail_merges_with_next() {
        let text = "a b c d e. f g.";
        let chunks = limit_words(text, 4);
        assert_eq!(chunks, vec!["a b c d", "e. f g."]);
    }

    #[test]
    fn empty_paragraph_yields_nothing() {
        assert!(limit_words("   ", 50).is_empty());
    }

    #[test]
    fn strips_json_fence() {
        let reply = "```json\n[\"a\", \"b\"]\n```";
        assert_eq!(strip_code_fence(reply), "[\"a\", \"b\"]");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[test]
    fn preview_truncates_by_chars() {
        assert_eq!(preview("héllo\nwörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
    }

    #[test]
    fn log_preview_keeps_sixty_chars() {
        let text = "a".repeat(80);
        assert_eq!(preview(&text, LOG_PREVIEW_CHARS), format!("{}...", "a".repeat(60)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("日本語のニュース", 3), "日本語");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn html_reduces_to_visible_text() {
        let html = r#"<html><head><title>Quiet</title><style>p { color: red; }</style>
            <script>var x = "<b>";</script></head>
            <body><!-- nav --><p>Rain &amp; wind</p><div>calm&nbsp;tonight</div></body></html>"#;
        assert_eq!(html_to_text(html), "Quiet Rain & wind calm tonight");
    }

    #[test]
    fn html_decodes_numeric_and_named_entities() {
        let html = "<p>The minister&#8217;s plan &mdash; costs &#163;5bn</p>";
        assert_eq!(html_to_text(html), "The minister\u{2019}s plan \u{2014} costs \u{a3}5bn");
    }

    #[test]
    fn html_keeps_text_after_a_bare_angle_bracket() {
        let html = "<p>Inflation fell to 2% as rates < 4% held. Markets calmed.</p><p>Second paragraph.</p>";
        assert_eq!(
            html_to_text(html),
            "Inflation fell to 2% as rates < 4% held. Markets calmed. Second paragraph."
        );
    }

    #[test]
    fn html_handles_uppercase_script() {
        let html = "<P>before</P><SCRIPT>alert(1)</SCRIPT><p>after</p>";
        assert_eq!(html_to_text(html), "before after");
    }
}
