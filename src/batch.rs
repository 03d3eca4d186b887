//! Loading prompts from files and packing them into embedding batches.
//!
//! Prompt files are plain text (one prompt per line) or JSON/JSONL. Embedding
//! requests accept several inputs at once, so tracked texts are packed into
//! batches under a per-request token ceiling before they become tasks.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QueueError, Result};
use crate::utils::tokens::estimate_tokens;

/// Token ceiling for a single embeddings request.
pub const MAX_EMBEDDING_BATCH_TOKENS: u64 = 8_192;

/// A text with its own identity and token estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedText {
    pub id: String,
    pub text: String,
    pub num_tokens: u64,
}

impl TrackedText {
    /// Wraps `text`, estimating its tokens.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            num_tokens: estimate_tokens(&text),
            text,
        }
    }
}

/// Texts sent together in one embeddings request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingsBatch {
    /// Sum of the members' estimates.
    pub num_tokens: u64,
    pub prompts: Vec<TrackedText>,
}

impl EmbeddingsBatch {
    fn push(&mut self, item: TrackedText) {
        self.num_tokens = self.num_tokens.saturating_add(item.num_tokens);
        self.prompts.push(item);
    }
}

/// Greedily packs `items` in order into batches of at most `max_tokens`.
///
/// A new batch starts whenever the next item would push the current one over
/// the ceiling. An item that alone exceeds the ceiling gets a batch of its own.
pub fn pack_batches(
    items: impl IntoIterator<Item = TrackedText>,
    max_tokens: u64,
) -> Vec<EmbeddingsBatch> {
    let mut batches: Vec<EmbeddingsBatch> = Vec::new();

    for item in items {
        match batches.last_mut() {
            Some(current)
                if !current.prompts.is_empty()
                    && current.num_tokens.saturating_add(item.num_tokens) <= max_tokens =>
            {
                current.push(item);
            }
            _ => {
                let mut batch = EmbeddingsBatch::default();
                batch.push(item);
                batches.push(batch);
            }
        }
    }

    batches
}

/// How a prompt file encodes its prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFormat {
    /// One prompt per line.
    Lines,
    /// One JSON value per line: a string or `{"prompt": ...}`.
    JsonLines,
}

impl PromptFormat {
    /// `.json` and `.jsonl` files are JSON lines; anything else is plain lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("jsonl") => {
                Self::JsonLines
            }
            _ => Self::Lines,
        }
    }
}

/// Extracts prompts from file content.
///
/// Blank lines and `#` comments are skipped in both formats. JSON lines that
/// are neither a string nor a prompt object, or that hold only whitespace,
/// are dropped.
pub fn parse_prompts(content: &str, format: PromptFormat) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match format {
            PromptFormat::Lines => Some(line.to_string()),
            PromptFormat::JsonLines => json_prompt(line),
        })
        .collect()
}

/// Reads and parses a prompt file, picking the format from its extension.
pub fn load_prompts(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            QueueError::NotFound(format!("Prompt file not found: {}", path.display()))
        }
        _ => QueueError::Io(e),
    })?;

    let prompts = parse_prompts(&content, PromptFormat::from_path(path));
    if prompts.is_empty() {
        return Err(QueueError::Config(format!(
            "{} contains no prompts",
            path.display()
        )));
    }
    Ok(prompts)
}

/// Tracks each prompt under its position in the file.
pub fn track_prompts(prompts: impl IntoIterator<Item = String>) -> Vec<TrackedText> {
    prompts
        .into_iter()
        .enumerate()
        .map(|(i, text)| TrackedText::new(i.to_string(), text))
        .collect()
}

fn json_prompt(line: &str) -> Option<String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Line {
        Bare(String),
        Object { prompt: String },
    }

    let text = match serde_json::from_str::<Line>(line).ok()? {
        Line::Bare(text) | Line::Object { prompt: text } => text,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: &str, tokens: u64) -> TrackedText {
        TrackedText {
            id: id.to_string(),
            text: id.to_string(),
            num_tokens: tokens,
        }
    }

    fn ids(batch: &EmbeddingsBatch) -> Vec<&str> {
        batch.prompts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_tracked_text_estimates_tokens() {
        let t = TrackedText::new("q1", "abcdefgh");
        assert_eq!(t.num_tokens, 2);
    }

    #[test]
    fn test_pack_batches_respects_ceiling() {
        let items = vec![text("a", 4_000), text("b", 4_000), text("c", 500), text("d", 8_000)];
        let batches = pack_batches(items, MAX_EMBEDDING_BATCH_TOKENS);
        assert_eq!(batches.len(), 3);
        assert_eq!(ids(&batches[0]), vec!["a", "b"]);
        assert_eq!(batches[0].num_tokens, 8_000);
        assert_eq!(ids(&batches[1]), vec!["c"]);
        assert_eq!(ids(&batches[2]), vec!["d"]);
        assert!(batches.iter().all(|b| b.num_tokens <= MAX_EMBEDDING_BATCH_TOKENS));
    }

    #[test]
    fn test_pack_batches_exact_fit() {
        let batches = pack_batches(vec![text("a", 4_096), text("b", 4_096)], 8_192);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_tokens, 8_192);
    }

    #[test]
    fn test_pack_batches_oversized_item_stands_alone() {
        let items = vec![text("small", 10), text("huge", 9_000), text("tail", 10)];
        let batches = pack_batches(items, 8_192);
        assert_eq!(batches.len(), 3);
        assert_eq!(ids(&batches[1]), vec!["huge"]);
        assert_eq!(batches[1].num_tokens, 9_000);
    }

    #[test]
    fn test_pack_batches_empty() {
        assert!(pack_batches(Vec::new(), 8_192).is_empty());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(PromptFormat::from_path(Path::new("q.jsonl")), PromptFormat::JsonLines);
        assert_eq!(PromptFormat::from_path(Path::new("q.JSON")), PromptFormat::JsonLines);
        assert_eq!(PromptFormat::from_path(Path::new("q.txt")), PromptFormat::Lines);
        assert_eq!(PromptFormat::from_path(Path::new("prompts")), PromptFormat::Lines);
    }

    #[test]
    fn test_parse_lines_skips_blanks_and_comments() {
        let content = "# header\n\nFirst prompt\n   \n  Second prompt  \n# trailing\n";
        assert_eq!(
            parse_prompts(content, PromptFormat::Lines),
            vec!["First prompt", "Second prompt"]
        );
    }

    #[test]
    fn test_parse_json_lines() {
        let content = "\"Hello world\"\n{\"prompt\": \" Explain monads \"}\n{\"other\": 1}\n\"   \"\nnot json\n";
        assert_eq!(
            parse_prompts(content, PromptFormat::JsonLines),
            vec!["Hello world", "Explain monads"]
        );
    }

    #[test]
    fn test_track_prompts_feeds_batches() {
        let tracked = track_prompts(vec!["abcd".to_string(), "abcdefgh".to_string()]);
        assert_eq!(tracked[1].id, "1");
        assert_eq!(tracked[1].num_tokens, 2);
        let batches = pack_batches(tracked, MAX_EMBEDDING_BATCH_TOKENS);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_tokens, 3);
    }

    #[test]
    fn test_load_prompts_from_file() {
        let path = std::env::temp_dir().join("ratequeue_load_prompts.jsonl");
        std::fs::write(&path, "{\"prompt\": \"Embed me\"}\n").unwrap();
        assert_eq!(load_prompts(&path).unwrap(), vec!["Embed me"]);

        std::fs::write(&path, "# nothing here\n").unwrap();
        let err = load_prompts(&path).unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_prompts_missing_file() {
        let err = load_prompts(Path::new("/tmp/ratequeue_no_such_prompts.txt")).unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }
}
