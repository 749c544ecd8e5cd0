//! Numbered multi-string prompts and their tolerant parsing

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::TranslationRequest;
use crate::core::prompt::language_name;

/// Largest number of strings sent in one batch call
pub const MAX_BATCH_ITEMS: usize = 25;
/// Largest combined character count sent in one batch call
pub const MAX_BATCH_CHARS: usize = 10_000;

fn entry_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^\s*\[(\d+)\]\s*(.*)$").expect("bracket pattern compiles"),
            Regex::new(r"^\s*(\d+)\.\s+(.*)$").expect("dot pattern compiles"),
            Regex::new(r"^\s*(\d+)\)\s*(.*)$").expect("paren pattern compiles"),
        ]
    })
}

/// Prompt listing every text as a `[N] text` line
pub fn build_batch_prompt(request: &TranslationRequest, texts: &[String]) -> String {
    let target = language_name(&request.target_lang);
    let mut prompt = if request.is_auto_source() {
        format!("Translate each of the following numbered texts to {}.\n", target)
    } else {
        format!(
            "Translate each of the following numbered texts from {} to {}.\n",
            language_name(&request.source_lang),
            target
        )
    };

    prompt.push_str("Context: These are application UI strings. Preserve semantics and ensure wording fits an app interface.\n");
    if !request.context.trim().is_empty() {
        prompt.push_str(request.context.trim());
        prompt.push('\n');
    }
    prompt.push_str("ABSOLUTE RULES:\n");
    prompt.push_str("- Return ONLY the translations in the EXACT same numbered format: [N] translated text\n");
    prompt.push_str(&format!(
        "- You MUST translate ALL {} items. Do not skip, merge, or reorder any.\n",
        texts.len()
    ));
    prompt.push_str("- Each translation MUST be on its own line starting with [N] where N is the item number.\n");
    prompt.push_str("- Tokens like __PH0__, __PH1__ etc. are protected placeholders. Keep them EXACTLY as-is.\n");
    prompt.push_str("- Do NOT translate, modify, reorder, or remove __PH*__ tokens.\n");
    prompt.push_str("- Keep emojis exactly as they appear.\n");
    prompt.push_str("- Do not add quotes, explanations, notes, or any extra text.\n\n");

    for (i, text) in texts.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, flatten_lines(text)));
    }

    prompt
}

fn flatten_lines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Remove a surrounding ``` fence, if the model added one
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    match (trimmed.find('\n'), trimmed.rfind("```")) {
        (Some(first_newline), Some(last_fence)) if last_fence > first_newline => {
            trimmed[first_newline + 1..last_fence].trim()
        }
        _ => trimmed,
    }
}

/// Collect numbered entries matching `pattern`. Lines without a marker
/// continue the previous entry.
fn match_entries(pattern: &Regex, text: &str, count: usize) -> (usize, Vec<Option<String>>) {
    let mut results: Vec<Option<String>> = vec![None; count];
    let mut found = 0;
    let mut current: Option<(usize, String)> = None;

    let mut flush = |entry: Option<(usize, String)>, results: &mut Vec<Option<String>>| {
        if let Some((number, value)) = entry {
            let value = value.trim();
            if number >= 1 && number <= count && !value.is_empty() {
                results[number - 1] = Some(value.to_string());
                found += 1;
            }
        }
    };

    for line in text.lines() {
        if let Some(caps) = pattern.captures(line) {
            flush(current.take(), &mut results);
            let number = caps[1].parse::<usize>().unwrap_or(0);
            current = Some((number, caps[2].to_string()));
        } else if let Some((_, value)) = current.as_mut() {
            value.push('\n');
            value.push_str(line);
        }
    }
    flush(current.take(), &mut results);

    (found, results)
}

/// Map a numbered response back onto `originals`.
///
/// Every supported numbering style is tried and the one matching the most
/// items wins. Items the response misses keep their original text.
pub fn parse_batch_response(response: &str, originals: &[String]) -> Result<Vec<String>> {
    if response.trim().is_empty() {
        return Err(TranslationError::EmptyResponse {
            message: "Empty batch translation response".to_string(),
        });
    }

    let count = originals.len();
    let cleaned = strip_code_fence(response);

    let mut best_found = 0;
    let mut best: Vec<Option<String>> = vec![None; count];
    for pattern in entry_patterns() {
        if best_found == count {
            break;
        }
        let (found, entries) = match_entries(pattern, cleaned, count);
        if found > best_found {
            best_found = found;
            best = entries;
        }
    }

    let mut missing = 0;
    let results: Vec<String> = best
        .into_iter()
        .zip(originals)
        .map(|(entry, original)| {
            entry.unwrap_or_else(|| {
                missing += 1;
                original.clone()
            })
        })
        .collect();

    if best_found == 0 {
        warn!("Batch response could not be parsed, falling back to originals");
    } else if missing > 0 {
        warn!("Batch parse: {}/{} translations missing, kept originals", missing, count);
    }

    Ok(results)
}

/// Group items (given by character length) into consecutive batches that
/// respect [`MAX_BATCH_ITEMS`] and [`MAX_BATCH_CHARS`]. An oversized item gets
/// a batch of its own.
pub fn chunk_ranges(lengths: &[usize]) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (i, len) in lengths.iter().enumerate() {
        let full = i - start >= MAX_BATCH_ITEMS || (i > start && chars + len > MAX_BATCH_CHARS);
        if full {
            ranges.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < lengths.len() {
        ranges.push(start..lengths.len());
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_batch_prompt_numbers_and_flattens() {
        let request = TranslationRequest::new("", "en", "fr");
        let prompt = build_batch_prompt(&request, &strings(&["Save", "Line one\nLine two"]));

        assert!(prompt.starts_with("Translate each of the following numbered texts from English to French.\n"));
        assert!(prompt.contains("You MUST translate ALL 2 items"));
        assert!(prompt.ends_with("[1] Save\n[2] Line one Line two\n"));
    }

    #[test]
    fn test_parse_bracket_format_in_fence() {
        let originals = strings(&["Save", "Cancel", "Delete"]);
        let response = "```text\n[1] Enregistrer\n[2] Annuler\n[3] Supprimer\n```";
        assert_eq!(
            parse_batch_response(response, &originals).unwrap(),
            strings(&["Enregistrer", "Annuler", "Supprimer"])
        );
    }

    #[test]
    fn test_parse_prefers_format_with_most_matches() {
        let originals = strings(&["One", "Two"]);
        let response = "1. Uno\n2. Dos";
        assert_eq!(parse_batch_response(response, &originals).unwrap(), strings(&["Uno", "Dos"]));

        let response = "1) Uno\n2) Dos";
        assert_eq!(parse_batch_response(response, &originals).unwrap(), strings(&["Uno", "Dos"]));
    }

    #[test]
    fn test_parse_keeps_originals_for_missing_items() {
        let originals = strings(&["One", "Two", "Three"]);
        let response = "[1] Uno\n[3] Tres\n[9] Nueve";
        assert_eq!(
            parse_batch_response(response, &originals).unwrap(),
            strings(&["Uno", "Two", "Tres"])
        );

        let unparsable = parse_batch_response("no numbers here", &originals).unwrap();
        assert_eq!(unparsable, originals);
    }

    #[test]
    fn test_parse_multiline_entry() {
        let originals = strings(&["a", "b"]);
        let response = "[1] first\ncontinued\n[2] second";
        assert_eq!(
            parse_batch_response(response, &originals).unwrap(),
            strings(&["first\ncontinued", "second"])
        );
    }

    #[test]
    fn test_empty_response_is_error() {
        assert!(parse_batch_response("  ", &strings(&["a"])).is_err());
    }

    #[test]
    fn test_chunk_ranges() {
        assert_eq!(chunk_ranges(&[10; 30]), vec![0..25, 25..30]);
        assert_eq!(chunk_ranges(&[6_000, 6_000, 10]), vec![0..1, 1..3]);
        assert_eq!(chunk_ranges(&[20_000]), vec![0..1]);
        assert!(chunk_ranges(&[]).is_empty());
    }
}
