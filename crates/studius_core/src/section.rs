//! crates/studius_core/src/section.rs
//!
//! Splits extracted document text into sections for chunked LLM processing,
//! and provides the merge helpers (dedup, caps, per-section budgets) used to
//! combine per-section results. Every chunked pipeline in the API goes
//! through this module so splitting and merging behave identically
//! everywhere.

use std::collections::HashSet;

/// Paragraph separator recognized in extracted text.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Sections are not closed before reaching this many bytes, unless the
/// configured target is itself smaller.
pub const MIN_SECTION_CHARS: usize = 1_000;

#[derive(Debug, Clone, Copy)]
pub struct SplitOptions {
    /// Preferred maximum section size in bytes.
    pub target_size: usize,
    /// Lower bound before a section may be closed. The effective floor is
    /// `min(min_section, target_size)` so a small target always wins.
    pub min_section: usize,
}

impl SplitOptions {
    pub fn with_target(target_size: usize) -> Self {
        Self {
            target_size,
            min_section: MIN_SECTION_CHARS,
        }
    }

    fn effective_floor(&self) -> usize {
        self.min_section.min(self.target_size)
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::with_target(6_000)
    }
}

//=========================================================================================
// Splitting
//=========================================================================================

/// A split unit: a whole paragraph, or a fragment of an oversized one.
struct Piece<'a> {
    text: &'a str,
    /// True when this piece opened a new paragraph in the source text.
    starts_paragraph: bool,
}

/// Splits `text` into sections of roughly `target_size` bytes.
///
/// Paragraphs are the preferred boundary. A paragraph larger than the target
/// is split at sentence boundaries, and a sentence larger than the target is
/// cut at character boundaries. Pieces are then packed greedily: a section is
/// closed once adding the next piece would exceed the target, but never
/// before the effective floor is reached.
///
/// No text is dropped or reordered. Fragments of one paragraph are
/// contiguous across sections, and for input whose sections all break on
/// paragraph boundaries, `sections.join("\n\n")` reproduces the input
/// exactly. Text at or under the target comes back as a single section;
/// empty input yields no sections.
pub fn split_sections(text: &str, opts: &SplitOptions) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= opts.target_size {
        return vec![text.to_string()];
    }

    let floor = opts.effective_floor();
    let mut pieces: Vec<Piece> = Vec::new();
    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        if paragraph.len() <= opts.target_size {
            pieces.push(Piece {
                text: paragraph,
                starts_paragraph: true,
            });
            continue;
        }
        let mut first = true;
        for sentence in paragraph.split_inclusive(['.', '!', '?']) {
            if sentence.len() <= opts.target_size {
                pieces.push(Piece {
                    text: sentence,
                    starts_paragraph: first,
                });
                first = false;
            } else {
                for slice in slice_at_char_boundaries(sentence, opts.target_size) {
                    pieces.push(Piece {
                        text: slice,
                        starts_paragraph: first,
                    });
                    first = false;
                }
            }
        }
    }

    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut pieces_in_current = 0usize;
    for piece in pieces {
        let separator = if piece.starts_paragraph && pieces_in_current > 0 {
            PARAGRAPH_SEPARATOR.len()
        } else {
            0
        };
        let projected = current.len() + separator + piece.text.len();
        if pieces_in_current > 0 && projected > opts.target_size && current.len() >= floor {
            sections.push(std::mem::take(&mut current));
            pieces_in_current = 0;
        }
        if pieces_in_current > 0 && piece.starts_paragraph {
            current.push_str(PARAGRAPH_SEPARATOR);
        }
        current.push_str(piece.text);
        pieces_in_current += 1;
    }
    if pieces_in_current > 0 {
        sections.push(current);
    }
    sections
}

/// Cuts `text` into slices of at most `max_bytes`, never inside a UTF-8
/// character. Concatenating the slices reproduces `text`.
fn slice_at_char_boundaries(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_bytes).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // max_bytes is smaller than one character; emit the character whole
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        slices.push(&text[start..end]);
        start = end;
    }
    slices
}

/// Truncates `text` to at most `max_bytes`, cutting at a character boundary.
/// Used to bound single-call prompt context.
pub fn truncate_chars(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

//=========================================================================================
// Item budgets
//=========================================================================================

/// Scales an item target with document length: one item per `chars_per_item`
/// bytes, clamped to `[min, max]`. Callers must pass `min <= max`.
pub fn scaled_target(text_len: usize, chars_per_item: usize, min: usize, max: usize) -> usize {
    (text_len / chars_per_item.max(1)).clamp(min, max)
}

/// Ceil-divides a total item target across sections, so per-section requests
/// never sum below the overall target.
pub fn section_item_budget(total_target: usize, section_count: usize) -> usize {
    if section_count == 0 {
        return 0;
    }
    total_target.div_ceil(section_count)
}

//=========================================================================================
// Merging
//=========================================================================================

/// Normalized form used for duplicate detection across sections.
pub fn dedup_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Removes items whose key already appeared, keeping the first occurrence
/// and the original order. Keys are compared trimmed and case-insensitively.
pub fn dedup_by_key<T, F>(items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(dedup_key(key(item))))
        .collect()
}

/// Truncates a merged item list to the configured maximum.
pub fn cap_items<T>(mut items: Vec<T>, max: usize) -> Vec<T> {
    items.truncate(max);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(target: usize) -> SplitOptions {
        SplitOptions::with_target(target)
    }

    #[test]
    fn short_input_is_a_single_section() {
        let text = "Un breve appunto di lezione.";
        let sections = split_sections(text, &opts(6_000));
        assert_eq!(sections, vec![text.to_string()]);
    }

    #[test]
    fn empty_input_yields_no_sections() {
        assert!(split_sections("", &opts(6_000)).is_empty());
    }

    #[test]
    fn small_target_splits_on_every_paragraph() {
        let sections = split_sections("A.\n\nB.\n\nC.", &opts(2));
        assert_eq!(sections, vec!["A.", "B.", "C."]);
    }

    #[test]
    fn paragraph_sections_rejoin_to_the_original() {
        let paragraphs: Vec<String> = (0..40)
            .map(|i| format!("Paragrafo {i}: {}", "la fotosintesi clorofilliana. ".repeat(8)))
            .collect();
        let text = paragraphs.join("\n\n");
        let sections = split_sections(&text, &opts(1_200));
        assert!(sections.len() > 1);
        assert_eq!(sections.join("\n\n"), text);
    }

    #[test]
    fn sections_do_not_exceed_target_by_more_than_one_piece() {
        let paragraph = "parola ".repeat(40); // 280 bytes
        let text = vec![paragraph.trim_end(); 60].join("\n\n");
        let target = 1_500;
        for section in split_sections(&text, &opts(target)) {
            assert!(
                section.len() <= target + paragraph.len() + PARAGRAPH_SEPARATOR.len(),
                "section of {} bytes exceeds the allowance",
                section.len()
            );
        }
    }

    #[test]
    fn non_final_sections_reach_the_floor() {
        let paragraph = "x".repeat(300);
        let text = vec![paragraph.as_str(); 30].join("\n\n");
        let sections = split_sections(&text, &opts(2_000));
        for section in &sections[..sections.len() - 1] {
            assert!(section.len() >= MIN_SECTION_CHARS);
        }
    }

    #[test]
    fn oversized_paragraph_falls_back_to_sentences() {
        // one paragraph, no blank lines anywhere
        let text = "Questa è una frase di prova che parla di biologia cellulare. "
            .repeat(200)
            .trim_end()
            .to_string();
        let target = 1_000;
        let sections = split_sections(&text, &opts(target));
        assert!(sections.len() > 1);
        // sentence breaks are contiguous, so plain concatenation is lossless
        assert_eq!(sections.concat(), text);
        let max_sentence = 62;
        for section in &sections {
            assert!(section.len() <= target + max_sentence);
        }
    }

    #[test]
    fn unbroken_text_is_cut_at_character_boundaries() {
        let text = "x".repeat(25_000);
        let target = 4_000;
        let sections = split_sections(&text, &opts(target));
        assert_eq!(sections.len(), 25_000usize.div_ceil(target));
        assert!(sections.iter().all(|s| s.len() <= target));
        assert_eq!(sections.concat(), text);
    }

    #[test]
    fn multibyte_text_never_panics_or_splits_characters() {
        let text = "è€àòù".repeat(2_000); // 11 bytes per repetition
        let target = 100;
        let sections = split_sections(&text, &opts(target));
        assert_eq!(sections.concat(), text);
        for section in &sections {
            // a slice may stop one character short of the target and absorb
            // the next one before reaching the floor
            assert!(section.len() < 2 * target);
            assert!(std::str::from_utf8(section.as_bytes()).is_ok());
        }
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("ciao", 10), "ciao");
        assert_eq!(truncate_chars("ciao", 3), "cia");
        // 'è' is two bytes; cutting inside it moves back to the boundary
        assert_eq!(truncate_chars("èèè", 3), "è");
    }

    #[test]
    fn scaled_target_clamps_to_the_range() {
        assert_eq!(scaled_target(2_000, 2_500, 12, 60), 12);
        assert_eq!(scaled_target(75_000, 2_500, 12, 60), 30);
        assert_eq!(scaled_target(1_000_000, 2_500, 12, 60), 60);
    }

    #[test]
    fn section_item_budget_rounds_up() {
        assert_eq!(section_item_budget(10, 4), 3);
        assert_eq!(section_item_budget(12, 4), 3);
        assert_eq!(section_item_budget(1, 3), 1);
        assert_eq!(section_item_budget(10, 0), 0);
    }

    #[test]
    fn dedup_is_case_insensitive_and_trims() {
        let items = vec![
            "Cos'è X?".to_string(),
            "cos'è x? ".to_string(),
            "Cos'è Y?".to_string(),
        ];
        let kept = dedup_by_key(items, |s| s.as_str());
        assert_eq!(kept, vec!["Cos'è X?".to_string(), "Cos'è Y?".to_string()]);
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let items = vec!["b", "a", "B", "c", "A"];
        let kept = dedup_by_key(items, |s| s);
        assert_eq!(kept, vec!["b", "a", "c"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let items = vec!["b", "a", "B", "c", "A"];
        let once = dedup_by_key(items, |s| *s);
        let twice = dedup_by_key(once.clone(), |s| *s);
        assert_eq!(once, twice);
    }

    #[test]
    fn cap_items_truncates() {
        assert_eq!(cap_items(vec![1, 2, 3, 4], 2), vec![1, 2]);
        assert_eq!(cap_items(vec![1], 5), vec![1]);
    }
}
