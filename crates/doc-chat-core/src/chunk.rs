//! Sentence-boundary text chunker and tabular row chunker.
//!
//! [`chunk_text`] splits prose into overlapping windows for independent
//! embedding, preferring to cut at sentence-ending punctuation instead of
//! mid-sentence. [`rows_to_chunks`] is the structured variant for
//! row-oriented sources (CSV/XLSX): one chunk per row, no sentence logic.
//!
//! Both are pure functions: deterministic, no shared state, safe to run
//! per-document in parallel.
//!
//! # Algorithm (`chunk_text`)
//!
//! 1. Empty input produces an empty sequence.
//! 2. Input no longer than `chunk_size` produces a single trimmed chunk.
//! 3. Otherwise walk a window of `chunk_size` characters, advancing by
//!    `chunk_size − overlap` per step. Before cutting, scan the window for
//!    the last `. `, `? `, or `! `; if it falls past the window's midpoint,
//!    cut just after the punctuation, else cut at the hard boundary.
//! 4. Chunks are trimmed; chunks that trim to nothing are dropped.
//!
//! All window arithmetic is in characters, not bytes, so multi-byte input
//! never splits inside a code point.

/// Split `text` into overlapping, sentence-boundary-aware chunks.
///
/// `overlap` must be smaller than `chunk_size`; the walk refuses to move
/// backwards regardless, so a pathological overlap degrades to
/// non-overlapping windows instead of looping forever.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        // Prefer a sentence boundary, but only one past the midpoint —
        // cutting earlier would produce stub chunks.
        if end < chars.len() {
            if let Some(break_at) = last_sentence_end(&chars[start..end]) {
                if break_at > chunk_size / 2 {
                    end = start + break_at + 1;
                }
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Index of the last sentence-ending punctuation (`.`, `?`, `!` followed
/// by a space) within `window`, or `None` if there is none.
fn last_sentence_end(window: &[char]) -> Option<usize> {
    window
        .windows(2)
        .enumerate()
        .rev()
        .find(|(_, pair)| matches!(pair[0], '.' | '?' | '!') && pair[1] == ' ')
        .map(|(i, _)| i)
}

/// Render tabular rows as one chunk per row.
///
/// Each row is rendered as `"column: value"` pairs joined with `" | "`,
/// in column order. Missing or blank cells are skipped; rows with no
/// usable cells are dropped entirely. Rows have no prose structure, so
/// there is no sentence-boundary handling here.
pub fn rows_to_chunks(headers: &[String], rows: &[Vec<Option<String>>]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| {
            let parts: Vec<String> = headers
                .iter()
                .zip(row.iter())
                .filter_map(|(header, cell)| {
                    let value = cell.as_deref()?.trim();
                    if value.is_empty() {
                        None
                    } else {
                        Some(format!("{}: {}", header, value))
                    }
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" | "))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100, 20).is_empty());
    }

    #[test]
    fn whitespace_only_yields_no_chunks() {
        assert!(chunk_text("   \n\t  ", 100, 20).is_empty());
    }

    #[test]
    fn short_text_yields_single_trimmed_chunk() {
        let chunks = chunk_text("  hello world.  ", 100, 20);
        assert_eq!(chunks, vec!["hello world.".to_string()]);
    }

    #[test]
    fn text_exactly_chunk_size_is_one_chunk() {
        let text = "a".repeat(50);
        let chunks = chunk_text(&text, 50, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn no_chunk_exceeds_size() {
        let text = "word ".repeat(500);
        for chunk in chunk_text(&text, 120, 30) {
            assert!(
                chunk.chars().count() <= 121,
                "chunk too long: {} chars",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn no_chunk_is_empty_after_trim() {
        let text = "Sentence one. Sentence two! Sentence three? ".repeat(40);
        for chunk in chunk_text(&text, 100, 25) {
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn cuts_at_sentence_boundary_past_midpoint() {
        // 1000 chars of sentences, window 300, overlap 50: every cut that
        // has a sentence end past char 150 of its window must land there,
        // so no chunk (except possibly the last) ends mid-word.
        let sentence = "The quick brown fox jumps over the lazy dog again. ";
        let text = sentence.repeat(20);
        let text = &text[..1000.min(text.len())];
        let chunks = chunk_text(text, 300, 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with('.') || chunk.ends_with('!') || chunk.ends_with('?'),
                "chunk fractured mid-sentence: ...{:?}",
                &chunk[chunk.len().saturating_sub(20)..]
            );
        }
    }

    #[test]
    fn overlapping_windows_cover_all_content() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. ".repeat(10);
        let chunks = chunk_text(&text, 80, 20);
        let joined = chunks.join(" ");
        for word in ["Alpha", "epsilon", "iota"] {
            assert!(joined.contains(word), "lost {:?}", word);
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let text = "Repeatable content. More content here! And a question? ".repeat(15);
        assert_eq!(chunk_text(&text, 90, 30), chunk_text(&text, 90, 30));
    }

    #[test]
    fn multibyte_input_never_panics() {
        let text = "héllo wörld. ünïcode tëxt hërë! ".repeat(30);
        let chunks = chunk_text(&text, 64, 16);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn pathological_overlap_still_terminates() {
        let text = "a b c d e. ".repeat(100);
        let chunks = chunk_text(&text, 20, 20);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn rows_render_in_column_order() {
        let headers = vec!["name".to_string(), "amount".to_string()];
        let rows = vec![vec![Some("Acme".to_string()), Some("120".to_string())]];
        assert_eq!(rows_to_chunks(&headers, &rows), vec!["name: Acme | amount: 120"]);
    }

    #[test]
    fn null_cells_are_skipped() {
        let headers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let rows = vec![vec![Some("1".to_string()), None, Some("3".to_string())]];
        assert_eq!(rows_to_chunks(&headers, &rows), vec!["a: 1 | c: 3"]);
    }

    #[test]
    fn all_null_rows_are_dropped() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let rows = vec![
            vec![None, None],
            vec![Some("  ".to_string()), None],
            vec![Some("x".to_string()), None],
        ];
        assert_eq!(rows_to_chunks(&headers, &rows), vec!["a: x"]);
    }
}
