//! Sentence splitting for streamed synthesis.

/// Characters that terminate a sentence. Terminators stay attached to the
/// emitted sentence so prosody is preserved.
const TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

/// Split reply text into sentences for sentence-by-sentence synthesis.
///
/// Whitespace-only pieces are discarded; text containing no terminator is
/// returned as a single sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if TERMINATORS.contains(&c) {
            flush(&mut current, &mut sentences);
        }
    }
    flush(&mut current, &mut sentences);
    sentences
}

fn flush(current: &mut String, sentences: &mut Vec<String>) {
    let piece = std::mem::take(current);
    let trimmed = piece.trim();
    // Pieces with nothing pronounceable (stray punctuation runs) are skipped.
    if trimmed.chars().any(char::is_alphanumeric) {
        sentences.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_are_kept() {
        assert_eq!(
            split_sentences("Hello there. How are you? Fine!"),
            vec!["Hello there.", "How are you?", "Fine!"]
        );
    }

    #[test]
    fn newline_splits_sentences() {
        assert_eq!(split_sentences("first\nsecond"), vec!["first", "second"]);
    }

    #[test]
    fn text_without_terminator_is_one_sentence() {
        assert_eq!(split_sentences("no terminator here"), vec!["no terminator here"]);
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        assert!(split_sentences("   \n  \n ").is_empty());
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn consecutive_terminators_do_not_emit_empties() {
        assert_eq!(split_sentences("Wait... what?"), vec!["Wait.", "what?"]);
        assert!(split_sentences("?!").is_empty());
    }
}
