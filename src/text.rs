//! Sentence and word segmentation shared by every backend.

use unicode_segmentation::UnicodeSegmentation;

/// Splits `text` on UAX#29 sentence boundaries, dropping blank pieces.
pub fn sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Splits a sentence into word and punctuation tokens.
///
/// Whitespace runs are discarded; punctuation survives as standalone tokens so
/// `getName()` becomes `getName`, `(`, `)`.
pub fn words(sentence: &str) -> Vec<&str> {
    sentence
        .split_word_bounds()
        .filter(|token| !token.trim().is_empty())
        .collect()
}

/// Tokenizes every sentence of `text`, keeping the sentence grouping.
pub fn tokenize(text: &str) -> Vec<Vec<&str>> {
    sentences(text).into_iter().map(words).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_sentences_and_trims() {
        assert_eq!(
            sentences("Order line. Shipping address!  "),
            vec!["Order line.", "Shipping address!"]
        );
    }

    #[test]
    fn single_identifier_is_one_sentence() {
        assert_eq!(sentences("customerName"), vec!["customerName"]);
        assert!(sentences("   ").is_empty());
    }

    #[test]
    fn punctuation_becomes_tokens() {
        assert_eq!(words("getName()"), vec!["getName", "(", ")"]);
        assert_eq!(words("first_name"), vec!["first_name"]);
        assert_eq!(words("total  amount"), vec!["total", "amount"]);
    }

    #[test]
    fn tokenize_groups_by_sentence() {
        let tokens = tokenize("Car wheel. Bike");
        assert_eq!(tokens, vec![vec!["Car", "wheel", "."], vec!["Bike"]]);
    }
}
