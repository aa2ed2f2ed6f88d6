//! The camelCase-aware tokenizer feeding the bundle search index.
//!
//! Compound identifier runs like `DocumentationKit` are split into their
//! camelCase words before anything else sees them, so a query for `kit` can
//! match a bundle named `DocumentationKit`. The produced words then flow
//! through tantivy's lowercasing and Porter-style stemming filters, both at
//! index time and at query time.

use std::sync::OnceLock;

use regex::Regex;
use tantivy::Index;
use tantivy::tokenizer::{
    Language, LowerCaser, Stemmer, TextAnalyzer, Token, TokenStream, Tokenizer,
};

/// Name the analyzer is registered under on every search index.
pub const TOKENIZER_NAME: &str = "camelcase";

/// A compound identifier run: preceded by start-of-string, whitespace, comma
/// or period; zero or more lowercase letters followed by one or more
/// capital-letter-led groups. The separator is consumed with the match.
#[allow(clippy::unwrap_used)] // literal pattern
fn compound_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[\s.,])([a-z]*(?:[A-Z][a-z0-9]+)+)").unwrap())
}

/// Splits raw text into pre-tokens.
///
/// Every compound identifier run becomes one lowercased word per camelCase
/// segment; text outside matched runs is preserved verbatim, trimmed of
/// surrounding whitespace and dropped if empty.
pub fn split_pre_tokens(input: &str) -> Vec<String> {
    let mut output = Vec::new();
    let mut current = 0;

    for captures in compound_run().captures_iter(input) {
        let Some(full) = captures.get(0) else { continue };
        let Some(run) = captures.get(1) else { continue };

        if full.start() > current {
            let outside = input[current..full.start()].trim();
            if !outside.is_empty() {
                output.push(outside.to_string());
            }
        }
        output.extend(split_camel_case(run.as_str()));
        current = full.end();
    }

    if current < input.len() {
        let suffix = input[current..].trim();
        if !suffix.is_empty() {
            output.push(suffix.to_string());
        }
    }

    output
}

/// Splits a compound run before every uppercase letter that is not its first
/// character, lowercasing the result.
fn split_camel_case(run: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for c in run.chars() {
        if c.is_uppercase() && !words.is_empty() {
            words.push(c.to_lowercase().collect());
        } else if let Some(last) = words.last_mut() {
            last.extend(c.to_lowercase());
        } else {
            words.push(c.to_lowercase().collect());
        }
    }
    words
}

/// Splits text into the word tokens that get indexed.
///
/// Pre-tokens are produced by [`split_pre_tokens`]; verbatim chunks are then
/// broken at non-alphanumeric boundaries the way a plain word tokenizer
/// would, so `app.getdocsy.documentationkit` indexes as three words.
pub fn tokenize(text: &str) -> Vec<String> {
    split_pre_tokens(text)
        .iter()
        .flat_map(|pre_token| {
            pre_token
                .split(|c: char| !c.is_alphanumeric())
                .filter(|word| !word.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// The camelCase word splitter as a tantivy tokenizer.
#[derive(Clone, Default)]
pub struct CamelCaseTokenizer;

impl Tokenizer for CamelCaseTokenizer {
    type TokenStream<'a> = CamelCaseTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> CamelCaseTokenStream {
        let tokens = tokenize(text)
            .into_iter()
            .enumerate()
            .map(|(position, word)| Token {
                offset_from: 0,
                offset_to: 0,
                position,
                text: word,
                position_length: 1,
            })
            .collect();
        CamelCaseTokenStream { tokens, cursor: 0 }
    }
}

/// Token stream produced by [`CamelCaseTokenizer`].
pub struct CamelCaseTokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream for CamelCaseTokenStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}

/// The full analysis chain: camelCase split, lowercase, Porter-style stem.
pub fn analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(CamelCaseTokenizer)
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build()
}

/// Registers the analyzer on an index under [`TOKENIZER_NAME`].
///
/// Tokenizer registrations are not persisted with an index, so this must run
/// on every open.
pub fn register(index: &Index) {
    index.tokenizers().register(TOKENIZER_NAME, analyzer());
}

/// Runs text through the full analysis chain, returning the final terms.
///
/// Used to build queries so query terms match what was indexed.
pub fn analyze(text: &str) -> Vec<String> {
    let mut analyzer = analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    while stream.advance() {
        terms.push(stream.token().text.clone());
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_identifiers_split_into_subwords() {
        assert_eq!(tokenize("DocumentationKit"), ["documentation", "kit"]);
        assert_eq!(tokenize("getDocsy"), ["get", "docsy"]);
        assert_eq!(
            tokenize("NavigatorIndex loading"),
            ["navigator", "index", "loading"]
        );
    }

    #[test]
    fn plain_text_is_preserved_word_by_word() {
        assert_eq!(tokenize("plain text"), ["plain", "text"]);
        assert_eq!(tokenize("plain"), ["plain"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn reverse_dns_identifiers_split_on_punctuation() {
        assert_eq!(
            tokenize("app.getdocsy.documentationkit"),
            ["app", "getdocsy", "documentationkit"]
        );
    }

    #[test]
    fn runs_after_separators_are_detected() {
        assert_eq!(
            tokenize("app.getdocsy.DocumentationServer"),
            ["app", "getdocsy", "documentation", "server"]
        );
        assert_eq!(tokenize("one TwoThree, four"), ["one", "two", "three", "four"]);
    }

    #[test]
    fn digits_stay_attached_to_their_word() {
        assert_eq!(tokenize("Sloth2Creator"), ["sloth2", "creator"]);
    }

    #[test]
    fn pre_tokens_keep_outside_text_verbatim() {
        assert_eq!(
            split_pre_tokens("plain DocumentationKit tail"),
            ["plain", "documentation", "kit", "tail"]
        );
        assert_eq!(split_pre_tokens("plain text"), ["plain text"]);
    }

    #[test]
    fn analyzer_stems_subwords_independently() {
        let terms = analyze("DocumentationKit");
        assert_eq!(terms.len(), 2);
        // Porter stemming reduces "documentation" to its stem; "kit" survives.
        assert!(terms[0].starts_with("document"));
        assert_eq!(terms[1], "kit");
    }
}
