//! Built-in tokenizing annotator with XML output.

use std::fmt::Write;

use super::{Annotator, Artifact};
use crate::error::AnnotationError;

/// Characters that end a sentence.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];

/// Closing punctuation that stays attached to the sentence it follows.
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '\u{201d}', '\u{2019}'];

/// A token with character offsets into the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    word: String,
    begin: usize,
    end: usize,
}

/// Annotator that splits text into sentences and tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlAnnotator;

impl XmlAnnotator {
    /// Create the annotator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Annotator for XmlAnnotator {
    fn name(&self) -> &str {
        "xml"
    }

    fn process(&self, text: &str) -> Result<Artifact, AnnotationError> {
        let sentences = split_sentences(tokenize(text));
        let tokens = sentences.iter().map(Vec::len).sum();
        let body = render(&sentences)
            .map_err(|e| AnnotationError::Process(format!("failed to render xml: {e}")))?;

        Ok(Artifact {
            body,
            tokens: Some(tokens),
            sentences: Some(sentences.len()),
        })
    }
}

/// Split on whitespace, then peel leading and trailing punctuation off each word.
fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        split_word(&chars[start..i], start, &mut tokens);
    }

    tokens
}

fn split_word(word: &[char], offset: usize, out: &mut Vec<Token>) {
    let single = |idx: usize| Token {
        word: word[idx].to_string(),
        begin: offset + idx,
        end: offset + idx + 1,
    };

    let mut lo = 0;
    let mut hi = word.len();

    while lo < hi && !word[lo].is_alphanumeric() {
        out.push(single(lo));
        lo += 1;
    }

    let mut trailing = Vec::new();
    while hi > lo && !word[hi - 1].is_alphanumeric() {
        hi -= 1;
        trailing.push(hi);
    }

    if lo < hi {
        out.push(Token {
            word: word[lo..hi].iter().collect(),
            begin: offset + lo,
            end: offset + hi,
        });
    }

    out.extend(trailing.into_iter().rev().map(single));
}

fn is_one_of(token: &Token, set: &[char]) -> bool {
    let mut chars = token.word.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if set.contains(&c))
}

/// Group tokens into sentences ending at a terminator plus any closers
/// attached directly to it.
fn split_sentences(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();
    let mut ending = false;
    let mut prev_end = None;

    for token in tokens {
        let terminator = is_one_of(&token, SENTENCE_TERMINATORS);
        let attached_closer = prev_end == Some(token.begin) && is_one_of(&token, CLOSERS);
        if ending && !terminator && !attached_closer {
            sentences.push(std::mem::take(&mut current));
            ending = false;
        }
        ending |= terminator;
        prev_end = Some(token.end);
        current.push(token);
    }

    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

fn render(sentences: &[Vec<Token>]) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(out, "<root>")?;
    writeln!(out, "  <document>")?;
    writeln!(out, "    <sentences>")?;

    for (s_idx, sentence) in sentences.iter().enumerate() {
        writeln!(out, r#"      <sentence id="{}">"#, s_idx + 1)?;
        writeln!(out, "        <tokens>")?;
        for (t_idx, token) in sentence.iter().enumerate() {
            writeln!(out, r#"          <token id="{}">"#, t_idx + 1)?;
            writeln!(out, "            <word>{}</word>", escape(&token.word))?;
            writeln!(
                out,
                "            <CharacterOffsetBegin>{}</CharacterOffsetBegin>",
                token.begin
            )?;
            writeln!(
                out,
                "            <CharacterOffsetEnd>{}</CharacterOffsetEnd>",
                token.end
            )?;
            writeln!(out, "          </token>")?;
        }
        writeln!(out, "        </tokens>")?;
        writeln!(out, "      </sentence>")?;
    }

    writeln!(out, "    </sentences>")?;
    writeln!(out, "  </document>")?;
    writeln!(out, "</root>")?;
    Ok(out)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
