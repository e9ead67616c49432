//! Completion cleaning steps
//!
//! A closed set of text transforms applied in order by a [`CleanerPipeline`].
//! Each step is infallible; a pipeline over any input always produces output.

use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

const SENTENCE_END: [char; 3] = ['.', '?', '!'];

const ROLE_MARKERS: [&str; 11] = [
    "User: ",
    "System: ",
    "Assistant: ",
    "Assistant, ",
    "Dear AI, ",
    "Dear AI ",
    "#Question: ",
    "<|im_start|>",
    "<|im_end|>",
    "<i>",
    "</i>",
];

const TAGS: [&str; 1] = ["<date>"];

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
fn role_prefix() -> &'static Regex {
    static ROLE_PREFIX: OnceLock<Regex> = OnceLock::new();
    ROLE_PREFIX.get_or_init(|| Regex::new(r"\n*\w+\s*:").expect("role prefix pattern is valid"))
}

/// Character offset into a completion, absolute or relative to its length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    /// Byte offset
    Absolute(usize),
    /// Fraction of the text length, in `[0, 1)`
    Fraction(f64),
}

impl Position {
    fn resolve(self, len: usize) -> usize {
        match self {
            Position::Absolute(pos) => pos,
            Position::Fraction(frac) => (frac * len as f64) as usize,
        }
    }
}

/// One cleaning step.
#[derive(Debug, Clone, PartialEq)]
pub enum Cleaner {
    /// Strip surrounding single and double quotes
    RemoveQuotes,
    /// Drop an unfinished trailing sentence
    PruneEnding,
    /// Remove speaker prefixes and chat markup, then re-capitalise sentences
    RemoveRoles,
    /// Drop text after the last question mark when it falls inside a window
    RemovePostQuestionText {
        /// Earliest accepted position of the last `?`
        min_pos: Position,
        /// Latest accepted position of the last `?`
        max_pos: Position,
        /// Keep only this many questions, if set
        max_questions: Option<usize>,
    },
    /// Remove placeholder tags
    RemoveTags,
    /// Keep only the first question, dropping any `label:` prefix
    FirstQuestion,
}

impl Cleaner {
    /// `RemovePostQuestionText` with the usual window: after the fifth
    /// character and within the first half.
    pub fn remove_post_question_text() -> Self {
        Cleaner::RemovePostQuestionText {
            min_pos: Position::Absolute(5),
            max_pos: Position::Fraction(0.5),
            max_questions: None,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Cleaner::RemoveQuotes => "remove_quotes",
            Cleaner::PruneEnding => "prune_ending",
            Cleaner::RemoveRoles => "remove_roles",
            Cleaner::RemovePostQuestionText { .. } => "remove_post_question_text",
            Cleaner::RemoveTags => "remove_tags",
            Cleaner::FirstQuestion => "first_question",
        }
    }

    /// Apply this step.
    pub fn apply(&self, text: &str) -> String {
        match self {
            Cleaner::RemoveQuotes => text.trim_matches(&['"', '\''][..]).to_string(),
            Cleaner::PruneEnding => prune_ending(text),
            Cleaner::RemoveRoles => remove_roles(text),
            Cleaner::RemovePostQuestionText {
                min_pos,
                max_pos,
                max_questions,
            } => remove_post_question_text(text, *min_pos, *max_pos, *max_questions),
            Cleaner::RemoveTags => TAGS
                .iter()
                .fold(text.to_string(), |acc, tag| acc.replace(tag, "")),
            Cleaner::FirstQuestion => first_question(text),
        }
    }
}

fn prune_ending(text: &str) -> String {
    if !text.contains(SENTENCE_END) || text.ends_with(SENTENCE_END) {
        return text.to_string();
    }
    match text.rfind(SENTENCE_END) {
        Some(idx) => text[..=idx].to_string(),
        None => text.to_string(),
    }
}

fn remove_roles(text: &str) -> String {
    let stripped = role_prefix().replace_all(text, "");
    let stripped = ROLE_MARKERS
        .iter()
        .fold(stripped.into_owned(), |acc, marker| acc.replace(marker, ""));
    capitalize_sentences(&stripped)
}

/// Upper-case the first character, lower-case the rest.
fn capitalize(sentence: &str) -> String {
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Split on whitespace that follows `.`, `!` or `?`, capitalise, rejoin.
fn capitalize_sentences(text: &str) -> String {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if !SENTENCE_END.contains(&ch) {
            continue;
        }
        let end = idx + ch.len_utf8();
        let mut gap_end = end;
        while let Some(&(next_idx, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            gap_end = next_idx + next.len_utf8();
            chars.next();
        }
        if gap_end > end {
            sentences.push(&text[start..end]);
            start = gap_end;
        }
    }
    sentences.push(&text[start..]);
    sentences
        .into_iter()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn remove_post_question_text(
    text: &str,
    min_pos: Position,
    max_pos: Position,
    max_questions: Option<usize>,
) -> String {
    let Some(last) = text.rfind('?') else {
        return text.to_string();
    };
    let len = text.len();
    if last < min_pos.resolve(len) || last > max_pos.resolve(len) {
        return text.to_string();
    }
    match max_questions {
        Some(max) => {
            let parts: Vec<&str> = text.splitn(max + 1, '?').collect();
            format!("{}?", parts[..parts.len() - 1].join("?"))
        }
        None => text[..=last].to_string(),
    }
}

fn first_question(text: &str) -> String {
    if !text.contains('?') {
        return text.to_string();
    }
    let mut current = text;
    for _ in 0..2 {
        if let Some(after) = current.split(':').nth(1) {
            current = after;
        }
    }
    let question = current.split('?').next().unwrap_or_default();
    format!("{question}?")
}

/// Ordered list of cleaning steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanerPipeline {
    steps: Vec<Cleaner>,
}

impl CleanerPipeline {
    /// Pipeline running `steps` in order
    pub fn new(steps: impl IntoIterator<Item = Cleaner>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Append a step
    pub fn with(mut self, step: Cleaner) -> Self {
        self.steps.push(step);
        self
    }

    /// Steps in order
    pub fn steps(&self) -> &[Cleaner] {
        &self.steps
    }

    /// Run every step over `text`.
    pub fn apply(&self, text: &str) -> String {
        self.steps.iter().fold(text.to_string(), |acc, step| {
            let out = step.apply(&acc);
            trace!(step = step.name(), before = acc.len(), after = out.len(), "cleaned");
            out
        })
    }
}
