//! Rule-based sentence segmentation.
//!
//! A sentence ends at `.`, `!` or `?` (optionally followed by closing quotes
//! or brackets) when whitespace follows. A lone `.` after a common
//! abbreviation such as "Dr." does not end a sentence.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BOUNDARY: Regex = Regex::new(r#"[.!?]+["'\u{201D}\u{2019})\]]*\s+"#)
        .expect("sentence boundary pattern is valid");
}

const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "vs.", "etc.", "e.g.", "i.e.",
    "no.", "approx.", "fig.", "inc.", "ltd.",
];

/// Lazily yields the sentences of `text`, trimmed and non-empty, in reading
/// order. The iterator is cheap to clone, so the sequence can be restarted.
pub fn segment(text: &str) -> Sentences<'_> {
    Sentences { text, pos: 0 }
}

#[derive(Debug, Clone)]
pub struct Sentences<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for Sentences<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while self.pos < self.text.len() {
            let start = self.pos;
            let mut search = start;
            let end = loop {
                match BOUNDARY.find_at(self.text, search) {
                    Some(m) => {
                        let cut = m.start() + m.as_str().trim_end().len();
                        if ends_with_abbreviation(&self.text[start..cut]) {
                            search = m.end();
                            continue;
                        }
                        self.pos = m.end();
                        break cut;
                    }
                    None => {
                        self.pos = self.text.len();
                        break self.text.len();
                    }
                }
            };

            let sentence = self.text[start..end].trim();
            if !sentence.is_empty() {
                return Some(sentence);
            }
        }
        None
    }
}

fn ends_with_abbreviation(candidate: &str) -> bool {
    let last_word = candidate
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default()
        .to_lowercase();
    ABBREVIATIONS.contains(&last_word.as_str())
}
