//! Templated SQL queries.
//!
//! A template is plain SQL with substitution slots in braces, e.g.
//! `SELECT * FROM vehicle WHERE vin IN ('{vin*3}') AND time > '{start}'`.
//! The key inside the braces is lower-cased; an optional `*N` suffix asks the
//! caller for `N` consecutive values joined by `,`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unmatched '{{' at byte {position}")]
    UnclosedBrace { position: usize },

    #[error("unmatched '}}' at byte {position}")]
    UnmatchedClose { position: usize },

    #[error("nested '{{' at byte {position}")]
    Nested { position: usize },

    #[error("empty substitution key at byte {position}")]
    EmptyKeyword { position: usize },

    #[error("invalid repeat count '{value}' at byte {position}")]
    InvalidRepeat { position: usize, value: String },
}

/// A parsed query template: literal segments interleaved with keywords.
///
/// `segments[i]` precedes `keywords[i]`. A trailing literal after the last
/// keyword is kept only when it is non-empty, so there are either
/// `keywords.len()` or `keywords.len() + 1` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    segments: Vec<String>,
    keywords: Vec<String>,
    repeats: Vec<usize>,
}

impl SqlTemplate {
    /// Parse a template in a single pass.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut keywords = Vec::new();
        let mut repeats = Vec::new();

        let mut literal_start = 0;
        let mut open: Option<usize> = None;

        for (pos, ch) in text.char_indices() {
            match ch {
                '{' => {
                    if open.is_some() {
                        return Err(TemplateError::Nested { position: pos });
                    }
                    segments.push(text[literal_start..pos].to_string());
                    open = Some(pos);
                }
                '}' => {
                    let start = open
                        .take()
                        .ok_or(TemplateError::UnmatchedClose { position: pos })?;
                    let (keyword, repeat) = parse_slot(&text[start + 1..pos], start)?;
                    keywords.push(keyword);
                    repeats.push(repeat);
                    literal_start = pos + 1;
                }
                _ => {}
            }
        }

        if let Some(position) = open {
            return Err(TemplateError::UnclosedBrace { position });
        }
        if literal_start < text.len() {
            segments.push(text[literal_start..].to_string());
        }

        Ok(Self {
            segments,
            keywords,
            repeats,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn repeats(&self) -> &[usize] {
        &self.repeats
    }

    /// Write the template into `out`, asking `resolve` to append the value
    /// for each `(keyword, repeat)` slot.
    pub fn render<F>(&self, out: &mut String, mut resolve: F)
    where
        F: FnMut(&str, usize, &mut String),
    {
        for (i, keyword) in self.keywords.iter().enumerate() {
            out.push_str(&self.segments[i]);
            resolve(keyword, self.repeats[i], out);
        }
        if self.segments.len() > self.keywords.len() {
            out.push_str(&self.segments[self.keywords.len()]);
        }
    }
}

/// Split `key*N` into a lower-cased key and repeat count (default 1).
fn parse_slot(raw: &str, position: usize) -> Result<(String, usize), TemplateError> {
    let lowered = raw.trim().to_lowercase();
    let (key, repeat) = match lowered.split_once('*') {
        Some((key, count)) => {
            let repeat = count
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| TemplateError::InvalidRepeat {
                    position,
                    value: count.trim().to_string(),
                })?;
            (key.trim().to_string(), repeat)
        }
        None => (lowered, 1),
    };

    if key.is_empty() {
        return Err(TemplateError::EmptyKeyword { position });
    }
    Ok((key, repeat))
}
