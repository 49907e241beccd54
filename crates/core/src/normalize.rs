//! Content Normalizer
//!
//! Turns raw completion text into displayable units and tags each unit with
//! the writing direction a renderer should use.

use serde::{Deserialize, Serialize};

/// Shown when a reply yields no usable lines.
pub const NO_CONTENT: &str = "No content available.";

/// Writing direction of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
}

impl TextDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextDirection::Ltr => "ltr",
            TextDirection::Rtl => "rtl",
        }
    }
}

/// Returns `Rtl` iff `text` contains a code point in the Arabic block.
pub fn classify_direction(text: &str) -> TextDirection {
    if text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) {
        TextDirection::Rtl
    } else {
        TextDirection::Ltr
    }
}

/// An ordered list of lesson points. Never holds a blank entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LessonContent(Vec<String>);

impl LessonContent {
    /// Content with no points, as displayed before any category is loaded.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Puts `entry` in front of the existing points. Blank entries are ignored.
    pub fn prepend(&mut self, entry: impl Into<String>) -> bool {
        let entry = entry.into();
        if entry.trim().is_empty() {
            return false;
        }
        self.0.insert(0, entry);
        true
    }

    /// Pairs every line with its writing direction.
    pub fn display_lines(&self) -> Vec<DisplayLine> {
        self.0.iter().map(|line| DisplayLine::new(line)).collect()
    }
}

/// A line of text with the direction it should be rendered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayLine {
    pub text: String,
    pub direction: TextDirection,
}

impl DisplayLine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            direction: classify_direction(text),
        }
    }
}

/// Splits a lesson reply into its non-blank lines, in order.
///
/// Kept lines are left as written, indentation included. A reply with no
/// usable lines becomes the single [`NO_CONTENT`] entry.
pub fn normalize_lesson(raw: &str) -> LessonContent {
    let lines: Vec<String> = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        LessonContent(vec![NO_CONTENT.to_string()])
    } else {
        LessonContent(lines)
    }
}
