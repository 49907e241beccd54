use serde::{Deserialize, Serialize};
use std::fmt;

/// The lesson topics offered out of the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Grammar,
    Vocabulary,
    Pronunciation,
    SentenceStructure,
    Idioms,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Grammar,
        Category::Vocabulary,
        Category::Pronunciation,
        Category::SentenceStructure,
        Category::Idioms,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Grammar => "Grammar",
            Category::Vocabulary => "Vocabulary",
            Category::Pronunciation => "Pronunciation",
            Category::SentenceStructure => "Sentence Structure",
            Category::Idioms => "Idioms",
        }
    }

    /// Looks up a built-in category by its label, ignoring case.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

/// Identifies a lesson topic: a built-in label or a user-authored title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The built-in category this key names, if any.
    pub fn builtin(&self) -> Option<Category> {
        Category::from_label(&self.0)
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Category> for CategoryKey {
    fn from(category: Category) -> Self {
        Self(category.label().to_string())
    }
}

impl From<&str> for CategoryKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for CategoryKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(
            CategoryKey::from("sentence structure").builtin(),
            Some(Category::SentenceStructure)
        );
        assert_eq!(CategoryKey::from("My own lesson").builtin(), None);
        assert_eq!(CategoryKey::from(Category::Idioms).as_str(), "Idioms");
    }

    #[test]
    fn test_key_serializes_as_plain_string() {
        let key = CategoryKey::from("Grammar");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"Grammar\"");
    }
}
