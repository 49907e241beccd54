//! System roles and prompt templates used by the state machines.
//!
//! Every prompt has a built-in default. A map of overrides, usually read from
//! a directory of `<name>.md` files, can replace any of them.

use crate::{
    category::CategoryKey,
    completion::{CompletionRequest, ValidationError},
};
use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, warn};

const TUTOR: &str = "You are an English teacher who also speaks Arabic. Your responsibilities are:

1. Correct the user's English sentences:
    - Provide the corrected version of the sentence if not correct.
    - Explain the corrections in simple English.
    - Provide the explanation in Arabic as well.

2. Handle Arabic messages as follows:
    - Respond with the original Arabic sentence.
    - Translate the sentence into English.
    - Explain the meaning in simple English.

Your goal is to make learning English easy and accessible by leveraging both languages effectively.";

const LESSON_SYSTEM: &str = "You provide English lessons with Arabic translations.";
const ADVANCED_SYSTEM: &str = "You provide advanced English lessons with Arabic translations.";
const LESSON_REQUEST: &str = "Provide a lesson for the category \"{category}\" in English with Arabic translations. Include examples as individual points.";
const ADVANCED_REQUEST: &str = "Provide an advanced lesson for the category \"{category}\" in English with Arabic translations. Include examples as individual points.";

/// Generation cap applied to lesson fetches.
pub const LESSON_MAX_TOKENS: u32 = 1000;

/// Which lesson flavour to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonVariant {
    Standard,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub tutor: String,
    pub lesson_system: String,
    pub advanced_system: String,
    /// Template; `{category}` is replaced with the category key.
    pub lesson_request: String,
    /// Template; `{category}` is replaced with the category key.
    pub advanced_request: String,
    pub lesson_max_tokens: u32,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            tutor: TUTOR.to_string(),
            lesson_system: LESSON_SYSTEM.to_string(),
            advanced_system: ADVANCED_SYSTEM.to_string(),
            lesson_request: LESSON_REQUEST.to_string(),
            advanced_request: ADVANCED_REQUEST.to_string(),
            lesson_max_tokens: LESSON_MAX_TOKENS,
        }
    }
}

impl Prompts {
    /// Applies overrides keyed by prompt name. Unknown keys are ignored.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (name, text) in overrides {
            let slot = match name.as_str() {
                "tutor" => &mut self.tutor,
                "lesson_system" => &mut self.lesson_system,
                "advanced_system" => &mut self.advanced_system,
                "lesson_request" => &mut self.lesson_request,
                "advanced_request" => &mut self.advanced_request,
                other => {
                    warn!(prompt = %other, "Ignoring unknown prompt override");
                    continue;
                }
            };
            debug!(prompt = %name, "Applying prompt override");
            *slot = text.trim().to_string();
        }
        self
    }

    /// Loads defaults overridden by every `*.md` file in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut overrides = HashMap::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompts directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .context("Could not get file stem")?
                    .to_string();
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt {}", path.display()))?;
                overrides.insert(name, content);
            }
        }
        Ok(Self::default().with_overrides(&overrides))
    }

    /// The request sent for one chat submission.
    pub fn chat_request(&self, text: &str) -> Result<CompletionRequest, ValidationError> {
        CompletionRequest::new(self.tutor.clone(), text)
    }

    /// The request sent to fetch a lesson for `key`.
    pub fn lesson_request(
        &self,
        key: &CategoryKey,
        variant: LessonVariant,
    ) -> Result<CompletionRequest, ValidationError> {
        let (system, template) = match variant {
            LessonVariant::Standard => (&self.lesson_system, &self.lesson_request),
            LessonVariant::Advanced => (&self.advanced_system, &self.advanced_request),
        };
        let prompt = template.replace("{category}", key.as_str());
        Ok(CompletionRequest::new(system.clone(), prompt)?.with_max_tokens(self.lesson_max_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_request_names_category() {
        let prompts = Prompts::default();
        let request = prompts
            .lesson_request(&"Grammar".into(), LessonVariant::Standard)
            .unwrap();
        assert_eq!(request.system_role(), LESSON_SYSTEM);
        assert!(request.user_text().contains("\"Grammar\""));
        assert!(request.user_text().starts_with("Provide a lesson"));
        assert_eq!(request.max_tokens(), Some(1000));

        let advanced = prompts
            .lesson_request(&"Idioms".into(), LessonVariant::Advanced)
            .unwrap();
        assert_eq!(advanced.system_role(), ADVANCED_SYSTEM);
        assert!(advanced.user_text().starts_with("Provide an advanced lesson"));
    }

    #[test]
    fn test_chat_request_has_no_cap() {
        let request = Prompts::default().chat_request("I goes home").unwrap();
        assert_eq!(request.max_tokens(), None);
        assert!(request.system_role().contains("English teacher"));
        assert!(Prompts::default().chat_request("  ").is_err());
    }

    #[test]
    fn test_overrides_replace_known_prompts() {
        let mut overrides = HashMap::new();
        overrides.insert("tutor".to_string(), "Be brief.\n".to_string());
        overrides.insert("unknown".to_string(), "x".to_string());
        let prompts = Prompts::default().with_overrides(&overrides);
        assert_eq!(prompts.tutor, "Be brief.");
        assert_eq!(prompts.lesson_system, LESSON_SYSTEM);
    }

    #[test]
    fn test_from_dir_reads_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lesson_system.md"), "Teach slowly.").unwrap();
        fs::write(dir.path().join("tutor.txt"), "ignored").unwrap();

        let prompts = Prompts::from_dir(dir.path()).unwrap();
        assert_eq!(prompts.lesson_system, "Teach slowly.");
        assert_eq!(prompts.tutor, TUTOR);
    }

    #[test]
    fn test_from_dir_missing_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Prompts::from_dir(&dir.path().join("nope")).is_err());
    }
}
