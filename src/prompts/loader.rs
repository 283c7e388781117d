use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::templates::{ProfessionTemplate, TemplateRegistry, PREAMBLE_DEFAULT};

/// Loads prompt pieces from `<data>/prompts`, falling back to built-in defaults
pub struct PromptLoader {
    prompts_dir: PathBuf,
}

impl PromptLoader {
    pub fn new(data_path: impl AsRef<Path>) -> Self {
        Self {
            prompts_dir: data_path.as_ref().join("prompts"),
        }
    }

    /// Load the shared preamble, using the default if no file exists
    pub fn load_preamble(&self) -> Result<String> {
        let path = self.prompts_dir.join("preamble.md");
        if path.exists() {
            log::debug!("Loading prompt preamble from: {:?}", path);
            return fs::read_to_string(&path).with_context(|| format!("Failed to read preamble {:?}", path));
        }

        log::debug!("Using default prompt preamble");
        Ok(PREAMBLE_DEFAULT.to_string())
    }

    /// Built-in profession templates with `professions.json` entries layered
    /// on top. A missing file is fine; a malformed one is an error.
    pub fn load_registry(&self) -> Result<TemplateRegistry> {
        let mut registry = TemplateRegistry::default();
        let path = self.prompts_dir.join("professions.json");
        if !path.exists() {
            return Ok(registry);
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let overrides: Vec<ProfessionTemplate> =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

        log::info!("📝 Loaded {} profession template overrides", overrides.len());
        registry.extend(overrides);
        Ok(registry)
    }
}
