//! Assembles the system instruction from a prompt folder:
//!
//! ```text
//! prompt_folder/
//!     system_prompt.txt   template with a {{CATEGORIES}} placeholder
//!     categories/
//!         <category_name>.txt
//! ```

use anyhow::Context;
use std::path::{Path, PathBuf};

pub const CATEGORIES_PLACEHOLDER: &str = "{{CATEGORIES}}";
pub const UNCLASSIFIED_CATEGORY: &str = "unclassified";

#[derive(Debug, Clone)]
pub struct PromptSource {
    template: String,
    /// (name, definition), sorted by name.
    categories: Vec<(String, String)>,
}

impl PromptSource {
    pub fn new<S: Into<String>>(template: S, categories: Vec<(String, String)>) -> Self {
        let mut categories = categories;
        categories.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            template: template.into(),
            categories,
        }
    }

    pub fn load<P: AsRef<Path>>(prompt_folder: P) -> crate::Result<Self> {
        let prompt_folder = prompt_folder.as_ref();
        let template_path = prompt_folder.join("system_prompt.txt");
        let template = std::fs::read_to_string(&template_path)
            .with_context(|| format!("failed to read {}", template_path.display()))?;

        let categories = load_categories(&prompt_folder.join("categories"))?;
        crate::debug!(count = categories.len(), "Loaded category definitions");
        Ok(Self::new(template, categories))
    }

    pub fn system_prompt(&self) -> String {
        let section = self
            .categories
            .iter()
            .map(|(name, definition)| format!("**{name}**\n{definition}\n"))
            .collect::<Vec<_>>()
            .join("\n");
        self.template.replace(CATEGORIES_PLACEHOLDER, &section)
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    /// Category names plus the catch-all `unclassified`.
    pub fn valid_categories(&self) -> Vec<String> {
        let mut valid: Vec<String> = self.category_names().map(str::to_string).collect();
        if !valid.iter().any(|c| c == UNCLASSIFIED_CATEGORY) {
            valid.push(UNCLASSIFIED_CATEGORY.to_string());
        }
        valid
    }
}

fn load_categories(categories_dir: &Path) -> crate::Result<Vec<(String, String)>> {
    if !categories_dir.is_dir() {
        crate::warn!(
            "No categories directory at {}; the prompt will list no categories",
            categories_dir.display()
        );
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(categories_dir)
        .with_context(|| format!("failed to list {}", categories_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut categories = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            crate::warn!("Skipping category file with non UTF-8 name: {}", path.display());
            continue;
        };
        let definition = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        categories.push((name.to_string(), definition));
    }
    Ok(categories)
}
