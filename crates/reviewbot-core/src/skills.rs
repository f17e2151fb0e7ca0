use std::fmt;
use std::path::Path;

use crate::error::JobError;

/// `<category>` component of a predefined skill's path, `<root>/predefined/<category>/<id>.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkillCategory {
    Languages,
    Frameworks,
    Patterns,
    Testing,
    Infra,
}

impl SkillCategory {
    const ALL: [SkillCategory; 5] = [
        SkillCategory::Languages,
        SkillCategory::Frameworks,
        SkillCategory::Patterns,
        SkillCategory::Testing,
        SkillCategory::Infra,
    ];

    fn dir_name(&self) -> &'static str {
        match self {
            SkillCategory::Languages => "languages",
            SkillCategory::Frameworks => "frameworks",
            SkillCategory::Patterns => "patterns",
            SkillCategory::Testing => "testing",
            SkillCategory::Infra => "infra",
        }
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub id: String,
    pub display_name: String,
    pub category: SkillCategory,
    pub body: String,
}

/// The predefined skills catalog, loaded eagerly at startup from a read-only
/// on-disk directory tree and held immutably for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct SkillsCatalog {
    skills: Vec<Skill>,
}

impl SkillsCatalog {
    /// Load every `<root>/predefined/<category>/<id>.md` file. A category
    /// directory that doesn't exist is simply skipped, not an error — the
    /// catalog degrades gracefully rather than refusing to start.
    pub fn load(root: &Path) -> Result<Self, JobError> {
        let mut skills = Vec::new();
        let predefined = root.join("predefined");
        for category in SkillCategory::ALL {
            let dir = predefined.join(category.dir_name());
            if !dir.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| JobError::Config(format!("reading skills dir {dir:?}: {e}")))?;
            for entry in entries {
                let entry =
                    entry.map_err(|e| JobError::Config(format!("reading skills dir entry: {e}")))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                let body = std::fs::read_to_string(&path)
                    .map_err(|e| JobError::Config(format!("reading skill {path:?}: {e}")))?;
                let display_name = first_heading(&body).unwrap_or_else(|| id.clone());
                skills.push(Skill {
                    id,
                    display_name,
                    category,
                    body,
                });
            }
        }
        Ok(Self { skills })
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Render the full catalog, grouped by category, for inclusion in a system prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for category in SkillCategory::ALL {
            let in_category: Vec<&Skill> =
                self.skills.iter().filter(|s| s.category == category).collect();
            if in_category.is_empty() {
                continue;
            }
            out.push_str(&format!("## {category}\n\n"));
            for skill in in_category {
                out.push_str(&format!("### {}\n\n{}\n\n", skill.display_name, skill.body));
            }
        }
        out
    }
}

/// Extract the text of the first `## Heading` line in a markdown body.
fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find(|l| l.trim_start().starts_with("## "))
        .map(|l| l.trim_start().trim_start_matches("## ").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_heading_extracts_display_name() {
        let body = "Some intro text\n\n## Rust Error Handling\n\nBody...\n";
        assert_eq!(first_heading(body), Some("Rust Error Handling".to_string()));
    }

    #[test]
    fn first_heading_none_when_absent() {
        assert_eq!(first_heading("no heading here"), None);
    }

    #[test]
    fn load_from_missing_root_yields_empty_catalog() {
        let catalog = SkillsCatalog::load(Path::new("/nonexistent/does/not/exist")).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.render(), "");
    }

    #[test]
    fn load_reads_predefined_tree() {
        let dir = std::env::temp_dir().join(format!(
            "reviewbot-skills-test-{}",
            std::process::id()
        ));
        let cat_dir = dir.join("predefined").join("testing");
        std::fs::create_dir_all(&cat_dir).unwrap();
        std::fs::write(
            cat_dir.join("unit-tests.md"),
            "intro\n\n## Unit Test Coverage\n\nWrite tests for new branches.\n",
        )
        .unwrap();

        let catalog = SkillsCatalog::load(&dir).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.render().contains("Unit Test Coverage"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
