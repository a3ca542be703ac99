//! TOML rubric and mark sheet parser.
//!
//! Loads rubrics and award sheets from TOML files, and validates rubrics.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{AwardedMark, Rubric, RubricItem, Stage};

#[derive(Debug, Deserialize)]
struct TomlRubricFile {
    rubric: TomlRubricHeader,
    #[serde(default)]
    items: Vec<RubricItem>,
}

#[derive(Debug, Deserialize)]
struct TomlRubricHeader {
    coordinator_id: String,
    program: String,
}

#[derive(Debug, Deserialize)]
struct TomlMarkSheetFile {
    #[serde(default)]
    sheet: TomlSheetHeader,
    #[serde(default)]
    marks: Vec<AwardedMark>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSheetHeader {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    coordinator_id: Option<String>,
}

/// Marks entered for one student or group, as read from a file.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkSheet {
    pub program: Option<String>,
    pub coordinator_id: Option<String>,
    pub marks: Vec<AwardedMark>,
}

/// Parse a rubric file.
pub fn parse_rubric(path: &Path) -> Result<Rubric> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rubric file: {}", path.display()))?;
    parse_rubric_str(&content, path)
}

/// Parse a rubric from a TOML string.
///
/// Items without an `id` are kept that way; identifiers are assigned when the
/// rubric is saved.
pub fn parse_rubric_str(content: &str, source_path: &Path) -> Result<Rubric> {
    let parsed: TomlRubricFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    if parsed.rubric.program.trim().is_empty() {
        anyhow::bail!("{}: rubric.program is empty", source_path.display());
    }

    Ok(Rubric::new(parsed.rubric.coordinator_id, parsed.rubric.program).with_items(parsed.items))
}

/// Parse a mark sheet file.
pub fn parse_mark_sheet(path: &Path) -> Result<MarkSheet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mark sheet: {}", path.display()))?;
    parse_mark_sheet_str(&content, path)
}

pub fn parse_mark_sheet_str(content: &str, source_path: &Path) -> Result<MarkSheet> {
    let parsed: TomlMarkSheetFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    Ok(MarkSheet {
        program: parsed.sheet.program,
        coordinator_id: parsed.sheet.coordinator_id,
        marks: parsed.marks,
    })
}

/// A warning from rubric validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Zero-based item index (if applicable).
    pub item_index: Option<usize>,
    pub message: String,
}

/// Validate a rubric for common issues.
pub fn validate_rubric(rubric: &Rubric) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if rubric.is_empty() {
        warnings.push(ValidationWarning {
            item_index: None,
            message: "rubric has no items; submissions will fail until items are added".into(),
        });
        return warnings;
    }

    // Legacy mark rows are matched on the stage-1 description
    let mut seen_descriptions = HashSet::new();
    let mut seen_ids = HashSet::new();
    for (index, item) in rubric.items.iter().enumerate() {
        let description = item.description().trim();
        if description.is_empty() {
            warnings.push(ValidationWarning {
                item_index: Some(index),
                message: "stage R1 description is blank".into(),
            });
        } else if !seen_descriptions.insert(description) {
            warnings.push(ValidationWarning {
                item_index: Some(index),
                message: format!("duplicate description: {description}"),
            });
        }

        if let Some(id) = item.id {
            if !seen_ids.insert(id) {
                warnings.push(ValidationWarning {
                    item_index: Some(index),
                    message: format!("duplicate item id: {id}"),
                });
            }
        }
    }

    for stage in Stage::ALL {
        if rubric.max_total(stage) == 0 {
            warnings.push(ValidationWarning {
                item_index: None,
                message: format!("every item has max_mark 0 for {stage}; its assessment is always 0"),
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const RUBRIC_TOML: &str = r#"
[rubric]
coordinator_id = "coord-01"
program = "BE-CSE"

[[items]]
id = "6f1c1d0a-8a53-4b1e-9a51-3c1b1f0e2d11"
r1 = { description = "Problem statement", max_mark = 10 }
r2 = { description = "Implementation", max_mark = 20 }
r3 = { description = "Final demo", max_mark = 10 }

[[items]]
r1 = { description = "Literature survey", max_mark = 10 }
r2 = { description = "Testing", max_mark = 10 }
"#;

    const SHEET_TOML: &str = r#"
[sheet]
program = "BE-CSE"

[[marks]]
item_id = "6f1c1d0a-8a53-4b1e-9a51-3c1b1f0e2d11"
description = "Problem statement"
r1 = 8
r2 = 12.5
r3 = 10

[[marks]]
description = "Literature survey"
r1 = 6
"#;

    #[test]
    fn parse_valid_rubric() {
        let rubric = parse_rubric_str(RUBRIC_TOML, &PathBuf::from("rubric.toml")).unwrap();
        assert_eq!(rubric.coordinator_id, "coord-01");
        assert_eq!(rubric.program, "BE-CSE");
        assert_eq!(rubric.items.len(), 2);
        assert!(rubric.items[0].id.is_some());
        assert!(rubric.items[1].id.is_none());
        assert_eq!(rubric.items[0].max_mark(Stage::R2), 20);
        // omitted stage defaults to zero
        assert_eq!(rubric.items[1].max_mark(Stage::R3), 0);
        assert_eq!(rubric.max_total(Stage::R1), 20);
    }

    #[test]
    fn parse_mark_sheet_accepts_integers_and_floats() {
        let sheet = parse_mark_sheet_str(SHEET_TOML, &PathBuf::from("marks.toml")).unwrap();
        assert_eq!(sheet.program.as_deref(), Some("BE-CSE"));
        assert!(sheet.coordinator_id.is_none());
        assert_eq!(sheet.marks.len(), 2);
        assert_eq!(sheet.marks[0].r1, 8.0);
        assert_eq!(sheet.marks[0].r2, 12.5);
        assert!(sheet.marks[1].item_id.is_none());
        assert_eq!(sheet.marks[1].r2, 0.0);
    }

    #[test]
    fn sheet_header_is_optional() {
        let sheet = parse_mark_sheet_str(
            "[[marks]]\ndescription = \"x\"\nr1 = 1\n",
            &PathBuf::from("m.toml"),
        )
        .unwrap();
        assert!(sheet.program.is_none());
        assert_eq!(sheet.marks.len(), 1);
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_rubric_str(bad, &PathBuf::from("bad.toml")).is_err());
        assert!(parse_mark_sheet_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn rubric_requires_program() {
        let toml = "[rubric]\ncoordinator_id = \"c\"\nprogram = \" \"\n";
        assert!(parse_rubric_str(toml, &PathBuf::from("r.toml")).is_err());
    }

    #[test]
    fn validate_clean_rubric() {
        let rubric = parse_rubric_str(RUBRIC_TOML, &PathBuf::from("rubric.toml")).unwrap();
        assert!(validate_rubric(&rubric).is_empty());
    }

    #[test]
    fn validate_flags_blank_and_duplicate_descriptions() {
        let mut rubric = parse_rubric_str(RUBRIC_TOML, &PathBuf::from("rubric.toml")).unwrap();
        rubric.items[1].r1.description = "Problem statement ".into();
        let mut blank = rubric.items[0].clone();
        blank.id = None;
        blank.r1.description = "  ".into();
        rubric.items.push(blank);

        let warnings = validate_rubric(&rubric);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].item_index, Some(1));
        assert!(warnings[0].message.contains("duplicate description"));
        assert_eq!(warnings[1].item_index, Some(2));
    }

    #[test]
    fn validate_flags_duplicate_ids_and_zero_stages() {
        let mut rubric = parse_rubric_str(RUBRIC_TOML, &PathBuf::from("rubric.toml")).unwrap();
        rubric.items[1].id = rubric.items[0].id;
        for item in &mut rubric.items {
            item.r3.max_mark = 0;
        }

        let messages: Vec<_> = validate_rubric(&rubric)
            .into_iter()
            .map(|w| w.message)
            .collect();
        assert!(messages.iter().any(|m| m.starts_with("duplicate item id")));
        assert!(messages.iter().any(|m| m.contains("for R3")));
    }

    #[test]
    fn validate_empty_rubric() {
        let warnings = validate_rubric(&Rubric::new("c", "p"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].item_index, None);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.toml");
        std::fs::write(&path, RUBRIC_TOML).unwrap();
        assert_eq!(parse_rubric(&path).unwrap().items.len(), 2);
        assert!(parse_rubric(&dir.path().join("missing.toml")).is_err());
    }
}
