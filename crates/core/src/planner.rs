use crate::record::{MediaRecord, RenameOperation};
use crate::template::{TemplateError, TemplateSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RenameStats {
    pub records: usize,
    pub unmatched: usize,
    pub planned: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenamePlan {
    pub operations: Vec<RenameOperation>,
    pub stats: RenameStats,
}

/// Renders every matched record into a rename operation.
///
/// Unmatched records are counted and left out. The first record whose
/// template cannot be rendered aborts planning.
pub fn plan_renames(
    records: &[MediaRecord],
    templates: &TemplateSet,
    base_dir: Option<&Path>,
) -> Result<RenamePlan, TemplateError> {
    let mut stats = RenameStats {
        records: records.len(),
        ..RenameStats::default()
    };
    let mut operations = Vec::with_capacity(records.len());

    for record in records {
        if !record.matched {
            stats.unmatched += 1;
            continue;
        }
        let target = templates.render(record, base_dir)?;
        if target == record.source_path {
            stats.unchanged += 1;
        }
        stats.planned += 1;
        operations.push(RenameOperation::new(record.clone(), target));
    }

    Ok(RenamePlan { operations, stats })
}

/// Renders a single record the way a plan would, for previews.
pub fn render_preview_sample(
    templates: &TemplateSet,
    record: &MediaRecord,
    base_dir: Option<&Path>,
) -> Result<String, TemplateError> {
    let path = templates.render(record, base_dir)?;
    Ok(path.to_string_lossy().to_string())
}
