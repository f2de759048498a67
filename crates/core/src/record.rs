use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    /// Config keys consulted, in order, for this media type's target folder.
    pub fn folder_keys(&self) -> &'static [&'static str] {
        match self {
            MediaType::Movie => &["movies"],
            MediaType::Tv => &["tv", "tv_shows"],
        }
    }

    /// Folder name used under the default library root when no folder is configured.
    pub fn fallback_dir_name(&self) -> &'static str {
        match self {
            MediaType::Movie => "Movie",
            MediaType::Tv => "TV",
        }
    }
}

/// A matched media file as produced by the scanner/matcher stage.
///
/// `source_path` is the only field this crate writes: after a successful
/// finalization it points at the file's new location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRecord {
    pub source_path: PathBuf,
    pub title: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub extension: String,
    #[serde(default = "default_matched")]
    pub matched: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_matched() -> bool {
    true
}

impl MediaRecord {
    pub fn new(
        source_path: impl Into<PathBuf>,
        title: impl Into<String>,
        media_type: MediaType,
    ) -> Self {
        let source_path = source_path.into();
        let extension = extension_of(&source_path);
        Self {
            source_path,
            title: title.into(),
            media_type,
            year: None,
            season: None,
            episode: None,
            extension,
            matched: true,
            extra: BTreeMap::new(),
        }
    }

    pub fn movie(source_path: impl Into<PathBuf>, title: impl Into<String>, year: u32) -> Self {
        let mut record = Self::new(source_path, title, MediaType::Movie);
        record.year = Some(year);
        record
    }

    pub fn episode(
        source_path: impl Into<PathBuf>,
        title: impl Into<String>,
        season: u32,
        episode: u32,
    ) -> Self {
        let mut record = Self::new(source_path, title, MediaType::Tv);
        record.season = Some(season);
        record.episode = Some(episode);
        record
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The extension with exactly one leading dot, or an empty string.
    pub fn extension_with_dot(&self) -> String {
        let trimmed = self.extension.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!(".{trimmed}")
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// One planned move of a flat batch rename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameOperation {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub record: MediaRecord,
    #[serde(default)]
    pub executed: bool,
}

impl RenameOperation {
    pub fn new(record: MediaRecord, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: record.source_path.clone(),
            target_path: target_path.into(),
            record,
            executed: false,
        }
    }
}

pub fn load_manifest(path: &Path) -> Result<Vec<MediaRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read manifest: {}", path.display()))?;
    let records = serde_json::from_str::<Vec<MediaRecord>>(&raw)
        .with_context(|| format!("manifest is not a list of media records: {}", path.display()))?;
    Ok(records)
}

pub fn save_manifest(path: &Path, records: &[MediaRecord]) -> Result<()> {
    let body = serde_json::to_string_pretty(records).context("could not serialize manifest")?;
    fs::write(path, body)
        .with_context(|| format!("could not write manifest: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_manifest, save_manifest, MediaRecord, MediaType};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extension_is_taken_from_source_path() {
        let record = MediaRecord::movie("/downloads/inception.MKV", "Inception", 2010);
        assert_eq!(record.extension, ".MKV");
        assert_eq!(record.extension_with_dot(), ".MKV");
    }

    #[test]
    fn extension_with_dot_normalizes_missing_or_doubled_dot() {
        let mut record = MediaRecord::movie("/downloads/inception", "Inception", 2010);
        assert_eq!(record.extension_with_dot(), "");

        record.extension = "mkv".to_string();
        assert_eq!(record.extension_with_dot(), ".mkv");

        record.extension = "..mkv".to_string();
        assert_eq!(record.extension_with_dot(), ".mkv");
    }

    #[test]
    fn manifest_fields_default_when_absent() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.json");
        fs::write(
            &path,
            r#"[{"source_path": "/in/a.mkv", "title": "A", "media_type": "tv", "season": 1}]"#,
        )
        .expect("write manifest");

        let records = load_manifest(&path).expect("manifest should parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].media_type, MediaType::Tv);
        assert!(records[0].matched);
        assert_eq!(records[0].season, Some(1));
        assert_eq!(records[0].episode, None);
        assert!(records[0].extra.is_empty());
    }

    #[test]
    fn manifest_survives_save_and_load() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("records.json");
        let records = vec![
            MediaRecord::episode("/in/show.s01e02.mkv", "Show", 1, 2).with_extra("quality", "1080p")
        ];

        save_manifest(&path, &records).expect("save");
        let loaded = load_manifest(&path).expect("load");
        assert_eq!(loaded, records);
    }
}
