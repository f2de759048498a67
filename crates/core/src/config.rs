use crate::conflict::ConflictResolution;
use crate::finalize::PostProcessingOptions;
use crate::record::MediaType;
use crate::template::{TemplateError, TemplateSet, DEFAULT_MOVIE_TEMPLATE, DEFAULT_TV_TEMPLATE};
use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub movie_template: String,
    pub tv_template: String,
    pub library_root: Option<PathBuf>,
    pub cleanup_roots: Vec<PathBuf>,
    pub conflict_resolution: ConflictResolution,
    pub copy_mode: bool,
    pub cleanup_empty_dirs: bool,
    pub target_folders: BTreeMap<String, PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            movie_template: DEFAULT_MOVIE_TEMPLATE.to_string(),
            tv_template: DEFAULT_TV_TEMPLATE.to_string(),
            library_root: None,
            cleanup_roots: Vec::new(),
            conflict_resolution: ConflictResolution::Skip,
            copy_mode: false,
            cleanup_empty_dirs: false,
            target_folders: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn layout(&self) -> LibraryLayoutConfig {
        LibraryLayoutConfig {
            library_root: self.library_root.clone(),
            target_folders: self.target_folders.clone(),
            cleanup_roots: self.cleanup_roots.clone(),
        }
    }

    pub fn templates(&self) -> Result<TemplateSet, TemplateError> {
        TemplateSet::new(&self.movie_template, &self.tv_template)
    }

    pub fn post_processing_options(&self, dry_run: bool) -> PostProcessingOptions {
        PostProcessingOptions {
            dry_run,
            copy_mode: self.copy_mode,
            conflict_resolution: self.conflict_resolution,
            cleanup_empty_dirs: self.cleanup_empty_dirs,
        }
    }
}

/// Where each media type lands inside the library, passed explicitly to the finalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryLayoutConfig {
    pub library_root: Option<PathBuf>,
    pub target_folders: BTreeMap<String, PathBuf>,
    /// Extra directories (typically download/scan roots) inside which
    /// emptied source folders may be removed.
    pub cleanup_roots: Vec<PathBuf>,
}

impl LibraryLayoutConfig {
    pub fn with_library_root(root: impl Into<PathBuf>) -> Self {
        Self {
            library_root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn with_target_folder(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.target_folders.insert(key.into(), path.into());
        self
    }

    pub fn with_cleanup_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cleanup_roots.push(path.into());
        self
    }

    pub fn get_target_folder(&self, key: &str) -> Option<&Path> {
        self.target_folders.get(key).map(PathBuf::as_path)
    }

    pub fn library_root(&self) -> Option<&Path> {
        self.library_root.as_deref()
    }

    /// The configured library root, else `<videos>/Library` of the current user.
    pub fn default_library_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.library_root {
            return Some(root.clone());
        }
        let dirs = UserDirs::new()?;
        let base = dirs
            .video_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.home_dir().join("Videos"));
        Some(base.join("Library"))
    }

    pub fn target_root(&self, media_type: MediaType) -> Option<PathBuf> {
        media_type
            .folder_keys()
            .iter()
            .find_map(|key| self.get_target_folder(key))
            .map(Path::to_path_buf)
            .or_else(|| {
                self.default_library_root()
                    .map(|root| root.join(media_type.fallback_dir_name()))
            })
    }

    /// Directories that bound empty-directory cleanup; none of them is ever removed.
    pub fn cleanup_boundaries(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(root) = self.default_library_root() {
            out.push(root);
        }
        out.extend(self.target_folders.values().cloned());
        out.extend(self.cleanup_roots.iter().cloned());
        out
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("org", "media-organizer", "media-organizer")
        .context("could not determine the OS config directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

/// Reads a config file; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read config file: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("could not parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let paths = app_paths()?;
    save_config_to(&paths.config_path, config)?;
    Ok(paths.config_path)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create config directory: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("could not serialize config")?;
    fs::write(path, body)
        .with_context(|| format!("could not write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("absent.toml")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.movie_template, DEFAULT_MOVIE_TEMPLATE);
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_keys() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            concat!(
                "library_root = \"/srv/media\"\n",
                "conflict_resolution = \"rename\"\n\n",
                "[target_folders]\n",
                "tv_shows = \"/srv/shows\"\n",
            ),
        )
        .expect("write config");

        let config = load_config_from(&path).expect("parse");
        assert_eq!(config.library_root, Some(PathBuf::from("/srv/media")));
        assert_eq!(config.conflict_resolution, ConflictResolution::Rename);
        assert_eq!(config.tv_template, DEFAULT_TV_TEMPLATE);

        let options = config.post_processing_options(true);
        assert!(options.dry_run);
        assert_eq!(options.conflict_resolution, ConflictResolution::Rename);
    }

    #[test]
    fn saved_config_loads_back() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.cleanup_empty_dirs = true;
        config.cleanup_roots.push(PathBuf::from("/downloads"));

        save_config_to(&path, &config).expect("save");
        assert_eq!(load_config_from(&path).expect("load"), config);
    }

    #[test]
    fn target_root_follows_folder_keys_then_library_root() {
        let layout = LibraryLayoutConfig::with_library_root("/srv/media")
            .with_target_folder("tv_shows", "/srv/shows");
        assert_eq!(layout.target_root(MediaType::Tv), Some(PathBuf::from("/srv/shows")));
        assert_eq!(
            layout.target_root(MediaType::Movie),
            Some(PathBuf::from("/srv/media/Movie"))
        );

        let layout = layout
            .with_target_folder("tv", "/srv/tv")
            .with_target_folder("movies", "/srv/movies");
        assert_eq!(layout.target_root(MediaType::Tv), Some(PathBuf::from("/srv/tv")));
        assert_eq!(layout.target_root(MediaType::Movie), Some(PathBuf::from("/srv/movies")));
    }

    #[test]
    fn cleanup_boundaries_cover_every_configured_root() {
        let layout = LibraryLayoutConfig::with_library_root("/srv/media")
            .with_target_folder("movies", "/srv/movies")
            .with_cleanup_root("/downloads");
        assert_eq!(
            layout.cleanup_boundaries(),
            vec![
                PathBuf::from("/srv/media"),
                PathBuf::from("/srv/movies"),
                PathBuf::from("/downloads"),
            ]
        );
    }

    #[test]
    fn cleanup_boundaries_fall_back_to_default_library_root() {
        let layout = LibraryLayoutConfig::default();
        let expected: Vec<PathBuf> = layout.default_library_root().into_iter().collect();
        assert_eq!(layout.cleanup_boundaries(), expected);
    }
}
