use crate::record::{MediaRecord, MediaType};
use crate::sanitize::sanitize_rendered_path;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MOVIE_TEMPLATE: &str = "Movies/{title} ({year})/{title} ({year}){extension}";
pub const DEFAULT_TV_TEMPLATE: &str =
    "TV/{title}/Season {season02}/{title} - {s00e00}{extension}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,
    #[error("unbalanced braces in template")]
    UnbalancedBraces,
    #[error("invalid placeholder name: {{{0}}}")]
    InvalidPlaceholder(String),
    #[error("unknown placeholder: {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("placeholder {{{placeholder}}} has no value for \"{title}\"")]
    MissingField { placeholder: String, title: String },
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    if input.is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                let mut name = String::new();
                let mut found_close = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        found_close = true;
                        break;
                    }
                    if next == '{' {
                        return Err(TemplateError::UnbalancedBraces);
                    }
                    name.push(next);
                }
                if !found_close {
                    return Err(TemplateError::UnbalancedBraces);
                }
                if !is_placeholder_name(&name) {
                    return Err(TemplateError::InvalidPlaceholder(name));
                }
                parts.push(TemplatePart::Placeholder(name));
            }
            '}' => return Err(TemplateError::UnbalancedBraces),
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    Ok(parts)
}

/// Substitutes every placeholder without sanitizing the result.
pub fn render_template(
    parts: &[TemplatePart],
    record: &MediaRecord,
) -> Result<String, TemplateError> {
    let mut output = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => output.push_str(s),
            TemplatePart::Placeholder(name) => {
                let value = placeholder_value(name, record)?;
                output.push_str(&normalize_value(&value));
            }
        }
    }
    Ok(output)
}

/// Resolves one placeholder against a record.
///
/// Built-in names take precedence over `record.extra`; derived episode
/// placeholders exist only when their raw fields do.
pub fn placeholder_value(name: &str, record: &MediaRecord) -> Result<String, TemplateError> {
    let missing = || TemplateError::MissingField {
        placeholder: name.to_string(),
        title: record.title.clone(),
    };

    let value = match name {
        "title" => record.title.trim().to_string(),
        "year" => record.year.ok_or_else(missing)?.to_string(),
        "season" => record.season.ok_or_else(missing)?.to_string(),
        "episode" => record.episode.ok_or_else(missing)?.to_string(),
        "season02" => format!("{:02}", record.season.ok_or_else(missing)?),
        "episode02" => format!("{:02}", record.episode.ok_or_else(missing)?),
        "s00e00" => {
            let (season, episode) = season_episode(record).ok_or_else(missing)?;
            format!("S{season:02}E{episode:02}")
        }
        "sxee" => {
            let (season, episode) = season_episode(record).ok_or_else(missing)?;
            format!("{season}x{episode}")
        }
        "extension" => record.extension_with_dot(),
        "media_type" => record.media_type.as_str().to_string(),
        other => record
            .extra
            .get(other)
            .cloned()
            .ok_or_else(|| TemplateError::UnknownPlaceholder(other.to_string()))?,
    };
    Ok(value)
}

/// A parsed template that renders records into sanitized paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRenderer {
    template: String,
    parts: Vec<TemplatePart>,
}

impl TemplateRenderer {
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        let parts = parse_template(&template)?;
        Ok(Self { template, parts })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders `record` into a sanitized path.
    ///
    /// Relative results are joined onto `base_dir` when one is given.
    pub fn render(
        &self,
        record: &MediaRecord,
        base_dir: Option<&Path>,
    ) -> Result<PathBuf, TemplateError> {
        let rendered = render_template(&self.parts, record)?;
        let path = sanitize_rendered_path(&rendered);
        match base_dir {
            Some(base) if path.is_relative() => Ok(base.join(path)),
            _ => Ok(path),
        }
    }
}

/// One-shot form of [`TemplateRenderer::render`].
pub fn render(
    template: &str,
    record: &MediaRecord,
    base_dir: Option<&Path>,
) -> Result<PathBuf, TemplateError> {
    TemplateRenderer::new(template)?.render(record, base_dir)
}

/// The per-media-type templates used by planning and finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub movie: TemplateRenderer,
    pub tv: TemplateRenderer,
}

impl TemplateSet {
    pub fn new(movie: &str, tv: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            movie: TemplateRenderer::new(movie)?,
            tv: TemplateRenderer::new(tv)?,
        })
    }

    pub fn for_type(&self, media_type: MediaType) -> &TemplateRenderer {
        match media_type {
            MediaType::Movie => &self.movie,
            MediaType::Tv => &self.tv,
        }
    }

    pub fn render(
        &self,
        record: &MediaRecord,
        base_dir: Option<&Path>,
    ) -> Result<PathBuf, TemplateError> {
        self.for_type(record.media_type).render(record, base_dir)
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            movie: TemplateRenderer {
                template: DEFAULT_MOVIE_TEMPLATE.to_string(),
                parts: default_parts(DEFAULT_MOVIE_TEMPLATE),
            },
            tv: TemplateRenderer {
                template: DEFAULT_TV_TEMPLATE.to_string(),
                parts: default_parts(DEFAULT_TV_TEMPLATE),
            },
        }
    }
}

fn default_parts(template: &str) -> Vec<TemplatePart> {
    // Built-in templates always parse.
    parse_template(template).unwrap_or_default()
}

fn season_episode(record: &MediaRecord) -> Option<(u32, u32)> {
    Some((record.season?, record.episode?))
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// Field values must never introduce path segments of their own.
fn normalize_value(value: &str) -> String {
    value.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MediaRecord;

    fn inception() -> MediaRecord {
        MediaRecord::movie("/downloads/inception.mkv", "Inception", 2010)
    }

    fn test_show() -> MediaRecord {
        MediaRecord::episode("/downloads/test.show.102.mkv", "Test Show", 1, 2)
    }

    #[test]
    fn parse_template_ok() {
        let parsed = parse_template("{title} ({year})").expect("must parse");
        assert_eq!(
            parsed,
            vec![
                TemplatePart::Placeholder("title".to_string()),
                TemplatePart::Literal(" (".to_string()),
                TemplatePart::Placeholder("year".to_string()),
                TemplatePart::Literal(")".to_string()),
            ]
        );
    }

    #[test]
    fn parse_template_invalid_brace() {
        assert_eq!(parse_template("{title"), Err(TemplateError::UnbalancedBraces));
        assert_eq!(parse_template("title}"), Err(TemplateError::UnbalancedBraces));
        assert_eq!(parse_template("{{title}}"), Err(TemplateError::UnbalancedBraces));
    }

    #[test]
    fn parse_template_rejects_bad_names() {
        assert_eq!(parse_template("{}"), Err(TemplateError::InvalidPlaceholder(String::new())));
        assert!(matches!(
            parse_template("{season 02}"),
            Err(TemplateError::InvalidPlaceholder(_))
        ));
        assert_eq!(parse_template(""), Err(TemplateError::Empty));
    }

    #[test]
    fn render_movie_default_layout() {
        let path = render(DEFAULT_MOVIE_TEMPLATE, &inception(), None).expect("render");
        assert_eq!(path, PathBuf::from("Movies/Inception (2010)/Inception (2010).mkv"));
    }

    #[test]
    fn render_episode_default_layout() {
        let path = render(DEFAULT_TV_TEMPLATE, &test_show(), None).expect("render");
        assert_eq!(path, PathBuf::from("TV/Test Show/Season 01/Test Show - S01E02.mkv"));
    }

    #[test]
    fn derived_episode_placeholders() {
        let mut record = test_show();
        record.season = Some(3);
        record.episode = Some(12);
        let path =
            render("{sxee}-{season}-{episode02}-{media_type}", &record, None).expect("render");
        assert_eq!(path, PathBuf::from("3x12-3-12-tv"));
    }

    #[test]
    fn episode_placeholder_on_movie_is_missing_field() {
        let err = render("{title} {episode02}", &inception(), None).expect_err("must fail");
        assert_eq!(
            err,
            TemplateError::MissingField {
                placeholder: "episode02".to_string(),
                title: "Inception".to_string(),
            }
        );
    }

    #[test]
    fn extra_fields_are_placeholders() {
        let record = inception().with_extra("quality", "2160p");
        let path = render("{title} [{quality}]{extension}", &record, None).expect("render");
        assert_eq!(path, PathBuf::from("Inception [2160p].mkv"));

        let err = render("{title} [{codec}]", &record, None).expect_err("must fail");
        assert_eq!(err, TemplateError::UnknownPlaceholder("codec".to_string()));
    }

    #[test]
    fn values_cannot_add_segments() {
        let record = MediaRecord::movie("/in/acdc.mkv", "AC/DC: Live", 1992);
        let path = render(DEFAULT_MOVIE_TEMPLATE, &record, None).expect("render");
        assert_eq!(path, PathBuf::from("Movies/AC_DC_ Live (1992)/AC_DC_ Live (1992).mkv"));
    }

    #[test]
    fn base_dir_applies_only_to_relative_paths() {
        let base = Path::new("/library");
        let relative = render("{title}{extension}", &inception(), Some(base)).expect("render");
        assert_eq!(relative, PathBuf::from("/library/Inception.mkv"));

        let absolute = render("/srv/{title}{extension}", &inception(), Some(base)).expect("render");
        assert_eq!(absolute, PathBuf::from("/srv/Inception.mkv"));
    }

    #[test]
    fn template_set_picks_renderer_by_media_type() {
        let set = TemplateSet::default();
        assert_eq!(set.movie.template(), DEFAULT_MOVIE_TEMPLATE);
        let movie = set.render(&inception(), None).expect("render movie");
        let episode = set.render(&test_show(), None).expect("render episode");
        assert!(movie.starts_with("Movies"));
        assert!(episode.starts_with("TV"));
    }
}
