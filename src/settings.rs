use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::overlay::{DEFAULT_FILL_COLOR, DEFAULT_FONT_SCALE, DEFAULT_TEXT_COLOR};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub source_annotations: PathBuf,
    pub target_annotations: PathBuf,
    pub font_path: Option<PathBuf>,
    pub source_lang: String,
    pub target_lang: String,
    pub provider: String,
    pub model: Option<String>,
    pub attempts: usize,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub fill_color: String,
    pub text_color: String,
    pub font_scale: f64,
    pub font_family: Option<String>,
    pub trailing_comma: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("../data/test/png"),
            target_dir: PathBuf::from("../data/translated_test/png"),
            source_annotations: PathBuf::from("../data/test/annotations.json"),
            target_annotations: PathBuf::from("../data/translated_test/annotations.json"),
            font_path: Some(PathBuf::from("./font/휴먼명조.ttf")),
            source_lang: "en".to_string(),
            target_lang: "ko".to_string(),
            provider: "google".to_string(),
            model: None,
            attempts: 3,
            retry_delay_ms: 1000,
            timeout_secs: 30,
            fill_color: DEFAULT_FILL_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            font_scale: DEFAULT_FONT_SCALE,
            font_family: None,
            trailing_comma: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    paths: Option<PathSettings>,
    translation: Option<TranslationSettings>,
    overlay: Option<OverlaySettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct PathSettings {
    source_dir: Option<String>,
    target_dir: Option<String>,
    source_annotations: Option<String>,
    target_annotations: Option<String>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    source_lang: Option<String>,
    target_lang: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    attempts: Option<usize>,
    retry_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    fill_color: Option<String>,
    text_color: Option<String>,
    font_scale: Option<f64>,
    font_family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    trailing_comma: Option<bool>,
}

/// Loads `settings.toml`, `settings.local.toml`, the per-user file and
/// finally `extra_path`, later files overriding earlier ones.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Merges every existing file of `paths` over the defaults, in order.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(paths) = incoming.paths {
            merge_path(&mut self.source_dir, paths.source_dir);
            merge_path(&mut self.target_dir, paths.target_dir);
            merge_path(&mut self.source_annotations, paths.source_annotations);
            merge_path(&mut self.target_annotations, paths.target_annotations);
            // An empty font path switches to system font lookup.
            if let Some(path) = paths.font_path {
                let path = path.trim();
                self.font_path = (!path.is_empty()).then(|| PathBuf::from(path));
            }
        }
        if let Some(translation) = incoming.translation {
            merge_text(&mut self.source_lang, translation.source_lang);
            merge_text(&mut self.target_lang, translation.target_lang);
            merge_text(&mut self.provider, translation.provider);
            if let Some(model) = translation.model {
                let model = model.trim();
                self.model = (!model.is_empty()).then(|| model.to_string());
            }
            if let Some(attempts) = translation.attempts {
                if attempts > 0 {
                    self.attempts = attempts;
                }
            }
            if let Some(delay) = translation.retry_delay_ms {
                self.retry_delay_ms = delay;
            }
            if let Some(timeout) = translation.timeout_secs {
                if timeout > 0 {
                    self.timeout_secs = timeout;
                }
            }
        }
        if let Some(overlay) = incoming.overlay {
            merge_text(&mut self.fill_color, overlay.fill_color);
            merge_text(&mut self.text_color, overlay.text_color);
            if let Some(scale) = overlay.font_scale {
                if scale > 0.0 {
                    self.font_scale = scale;
                }
            }
            if let Some(family) = overlay.font_family {
                if !family.trim().is_empty() {
                    self.font_family = Some(family);
                }
            }
        }
        if let Some(output) = incoming.output {
            if let Some(trailing_comma) = output.trailing_comma {
                self.trailing_comma = trailing_comma;
            }
        }
    }
}

fn merge_text(slot: &mut String, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *slot = value.trim().to_string();
        }
    }
}

fn merge_path(slot: &mut PathBuf, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *slot = PathBuf::from(value.trim());
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".chart-translator"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn embedded_settings_match_defaults() {
        let mut settings = Settings {
            source_dir: PathBuf::from("x"),
            target_dir: PathBuf::from("x"),
            source_annotations: PathBuf::from("x"),
            target_annotations: PathBuf::from("x"),
            font_path: None,
            source_lang: "x".to_string(),
            target_lang: "x".to_string(),
            provider: "x".to_string(),
            model: None,
            attempts: 9,
            retry_delay_ms: 9,
            timeout_secs: 9,
            fill_color: "x".to_string(),
            text_color: "x".to_string(),
            font_scale: 9.0,
            font_family: None,
            trailing_comma: true,
        };
        settings.merge(toml::from_str(DEFAULT_SETTINGS_TOML).unwrap());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(
            dir.path(),
            "base.toml",
            "[translation]\ntarget_lang = \"ja\"\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\n",
        );
        let local = write(
            dir.path(),
            "local.toml",
            "[translation]\ntarget_lang = \"de\"\n[output]\ntrailing_comma = true\n",
        );
        let settings =
            load_settings_from(&[base, dir.path().join("absent.toml"), local]).unwrap();
        assert_eq!(settings.target_lang, "de");
        assert_eq!(settings.provider, "openai");
        assert_eq!(settings.model.as_deref(), Some("gpt-4o-mini"));
        assert!(settings.trailing_comma);
        assert_eq!(settings.source_lang, "en");
    }

    #[test]
    fn empty_values_keep_or_clear_as_documented() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "settings.toml",
            "[paths]\nfont_path = \"\"\nsource_dir = \" \"\n[translation]\nattempts = 0\n[overlay]\nfont_family = \"Noto Sans\"\nfont_scale = -1.0\n",
        );
        let settings = load_settings_from(&[path]).unwrap();
        assert_eq!(settings.font_path, None);
        assert_eq!(settings.source_dir, PathBuf::from("../data/test/png"));
        assert_eq!(settings.attempts, 3);
        assert_eq!(settings.font_scale, 0.7);
        assert_eq!(settings.font_family.as_deref(), Some("Noto Sans"));
    }

    #[test]
    fn malformed_settings_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "settings.toml", "[translation\n");
        let err = load_settings_from(&[path]).unwrap_err();
        assert!(err.to_string().contains("failed to parse settings"));
    }
}
