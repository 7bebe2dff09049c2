use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::{Face, name_id};
use usvg::fontdb;

const DEFAULT_ASCENT: f32 = 0.8;

/// The face used to draw replacement text, registered in a font database
/// that the rasteriser can query by family name.
#[derive(Debug, Clone)]
pub struct FontBook {
    db: Arc<fontdb::Database>,
    family: String,
    ascent: f32,
}

impl FontBook {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        let (family, ascent) = face_details(&data)
            .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))?;
        let family = family.ok_or_else(|| {
            anyhow!("font has no family name: {}", path.display())
        })?;
        let mut db = fontdb::Database::new();
        db.load_font_data(data);
        Ok(Self {
            db: Arc::new(db),
            family,
            ascent,
        })
    }

    /// Loads `path` when given, otherwise the first system family out of
    /// `family` and `fallback` that is installed.
    pub fn resolve(path: Option<&Path>, family: Option<&str>, fallback: &[&str]) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let db = Arc::new(db);

        if let Some(family) = family {
            return Self::from_system(db, family);
        }
        for candidate in fallback {
            if let Ok(book) = Self::from_system(db.clone(), candidate) {
                return Ok(book);
            }
        }
        Err(anyhow!("no fallback fonts found"))
    }

    /// Wraps an existing database. Metrics fall back to a generic ascent.
    pub fn from_database(db: fontdb::Database, family: impl Into<String>) -> Self {
        Self {
            db: Arc::new(db),
            family: family.into(),
            ascent: DEFAULT_ASCENT,
        }
    }

    pub fn database(&self) -> Arc<fontdb::Database> {
        self.db.clone()
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Ascender height as a fraction of the font size.
    pub fn ascent(&self) -> f32 {
        self.ascent
    }

    fn from_system(db: Arc<fontdb::Database>, family: &str) -> Result<Self> {
        let families = if family.eq_ignore_ascii_case("sans-serif") {
            vec![fontdb::Family::SansSerif]
        } else if family.eq_ignore_ascii_case("serif") {
            vec![fontdb::Family::Serif]
        } else {
            vec![fontdb::Family::Name(family)]
        };
        let query = fontdb::Query {
            families: &families,
            ..Default::default()
        };
        let id = db
            .query(&query)
            .ok_or_else(|| anyhow!("font not found: {}", family))?;
        let details = db
            .with_face_data(id, |data, index| face_details_at(data, index))
            .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
        let (resolved, ascent) = details?;
        Ok(Self {
            db,
            family: resolved.unwrap_or_else(|| family.to_string()),
            ascent,
        })
    }
}

fn face_details(data: &[u8]) -> Result<(Option<String>, f32)> {
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    (0..count)
        .find_map(|index| face_details_at(data, index).ok())
        .ok_or_else(|| anyhow!("no usable face"))
}

fn face_details_at(data: &[u8], index: u32) -> Result<(Option<String>, f32)> {
    let face = Face::parse(data, index).map_err(|err| anyhow!("{}", err))?;
    let units = f32::from(face.units_per_em().max(1));
    let ascent = f32::from(face.ascender()) / units;
    let ascent = if ascent > 0.0 { ascent } else { DEFAULT_ASCENT };
    Ok((extract_family_name(&face), ascent))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FontBook::load(&dir.path().join("missing.ttf")).unwrap_err();
        assert!(err.to_string().contains("failed to read font"));
    }

    #[test]
    fn garbage_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        let err = FontBook::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse font"));
    }

    #[test]
    fn explicit_path_wins_over_family() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ttf");
        assert!(FontBook::resolve(Some(&path), Some("sans-serif"), &[]).is_err());
    }

    #[test]
    fn font_file_supplies_family_and_ascent() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf");
        let book = FontBook::load(&path).unwrap();
        assert_eq!(book.family(), "Tuffy");
        assert!(book.ascent() > 0.5 && book.ascent() < 1.2);
        assert_eq!(book.database().len(), 1);
    }

    #[test]
    fn from_database_uses_generic_metrics() {
        let book = FontBook::from_database(fontdb::Database::new(), "Test Sans");
        assert_eq!(book.family(), "Test Sans");
        assert_eq!(book.ascent(), DEFAULT_ASCENT);
    }
}
