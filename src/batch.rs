use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::annotations::AnnotationRecord;
use crate::annotator::Annotator;
use crate::cache::merge_usage;
use crate::error::{BatchError, ItemFailure};
use crate::overlay::{FontBook, OverlayStyle, RasterCanvas};
use crate::providers::{Provider, ProviderUsage};
use crate::translator::Translator;

#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub source_annotations: PathBuf,
    pub target_annotations: PathBuf,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub translated: usize,
    pub skipped: Vec<ItemFailure>,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// Streams records into a JSON array, flushing after every record.
///
/// With `trailing_comma` every record is followed by `,\n`, which leaves a
/// comma before the closing bracket.
pub struct AnnotationWriter<W: Write> {
    out: W,
    trailing_comma: bool,
    written: usize,
}

impl<W: Write> AnnotationWriter<W> {
    pub fn new(mut out: W, trailing_comma: bool) -> Result<Self> {
        out.write_all(b"[\n")?;
        out.flush()?;
        Ok(Self {
            out,
            trailing_comma,
            written: 0,
        })
    }

    pub fn push<T: Serialize>(&mut self, record: &T) -> Result<()> {
        if !self.trailing_comma && self.written > 0 {
            self.out.write_all(b",\n")?;
        }
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(&mut self.out, formatter);
        record
            .serialize(&mut serializer)
            .with_context(|| "failed to serialize annotation record")?;
        if self.trailing_comma {
            self.out.write_all(b",\n")?;
        }
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.write_all(b"\n]")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Regular files of `dir`, ordered by the integer before the first `.`.
pub fn list_images(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read image directory: {}", dir.display()))?;
    let mut indexed = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let index = image_index(&name).ok_or_else(|| BatchError::UnindexedImage(name.clone()))?;
        indexed.push((index, name));
    }
    indexed.sort();
    Ok(indexed.into_iter().map(|(_, name)| name).collect())
}

fn image_index(name: &str) -> Option<i64> {
    name.split('.').next()?.trim().parse().ok()
}

pub fn load_annotations(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read annotations: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse annotations: {}", path.display()))
}

/// Translates every image of `paths.source_dir` with its record.
///
/// Precondition failures abort before anything is written; a failing item is
/// logged, reported and left out of the output.
pub async fn run_batch<P: Provider>(
    paths: &BatchPaths,
    translator: &Translator<P>,
    fonts: &FontBook,
    style: &OverlayStyle,
    trailing_comma: bool,
) -> Result<BatchReport> {
    let images = list_images(&paths.source_dir)?;
    let records = load_annotations(&paths.source_annotations)?;
    if images.len() != records.len() {
        return Err(BatchError::CountMismatch {
            images: images.len(),
            annotations: records.len(),
        }
        .into());
    }

    fs::create_dir_all(&paths.target_dir).with_context(|| {
        format!(
            "failed to create target directory: {}",
            paths.target_dir.display()
        )
    })?;
    if let Some(parent) = paths.target_annotations.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
    }
    let file = fs::File::create(&paths.target_annotations).with_context(|| {
        format!(
            "failed to create annotations: {}",
            paths.target_annotations.display()
        )
    })?;
    let mut writer = AnnotationWriter::new(BufWriter::new(file), trailing_comma)?;

    let total = images.len();
    let mut report = BatchReport {
        total,
        ..BatchReport::default()
    };
    for (idx, (name, value)) in images.into_iter().zip(records).enumerate() {
        info!("[{}/{}] {}", idx + 1, total, name);
        match process_item(paths, &name, value, translator, fonts, style).await {
            Ok(item) => {
                writer.push(&item.record)?;
                report.translated += 1;
                if report.model.is_none() {
                    report.model = item.model;
                }
                if let Some(usage) = item.usage {
                    let sum = report.usage.take().unwrap_or_default();
                    report.usage = Some(merge_usage(sum, Some(usage)));
                }
            }
            Err(err) => {
                error!("error encountered while processing {}: {:#}", name, err);
                report.skipped.push(ItemFailure {
                    image: name,
                    message: format!("{:#}", err),
                });
            }
        }
    }
    writer.finish()?;
    Ok(report)
}

struct ItemOutput {
    record: AnnotationRecord,
    model: Option<String>,
    usage: Option<ProviderUsage>,
}

async fn process_item<P: Provider>(
    paths: &BatchPaths,
    name: &str,
    value: Value,
    translator: &Translator<P>,
    fonts: &FontBook,
    style: &OverlayStyle,
) -> Result<ItemOutput> {
    let mut record: AnnotationRecord =
        serde_json::from_value(value).with_context(|| "malformed annotation record")?;
    let mut canvas = RasterCanvas::open(&paths.source_dir.join(name), fonts.clone())?;

    let (model, usage) = {
        let mut annotator = Annotator::new(translator, &mut canvas, style);
        annotator.translate_record(&mut record).await?;
        let cache = annotator.cache();
        (cache.model().map(str::to_string), cache.usage().cloned())
    };

    canvas.save(&paths.target_dir.join(name))?;
    Ok(ItemOutput {
        record,
        model,
        usage,
    })
}
