use anyhow::{Context, Result};
use tracing::debug;

use crate::annotations::{AnnotationRecord, Axis, BoundingBox, FieldValue, ValueSeries};
use crate::cache::TranslationCache;
use crate::classify::is_numeric;
use crate::error::AnnotationError;
use crate::overlay::{Canvas, OverlayStyle, replace_text};
use crate::providers::Provider;
use crate::translator::Translator;

/// Translates one record and redraws its text boxes on the matching image.
pub struct Annotator<'a, P: Provider, C: Canvas + ?Sized> {
    translator: &'a Translator<P>,
    canvas: &'a mut C,
    style: &'a OverlayStyle,
    cache: TranslationCache,
}

impl<'a, P: Provider, C: Canvas + ?Sized> Annotator<'a, P, C> {
    pub fn new(translator: &'a Translator<P>, canvas: &'a mut C, style: &'a OverlayStyle) -> Self {
        Self {
            translator,
            canvas,
            style,
            cache: TranslationCache::new(),
        }
    }

    /// Walks title, legend and both axes, rewriting the record in place.
    pub async fn translate_record(&mut self, record: &mut AnnotationRecord) -> Result<()> {
        let info = &mut record.general_figure_info;

        if let Some(title) = info.title.as_mut() {
            if let Some(bbox) = title.bbox.clone() {
                title.text = self
                    .render_replacement(&title.text, &bbox)
                    .await
                    .with_context(|| "failed to render title")?;
            }
        }

        if let Some(legend) = info.legend.as_mut() {
            for (idx, item) in legend.items.iter_mut().flatten().enumerate() {
                let Some(label) = item.label.as_mut() else {
                    continue;
                };
                let bbox = label
                    .bbox
                    .clone()
                    .ok_or_else(|| AnnotationError::MissingBox(format!("legend item {}", idx)))?;
                let original = label.text.clone();
                let translated = self
                    .render_replacement(&original, &bbox)
                    .await
                    .with_context(|| format!("failed to render legend item {}", idx))?;
                label.text = translated.clone();
                item.model = Some(translated.clone());
                for model in record.models.iter_mut().flatten() {
                    if model.name.as_deref() == Some(original.as_str()) {
                        model.name = Some(translated.clone());
                        model.label = Some(translated.clone());
                    }
                }
            }
        }

        self.translate_axis("x_axis", &mut info.x_axis).await?;
        self.translate_axis("y_axis", &mut info.y_axis).await?;
        Ok(())
    }

    /// Translates `text` and paints the result over `bbox`. Numeric text is
    /// left alone and nothing is drawn.
    pub async fn render_replacement(&mut self, text: &str, bbox: &BoundingBox) -> Result<String> {
        if is_numeric(text) {
            return Ok(text.to_string());
        }
        bbox.validate()?;
        let translated = self
            .cache
            .translate(Some(text), self.translator)
            .await
            .into_text();
        replace_text(&mut *self.canvas, self.style, bbox, &translated)?;
        Ok(translated)
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    async fn translate_axis(&mut self, name: &str, axis: &mut Axis) -> Result<()> {
        if let Some(series) = axis.major_labels.as_mut() {
            self.translate_series(series)
                .await
                .with_context(|| format!("failed to render {}.major_labels", name))?;
        }
        if let Some(series) = axis.rule.as_mut() {
            self.translate_series(series)
                .await
                .with_context(|| format!("failed to render {}.rule", name))?;
        }
        if let Some(label) = axis.label.as_mut() {
            if let Some(bbox) = label.bbox.clone() {
                label.text = self
                    .render_replacement(&label.text, &bbox)
                    .await
                    .with_context(|| format!("failed to render {}.label", name))?;
            }
        }
        Ok(())
    }

    /// Translates every value, then redraws the boxed text values with the
    /// strings now stored in the record.
    async fn translate_series(&mut self, series: &mut ValueSeries) -> Result<()> {
        let Some(values) = series.values.as_mut() else {
            return Ok(());
        };
        let originals = std::mem::take(values);
        for value in &originals {
            let translated = self.translate_value(value).await;
            values.push(translated);
        }

        let Some(bboxes) = series.bboxes.as_ref() else {
            return Ok(());
        };
        if originals.is_empty() || bboxes.len() != originals.len() {
            debug!(
                "skipping redraw: {} values, {} boxes",
                originals.len(),
                bboxes.len()
            );
            return Ok(());
        }
        for ((bbox, original), value) in bboxes.iter().zip(&originals).zip(values.iter()) {
            let (FieldValue::Text(original), FieldValue::Text(text)) = (original, value) else {
                continue;
            };
            if is_numeric(original) {
                continue;
            }
            replace_text(&mut *self.canvas, self.style, bbox, text)?;
        }
        Ok(())
    }

    async fn translate_value(&mut self, value: &FieldValue) -> FieldValue {
        match value {
            FieldValue::Text(text) => {
                self.cache
                    .translate(Some(text.as_str()), self.translator)
                    .await
            }
            FieldValue::Number(number) => FieldValue::Number(number.clone()),
            FieldValue::Null => self.cache.translate(None, self.translator).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{DrawOp, RecordingCanvas, ScriptedProvider, instant_retry};
    use crate::translations::TranslateOptions;
    use serde_json::{Value, json};

    fn translator(provider: &ScriptedProvider) -> Translator<ScriptedProvider> {
        Translator::new(provider.clone(), TranslateOptions::new("en", "ko"))
            .with_retry(instant_retry())
    }

    fn record(value: Value) -> AnnotationRecord {
        serde_json::from_value(value).unwrap()
    }

    fn bbox(x: f64, y: f64, w: f64, h: f64) -> Value {
        json!({"x": x, "y": y, "w": w, "h": h})
    }

    fn axes() -> Value {
        json!({"x_axis": {}, "y_axis": {}})
    }

    async fn run(provider: &ScriptedProvider, value: Value) -> (AnnotationRecord, RecordingCanvas) {
        let translator = translator(provider);
        let style = OverlayStyle::default();
        let mut canvas = RecordingCanvas::default();
        let mut record = record(value);
        Annotator::new(&translator, &mut canvas, &style)
            .translate_record(&mut record)
            .await
            .unwrap();
        (record, canvas)
    }

    #[tokio::test]
    async fn title_is_translated_and_redrawn() {
        let provider = ScriptedProvider::prefixing("ko:");
        let mut info = axes();
        info["title"] = json!({"text": "Revenue", "bbox": bbox(10.0, 10.0, 100.0, 20.0)});
        let (record, canvas) = run(&provider, json!({"general_figure_info": info})).await;

        let title = record.general_figure_info.title.unwrap();
        assert_eq!(title.text, "ko:Revenue");
        assert_eq!(canvas.texts(), vec!["ko:Revenue"]);
        assert!(matches!(canvas.ops[0], DrawOp::Fill { .. }));
    }

    #[tokio::test]
    async fn title_without_bbox_is_untouched() {
        let provider = ScriptedProvider::prefixing("ko:");
        let mut info = axes();
        info["title"] = json!({"text": "Revenue"});
        let (record, canvas) = run(&provider, json!({"general_figure_info": info})).await;

        assert_eq!(record.general_figure_info.title.unwrap().text, "Revenue");
        assert!(canvas.ops.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn numeric_title_is_neither_translated_nor_drawn() {
        let provider = ScriptedProvider::prefixing("ko:");
        let mut info = axes();
        info["title"] = json!({"text": "2024", "bbox": bbox(0.0, 0.0, 80.0, 20.0)});
        let (record, canvas) = run(&provider, json!({"general_figure_info": info})).await;

        assert_eq!(record.general_figure_info.title.unwrap().text, "2024");
        assert!(canvas.ops.is_empty());
    }

    #[tokio::test]
    async fn legend_label_updates_matching_models() {
        let provider = ScriptedProvider::prefixing("ko:");
        let mut info = axes();
        info["legend"] = json!({"items": [
            {"label": {"text": "Apples", "bbox": bbox(5.0, 5.0, 60.0, 12.0)}, "preview": {"color": "red"}},
            {"label": {"text": "Pears", "bbox": bbox(5.0, 20.0, 60.0, 12.0)}}
        ]});
        let value = json!({
            "general_figure_info": info,
            "models": [
                {"name": "Apples", "label": "Apples", "colors": ["red"]},
                {"name": "Plums", "label": "Plums"}
            ]
        });
        let (record, _) = run(&provider, value).await;

        let legend = record.general_figure_info.legend.as_ref().unwrap();
        let items = legend.items.as_ref().unwrap();
        assert_eq!(items[0].label.as_ref().unwrap().text, "ko:Apples");
        assert_eq!(items[0].model.as_deref(), Some("ko:Apples"));
        assert_eq!(items[1].model.as_deref(), Some("ko:Pears"));
        assert!(items[0].extra.contains_key("preview"));

        let models = record.models.unwrap();
        assert_eq!(models[0].name.as_deref(), Some("ko:Apples"));
        assert_eq!(models[0].label.as_deref(), Some("ko:Apples"));
        assert!(models[0].extra.contains_key("colors"));
        assert_eq!(models[1].name.as_deref(), Some("Plums"));
    }

    #[tokio::test]
    async fn legend_label_without_bbox_fails_the_record() {
        let provider = ScriptedProvider::prefixing("ko:");
        let translator = translator(&provider);
        let style = OverlayStyle::default();
        let mut canvas = RecordingCanvas::default();
        let mut info = axes();
        info["legend"] = json!({"items": [{"label": {"text": "Apples"}}]});
        let mut record = record(json!({"general_figure_info": info}));

        let err = Annotator::new(&translator, &mut canvas, &style)
            .translate_record(&mut record)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("legend item 0 has no bbox"));
    }

    #[tokio::test]
    async fn axis_label_is_redrawn_rotated_when_tall() {
        let provider = ScriptedProvider::prefixing("ko:");
        let value = json!({"general_figure_info": {
            "x_axis": {},
            "y_axis": {"label": {"text": "Sales", "bbox": bbox(2.0, 40.0, 20.0, 100.0)}}
        }});
        let (record, canvas) = run(&provider, value).await;

        assert_eq!(record.general_figure_info.y_axis.label.unwrap().text, "ko:Sales");
        assert_eq!(
            canvas.ops[1],
            DrawOp::RotatedText {
                x: 2.0,
                y: 40.0,
                buffer: 100,
                size: 14,
                text: "ko:Sales".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn series_values_are_translated_and_text_ticks_redrawn() {
        let provider = ScriptedProvider::prefixing("ko:");
        let value = json!({"general_figure_info": {
            "x_axis": {"major_labels": {
                "values": ["Q1", "10", 2.5, null],
                "bboxes": [
                    bbox(0.0, 0.0, 30.0, 10.0),
                    bbox(40.0, 0.0, 30.0, 10.0),
                    bbox(80.0, 0.0, 30.0, 10.0),
                    bbox(120.0, 0.0, 30.0, 10.0)
                ]
            }},
            "y_axis": {"rule": {"values": ["Q1"]}}
        }});
        let (record, canvas) = run(&provider, value).await;

        let x_values = record.general_figure_info.x_axis.major_labels.unwrap().values;
        assert_eq!(
            x_values.unwrap(),
            vec![
                FieldValue::from("ko:Q1"),
                FieldValue::from_f64(10.0).unwrap(),
                FieldValue::from_f64(2.5).unwrap(),
                FieldValue::from(" "),
            ]
        );
        let y_values = record.general_figure_info.y_axis.rule.unwrap().values;
        assert_eq!(y_values.unwrap(), vec![FieldValue::from("ko:Q1")]);

        assert_eq!(canvas.texts(), vec!["ko:Q1"]);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn mismatched_boxes_skip_the_redraw() {
        let provider = ScriptedProvider::prefixing("ko:");
        let value = json!({"general_figure_info": {
            "x_axis": {"major_labels": {
                "values": ["Q1", "Q2"],
                "bboxes": [bbox(0.0, 0.0, 30.0, 10.0)]
            }},
            "y_axis": {}
        }});
        let (record, canvas) = run(&provider, value).await;

        let values = record.general_figure_info.x_axis.major_labels.unwrap().values;
        assert_eq!(values.unwrap(), vec![FieldValue::from("ko:Q1"), FieldValue::from("ko:Q2")]);
        assert!(canvas.ops.is_empty());
    }

    #[tokio::test]
    async fn failed_translation_keeps_the_original_text() {
        let provider = ScriptedProvider::prefixing("ko:").failing_first(usize::MAX);
        let mut info = axes();
        info["title"] = json!({"text": "Revenue", "bbox": bbox(10.0, 10.0, 100.0, 20.0)});
        let (record, canvas) = run(&provider, json!({"general_figure_info": info})).await;

        assert_eq!(record.general_figure_info.title.unwrap().text, "Revenue");
        assert_eq!(canvas.texts(), vec!["Revenue"]);
    }

    #[tokio::test]
    async fn redrawn_tick_matches_the_stored_value_after_failures() {
        // every attempt for the value fails; a fourth call would succeed
        let provider = ScriptedProvider::prefixing("ko:").failing_first(3);
        let value = json!({"general_figure_info": {
            "x_axis": {"major_labels": {
                "values": ["Q1"],
                "bboxes": [bbox(0.0, 0.0, 30.0, 10.0)]
            }},
            "y_axis": {}
        }});
        let (record, canvas) = run(&provider, value).await;

        let values = record.general_figure_info.x_axis.major_labels.unwrap().values;
        assert_eq!(values.unwrap(), vec![FieldValue::from("Q1")]);
        assert_eq!(canvas.texts(), vec!["Q1"]);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn series_without_values_is_left_alone() {
        let provider = ScriptedProvider::prefixing("ko:");
        let value = json!({"general_figure_info": {
            "x_axis": {"rule": {"bboxes": [bbox(0.0, 0.0, 30.0, 10.0)]}},
            "y_axis": {}
        }});
        let (record, canvas) = run(&provider, value).await;

        assert!(record.general_figure_info.x_axis.rule.unwrap().values.is_none());
        assert!(canvas.ops.is_empty());
    }
}
