use thiserror::Error;

/// Conditions that stop a batch before any item is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("image count ({images}) does not match annotation count ({annotations})")]
    CountMismatch { images: usize, annotations: usize },

    #[error("image file name '{0}' does not start with an integer index")]
    UnindexedImage(String),
}

/// Malformed annotation data found while translating one record.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("invalid bounding box (x={x}, y={y}, w={w}, h={h})")]
    InvalidBox { x: f64, y: f64, w: f64, h: f64 },

    #[error("{0} has no bbox")]
    MissingBox(String),
}

/// One skipped item of a batch run.
#[derive(Debug)]
pub struct ItemFailure {
    pub image: String,
    pub message: String,
}
