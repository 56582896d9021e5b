//! Default values shared across the OCR pipeline.

/// Cap on the longer side of an image entering the text detector.
pub const DEFAULT_LIMIT_SIDE_LEN: u32 = 960;

/// Detector inputs are padded/rounded to multiples of this stride.
pub const DETECTION_STRIDE: u32 = 32;

/// Default shape (channels, height, width) for recognizer inputs.
pub const DEFAULT_REC_IMAGE_SHAPE: [usize; 3] = [3, 48, 320];

/// Default shape (channels, height, width) for orientation classifier inputs.
pub const DEFAULT_CLS_IMAGE_SHAPE: [usize; 3] = [3, 48, 192];

/// Hard cap on the padded width of a recognition batch.
pub const DEFAULT_REC_MAX_WIDTH: usize = 3200;

/// Default number of crops per classification/recognition batch.
pub const DEFAULT_BATCH_SIZE: usize = 6;

/// Vertical tolerance (pixels) when deciding two boxes share a text row.
pub const READING_ORDER_Y_TOLERANCE: f32 = 10.0;

/// Number of images above which batch loading goes parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4;

/// Class labels emitted by the text line orientation classifier, in
/// output-channel order.
pub const ORIENTATION_LABELS: [&str; 2] = ["0", "180"];
