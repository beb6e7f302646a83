use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading a keypoint dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Annotation file could not be read.
    #[error("failed to read annotations at {path}: {source}")]
    AnnotationIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line in the annotation file is not valid JSON.
    #[error("malformed annotation on line {line} of {path}: {source}")]
    AnnotationParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// An image referenced by an annotation could not be decoded.
    #[error("failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A record carries a different keypoint count than the configured one.
    #[error("record for {image} has {found} keypoints, expected {expected}")]
    KeypointCountMismatch {
        image: String,
        found: usize,
        expected: usize,
    },

    /// The dataset resolved to zero samples.
    #[error("dataset at {path} contains no samples")]
    Empty { path: PathBuf },
}

/// A single keypoint in normalized image coordinates ([0, 1] on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Invisible keypoints render as all-zero heatmap channels.
    pub visible: bool,
}

/// One annotation record as stored in the JSONL annotation file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Image path relative to the dataset root.
    pub image: String,
    pub keypoints: Vec<Keypoint>,
}

/// A decoded sample: an RGB image plus its keypoints.
///
/// Pixels are stored planar (CHW), values in [0, 1], already resized to the
/// configured image shape.
#[derive(Debug, Clone)]
pub struct KeypointSample {
    pub pixels: Vec<f32>,
    pub height: usize,
    pub width: usize,
    pub keypoints: Vec<Keypoint>,
}

impl KeypointSample {
    /// Number of keypoints annotated on this sample.
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    /// Length of the pixel buffer for a consistency check.
    pub fn expected_len(&self) -> usize {
        3 * self.height * self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_record_round_trip() {
        let record = AnnotationRecord {
            image: "img/0001.png".to_string(),
            keypoints: vec![
                Keypoint { x: 0.25, y: 0.5, visible: true },
                Keypoint { x: 0.0, y: 0.0, visible: false },
            ],
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: AnnotationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.image, record.image);
        assert_eq!(back.keypoints.len(), 2);
        assert_eq!(back.keypoints[0], record.keypoints[0]);
        assert!(!back.keypoints[1].visible);
    }

    #[test]
    fn test_sample_expected_len() {
        let sample = KeypointSample {
            pixels: vec![0.0; 3 * 4 * 6],
            height: 4,
            width: 6,
            keypoints: vec![],
        };
        assert_eq!(sample.expected_len(), 72);
        assert_eq!(sample.pixels.len(), sample.expected_len());
    }
}
