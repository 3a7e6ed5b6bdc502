//! Segmentation point payloads for the inference endpoints.
//!
//! `{ "coordinates": [{"x": 10.0, "y": 20.0}], "labels": [1] }` where a label
//! of `1` marks a point to include and `0` a point to exclude.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A point in source-video pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Whether a point belongs to the object to segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PointLabel {
    Exclude,
    Include,
}

impl From<PointLabel> for u8 {
    fn from(label: PointLabel) -> Self {
        match label {
            PointLabel::Exclude => 0,
            PointLabel::Include => 1,
        }
    }
}

impl TryFrom<u8> for PointLabel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PointLabel::Exclude),
            1 => Ok(PointLabel::Include),
            other => Err(format!("point label must be 0 or 1, got {}", other)),
        }
    }
}

/// Parallel arrays of points and their labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentationPoints {
    pub coordinates: Vec<Point>,
    #[schemars(with = "Vec<u8>")]
    pub labels: Vec<PointLabel>,
}

impl SegmentationPoints {
    pub fn push(&mut self, point: Point, label: PointLabel) {
        self.coordinates.push(point);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn clear(&mut self) {
        self.coordinates.clear();
        self.labels.clear();
    }
}

/// JSON body returned by the point-only inference endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PathListResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmented_image_path: Option<String>,

    #[serde(default)]
    pub segmented_image_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_serialize_labels_as_integers() {
        let mut points = SegmentationPoints::default();
        points.push(Point { x: 1.5, y: 2.0 }, PointLabel::Include);
        points.push(Point { x: 3.0, y: 4.0 }, PointLabel::Exclude);

        let json = serde_json::to_string(&points).unwrap();
        assert_eq!(
            json,
            r#"{"coordinates":[{"x":1.5,"y":2.0},{"x":3.0,"y":4.0}],"labels":[1,0]}"#
        );
    }

    #[test]
    fn test_invalid_label_rejected() {
        let err = serde_json::from_str::<SegmentationPoints>(
            r#"{"coordinates":[{"x":1,"y":2}],"labels":[2]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_path_list_defaults() {
        let resp: PathListResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.segmented_image_paths.is_empty());
        assert!(resp.segmented_image_path.is_none());
    }
}
