//! Segmentation points collected on a displayed frame and the inference results.

use vdo_models::{PathListResponse, Point, PointLabel, SegmentationPoints};

/// Which JSON inference endpoint to submit points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsEndpoint {
    /// Single frame
    Frame,
    /// Every extracted frame
    Frames,
}

/// What an inference call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    Paths(PathListResponse),
    Video(Vec<u8>),
}

/// Points being collected for the next inference call.
#[derive(Debug, Clone, Default)]
pub struct SegmentationDraft {
    points: SegmentationPoints,
}

impl SegmentationDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, x: f32, y: f32, label: PointLabel) {
        self.points.push(Point { x, y }, label);
    }

    pub fn points(&self) -> &SegmentationPoints {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn reset(&mut self) {
        self.points.clear();
    }
}
