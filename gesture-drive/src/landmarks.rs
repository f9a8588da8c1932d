//! Pose landmark frames
//!
//! A frame is the per-inference output of the external pose estimator: 33 body
//! joints, each with normalized image coordinates. Everything downstream works
//! in "scaled units" (normalized value × [`COORDINATE_SCALE`]) so thresholds
//! read as whole numbers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference frame size used to turn normalized coordinates into units.
pub const COORDINATE_SCALE: f32 = 1000.0;

/// Number of joints in the full-body pose model
pub const POSE_LANDMARK_COUNT: usize = 33;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Invalid frame JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Too many landmarks: got {0}, expected at most 33")]
    TooManyLandmarks(usize),

    #[error("Landmark {index} has non-finite coordinates")]
    NonFinite { index: usize },
}

/// Body joint identifiers (MediaPipe pose topology)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseJoint {
    Nose = 0,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    /// Tip of the right foot ("toe")
    RightFootIndex = 32,
}

impl PoseJoint {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single joint position (normalized to 0-1 of frame width/height)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,

    /// Detector confidence that the joint is visible, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, visibility: None }
    }

    /// Horizontal position in scaled units
    pub fn scaled_x(&self) -> f32 {
        self.x * COORDINATE_SCALE
    }

    /// Vertical position in scaled units (grows downwards)
    pub fn scaled_y(&self) -> f32 {
        self.y * COORDINATE_SCALE
    }
}

/// One inference result: joint positions indexed by [`PoseJoint`].
///
/// Frames are immutable once built and are dropped after classification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkFrame {
    landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    /// Build a frame from landmarks in joint-index order
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, FrameError> {
        if landmarks.len() > POSE_LANDMARK_COUNT {
            return Err(FrameError::TooManyLandmarks(landmarks.len()));
        }

        if let Some(index) = landmarks
            .iter()
            .position(|l| !l.x.is_finite() || !l.y.is_finite())
        {
            return Err(FrameError::NonFinite { index });
        }

        Ok(Self { landmarks })
    }

    /// A frame with no detected person
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a frame from its JSON array form: `[{"x":..,"y":..}, ...]`
    pub fn from_json(json: &str) -> Result<Self, FrameError> {
        let landmarks: Vec<Landmark> = serde_json::from_str(json)?;
        Self::new(landmarks)
    }

    pub fn get(&self, joint: PoseJoint) -> Option<&Landmark> {
        self.landmarks.get(joint.index())
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
}

/// Builder for test and replay frames: starts from a neutral standing pose
/// (all joints at the frame centre) and overrides individual joints.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    landmarks: Vec<Landmark>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            landmarks: vec![Landmark::new(0.5, 0.5); POSE_LANDMARK_COUNT],
        }
    }

    pub fn joint(mut self, joint: PoseJoint, x: f32, y: f32) -> Self {
        self.landmarks[joint.index()] = Landmark::new(x, y);
        self
    }

    pub fn build(self) -> LandmarkFrame {
        LandmarkFrame {
            landmarks: self.landmarks,
        }
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_joint_indices() {
        assert_eq!(PoseJoint::LeftWrist.index(), 15);
        assert_eq!(PoseJoint::RightWrist.index(), 16);
        assert_eq!(PoseJoint::RightHeel.index(), 30);
        assert_eq!(PoseJoint::RightFootIndex.index(), 32);
    }

    #[test]
    fn test_scaled_coordinates() {
        let lm = Landmark::new(0.25, 0.10);
        assert_relative_eq!(lm.scaled_x(), 250.0, epsilon = 0.01);
        assert_relative_eq!(lm.scaled_y(), 100.0, epsilon = 0.01);
    }

    #[test]
    fn test_get_missing_joint() {
        let frame = LandmarkFrame::new(vec![Landmark::new(0.5, 0.5); 16]).unwrap();
        assert!(frame.get(PoseJoint::LeftWrist).is_some());
        assert!(frame.get(PoseJoint::RightWrist).is_none());
        assert!(frame.get(PoseJoint::RightHeel).is_none());
    }

    #[test]
    fn test_frame_validation() {
        let too_many = vec![Landmark::default(); POSE_LANDMARK_COUNT + 1];
        assert!(matches!(
            LandmarkFrame::new(too_many),
            Err(FrameError::TooManyLandmarks(34))
        ));

        let mut bad = vec![Landmark::default(); 3];
        bad[2].y = f32::NAN;
        assert!(matches!(
            LandmarkFrame::new(bad),
            Err(FrameError::NonFinite { index: 2 })
        ));
    }

    #[test]
    fn test_from_json() {
        let frame = LandmarkFrame::from_json(
            r#"[{"x": 0.1, "y": 0.2}, {"x": 0.3, "y": 0.4, "visibility": 0.9}]"#,
        )
        .unwrap();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.landmarks()[1].visibility, Some(0.9));
        assert!(LandmarkFrame::from_json("not json").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let frame = FrameBuilder::new()
            .joint(PoseJoint::RightWrist, 0.4, 0.1)
            .build();

        assert_eq!(frame.len(), POSE_LANDMARK_COUNT);
        let wrist = frame.get(PoseJoint::RightWrist).unwrap();
        assert_relative_eq!(wrist.y, 0.1);
        assert!(LandmarkFrame::empty().is_empty());
    }
}
