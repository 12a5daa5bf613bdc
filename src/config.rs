use crate::{error::Error, labels::MatchPolicy, landmarks::LandmarkKind::*};

/// A three-point joint: the angle is measured at `vertex`, between the rays
/// towards `a` and `c`.
#[derive(Debug, Clone)]
pub(crate) struct JointSpec {
    pub(crate) name: &'static str,
    pub(crate) a: usize,
    pub(crate) vertex: usize,
    pub(crate) c: usize,
}

/// Skeleton-specific indices and thresholds for the feature pipeline.
///
/// Defaults describe the 33-point full-body topology; swapping in a different
/// skeleton means swapping this structure, which is validated against the
/// landmark count before any video is processed.
#[derive(Debug, Clone)]
pub(crate) struct FeatureConfig {
    pub(crate) hip_pair: (usize, usize),
    pub(crate) shoulder_pair: (usize, usize),
    /// Landmarks that get a `speed_<i>` column.
    pub(crate) velocity_landmarks: Vec<usize>,
    /// Joints that get a `<name>_deg` column.
    pub(crate) joints: Vec<JointSpec>,
    /// Visibility at or above this counts a landmark as visible.
    pub(crate) visibility_threshold: f64,
    /// `low_quality` when `mean_visibility` falls below this...
    pub(crate) min_mean_visibility: f64,
    /// ...or when fewer than this many landmarks are visible.
    pub(crate) min_visible_landmarks: usize,
    /// Substitute frame rate when a video reports none.
    pub(crate) default_fps: f64,
    /// Lower bound on torso scale, so downstream normalization never divides by zero.
    pub(crate) torso_scale_floor: f64,
    pub(crate) match_policy: MatchPolicy,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            hip_pair: (LeftHip.idx(), RightHip.idx()),
            shoulder_pair: (LeftShoulder.idx(), RightShoulder.idx()),
            velocity_landmarks: vec![
                LeftWrist.idx(),
                RightWrist.idx(),
                LeftKnee.idx(),
                RightKnee.idx(),
                LeftAnkle.idx(),
                RightAnkle.idx(),
            ],
            joints: vec![
                JointSpec {
                    name: "knee_left",
                    a: LeftHip.idx(),
                    vertex: LeftKnee.idx(),
                    c: LeftAnkle.idx(),
                },
                JointSpec {
                    name: "knee_right",
                    a: RightHip.idx(),
                    vertex: RightKnee.idx(),
                    c: RightAnkle.idx(),
                },
                JointSpec {
                    name: "elbow_left",
                    a: LeftShoulder.idx(),
                    vertex: LeftElbow.idx(),
                    c: LeftWrist.idx(),
                },
                JointSpec {
                    name: "elbow_right",
                    a: RightShoulder.idx(),
                    vertex: RightElbow.idx(),
                    c: RightWrist.idx(),
                },
            ],
            visibility_threshold: 0.5,
            min_mean_visibility: 0.5,
            min_visible_landmarks: 15,
            default_fps: 30.0,
            torso_scale_floor: 1e-6,
            match_policy: MatchPolicy::FirstMatch,
        }
    }
}

impl FeatureConfig {
    /// Reject any configured index that does not exist in the skeleton.
    ///
    /// Out-of-range indices are an input-contract violation, reported before
    /// processing starts rather than surfacing as null geometry mid-run.
    pub(crate) fn validate(&self, num_landmarks: usize) -> Result<(), Error> {
        let check = |name: &'static str, index: usize| {
            if index < num_landmarks {
                Ok(())
            } else {
                Err(Error::LandmarkIndexOutOfRange {
                    name,
                    index,
                    count: num_landmarks,
                })
            }
        };

        check("left hip", self.hip_pair.0)?;
        check("right hip", self.hip_pair.1)?;
        check("left shoulder", self.shoulder_pair.0)?;
        check("right shoulder", self.shoulder_pair.1)?;
        for &index in &self.velocity_landmarks {
            check("velocity landmark", index)?;
        }
        for joint in &self.joints {
            check(joint.name, joint.a)?;
            check(joint.name, joint.vertex)?;
            check(joint.name, joint.c)?;
        }
        Ok(())
    }
}
