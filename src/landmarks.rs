use num_traits::ToPrimitive;

/// The 33-point full-body pose topology, in detector output order.
#[derive(Debug, Copy, Clone, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub(crate) enum LandmarkKind {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

pub(crate) const NUM_LANDMARKS: usize = 33;

impl LandmarkKind {
    pub(crate) fn idx(self) -> usize {
        // variants are a dense 0..NUM_LANDMARKS range
        self.to_usize().unwrap_or(0)
    }
}

/// One detected anatomical point. Coordinates are normalized to the frame;
/// `visibility` is the detector's confidence in [0, 1].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub(crate) struct Landmark {
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) z: f64,
    pub(crate) visibility: f64,
}

impl Landmark {
    pub(crate) fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub(crate) fn planar_distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

pub(crate) type Landmarks = [Landmark; NUM_LANDMARKS];
