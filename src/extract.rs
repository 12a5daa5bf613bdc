use crate::{
    config::FeatureConfig,
    error::Error,
    labels::AnnotationSet,
    landmarks::Landmarks,
    reconcile::FrameIndexMap,
    source::{PoseSource, VideoMeta},
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Bounding box over all detected points, visibility ignored.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct BoundingBox {
    pub(crate) xmin: f64,
    pub(crate) ymin: f64,
    pub(crate) xmax: f64,
    pub(crate) ymax: f64,
    pub(crate) area: f64,
    /// Undefined when the box has zero height.
    pub(crate) aspect: Option<f64>,
}

impl BoundingBox {
    fn from_landmarks(landmarks: &Landmarks) -> Self {
        let mut xmin = f64::INFINITY;
        let mut ymin = f64::INFINITY;
        let mut xmax = f64::NEG_INFINITY;
        let mut ymax = f64::NEG_INFINITY;
        for lm in landmarks.iter() {
            xmin = xmin.min(lm.x);
            ymin = ymin.min(lm.y);
            xmax = xmax.max(lm.x);
            ymax = ymax.max(lm.y);
        }
        let width = xmax - xmin;
        let height = ymax - ymin;
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            area: width.max(0.0) * height.max(0.0),
            aspect: if height == 0.0 {
                None
            } else {
                Some(width / height)
            },
        }
    }
}

/// One row of the per-frame table. Built once per detected frame and
/// immutable afterwards; keyed by `(video_id, frame_native)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FrameRecord {
    pub(crate) video_id: i64,
    pub(crate) frame_native: u64,
    pub(crate) frame_annotation: u64,
    pub(crate) fps: f64,
    /// Undefined when the decoder reported no frame rate.
    pub(crate) timestamp_ms: Option<f64>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) landmarks: Landmarks,
    pub(crate) mean_visibility: f64,
    pub(crate) num_visible_lms: usize,
    pub(crate) hip_center: (f64, f64),
    pub(crate) torso_scale: f64,
    pub(crate) bbox: BoundingBox,
    pub(crate) label: String,
}

/// Assemble one record from a detection. The configured indices were
/// validated against the skeleton up front, so geometry is always defined.
pub(crate) fn build_record(
    video_id: i64,
    frame_native: u64,
    landmarks: Landmarks,
    meta: &VideoMeta,
    index_map: &FrameIndexMap,
    annotations: &AnnotationSet,
    config: &FeatureConfig,
) -> FrameRecord {
    let frame_annotation = index_map.map(frame_native);

    let mean_visibility = landmarks.iter().map(|lm| lm.visibility).sum::<f64>()
        / landmarks.len() as f64;
    let num_visible_lms = landmarks
        .iter()
        .filter(|lm| lm.visibility >= config.visibility_threshold)
        .count();

    let left_hip = &landmarks[config.hip_pair.0];
    let right_hip = &landmarks[config.hip_pair.1];
    let left_shoulder = &landmarks[config.shoulder_pair.0];
    let right_shoulder = &landmarks[config.shoulder_pair.1];

    let hip_center = (
        (left_hip.x + right_hip.x) / 2.0,
        (left_hip.y + right_hip.y) / 2.0,
    );
    let torso_scale = ((left_shoulder.planar_distance(left_hip)
        + right_shoulder.planar_distance(right_hip))
        / 2.0)
        .max(config.torso_scale_floor);

    let timestamp_ms = if meta.fps > 0.0 {
        Some(frame_native as f64 / meta.fps * 1000.0)
    } else {
        None
    };

    let label = annotations
        .lookup(video_id, frame_annotation, config.match_policy)
        .to_owned();

    FrameRecord {
        video_id,
        frame_native,
        frame_annotation,
        fps: meta.fps,
        timestamp_ms,
        width: meta.width,
        height: meta.height,
        bbox: BoundingBox::from_landmarks(&landmarks),
        landmarks,
        mean_visibility,
        num_visible_lms,
        hip_center,
        torso_scale,
        label,
    }
}

/// Drain one video's pose stream into per-frame records.
///
/// Frames without a detection are skipped entirely: no row is emitted and the
/// native index keeps advancing with the stream. A cancellation request stops
/// the loop and returns whatever rows were already built.
pub(crate) fn extract_video<S>(
    video_id: i64,
    source: &mut S,
    annotations: &AnnotationSet,
    config: &FeatureConfig,
    cancel: &AtomicBool,
) -> Result<Vec<FrameRecord>, Error>
where
    S: PoseSource,
{
    let meta = *source.meta();
    let index_map = FrameIndexMap::new(meta.total_frames, annotations.max_end_frame(video_id));

    info!(
        video_id,
        total_frames = meta.total_frames,
        fps = meta.fps,
        ratio = index_map.ratio(),
        "extracting video"
    );

    let mut records = Vec::new();
    while let Some(frame) = source.next_frame()? {
        if cancel.load(Ordering::SeqCst) {
            warn!(
                video_id,
                rows = records.len(),
                "cancellation requested, flushing partial video"
            );
            break;
        }
        match frame.landmarks {
            Some(landmarks) => records.push(build_record(
                video_id,
                frame.frame_native,
                landmarks,
                &meta,
                &index_map,
                annotations,
                config,
            )),
            None => debug!(video_id, frame = frame.frame_native, "no detection"),
        }
    }

    info!(video_id, rows = records.len(), "video extracted");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        landmarks::{Landmark, LandmarkKind::*, NUM_LANDMARKS},
        source::PoseFrame,
    };
    use assert_approx_eq::assert_approx_eq;

    fn flat_landmarks(visibility: f64) -> Landmarks {
        [Landmark {
            x: 0.5,
            y: 0.5,
            z: 0.0,
            visibility,
        }; NUM_LANDMARKS]
    }

    fn posed_landmarks() -> Landmarks {
        let mut landmarks = flat_landmarks(0.9);
        landmarks[LeftShoulder.idx()] = Landmark {
            x: 0.4,
            y: 0.3,
            z: 0.0,
            visibility: 0.9,
        };
        landmarks[RightShoulder.idx()] = Landmark {
            x: 0.6,
            y: 0.3,
            z: 0.0,
            visibility: 0.9,
        };
        landmarks[LeftHip.idx()] = Landmark {
            x: 0.4,
            y: 0.7,
            z: 0.0,
            visibility: 0.9,
        };
        landmarks[RightHip.idx()] = Landmark {
            x: 0.6,
            y: 0.7,
            z: 0.0,
            visibility: 0.9,
        };
        landmarks
    }

    fn meta(fps: f64) -> VideoMeta {
        VideoMeta {
            total_frames: 100,
            fps,
            width: 640,
            height: 480,
        }
    }

    fn empty_annotations() -> AnnotationSet {
        AnnotationSet::empty()
    }

    mod record_tests {
        use super::*;
        use crate::labels::UNLABELED;

        #[test]
        fn geometry_and_quality() {
            let record = build_record(
                1,
                10,
                posed_landmarks(),
                &meta(25.0),
                &FrameIndexMap::new(100, None),
                &empty_annotations(),
                &FeatureConfig::default(),
            );

            assert_approx_eq!(record.hip_center.0, 0.5);
            assert_approx_eq!(record.hip_center.1, 0.7);
            // both shoulder-to-hip spans are 0.4 in y
            assert_approx_eq!(record.torso_scale, 0.4);
            assert_approx_eq!(record.mean_visibility, 0.9);
            assert_eq!(record.num_visible_lms, NUM_LANDMARKS);
            assert_approx_eq!(record.timestamp_ms.unwrap(), 400.0);
            assert_eq!(record.label, UNLABELED);

            assert!(record.mean_visibility >= 0.0 && record.mean_visibility <= 1.0);
            assert!(record.num_visible_lms <= NUM_LANDMARKS);
        }

        #[test]
        fn missing_fps_leaves_timestamp_undefined() {
            let record = build_record(
                1,
                10,
                posed_landmarks(),
                &meta(0.0),
                &FrameIndexMap::new(100, None),
                &empty_annotations(),
                &FeatureConfig::default(),
            );
            assert!(record.timestamp_ms.is_none());
        }

        #[test]
        fn degenerate_box_has_no_aspect() {
            // all points coincide, so the box is a single point
            let record = build_record(
                1,
                0,
                flat_landmarks(0.2),
                &meta(30.0),
                &FrameIndexMap::new(100, None),
                &empty_annotations(),
                &FeatureConfig::default(),
            );
            assert!(record.bbox.aspect.is_none());
            assert_approx_eq!(record.bbox.area, 0.0);
            assert_eq!(record.num_visible_lms, 0);
        }

        #[test]
        fn torso_scale_never_reaches_zero() {
            let record = build_record(
                1,
                0,
                flat_landmarks(0.9),
                &meta(30.0),
                &FrameIndexMap::new(100, None),
                &empty_annotations(),
                &FeatureConfig::default(),
            );
            assert!(record.torso_scale >= 1e-6);
        }
    }

    mod extraction_tests {
        use super::*;

        struct ScriptedSource {
            meta: VideoMeta,
            frames: std::vec::IntoIter<PoseFrame>,
        }

        impl PoseSource for ScriptedSource {
            fn meta(&self) -> &VideoMeta {
                &self.meta
            }

            fn next_frame(&mut self) -> Result<Option<PoseFrame>, Error> {
                Ok(self.frames.next())
            }
        }

        #[test]
        fn undetected_frames_are_skipped() {
            let mut source = ScriptedSource {
                meta: meta(30.0),
                frames: vec![
                    PoseFrame {
                        frame_native: 0,
                        landmarks: Some(posed_landmarks()),
                    },
                    PoseFrame {
                        frame_native: 1,
                        landmarks: None,
                    },
                    PoseFrame {
                        frame_native: 2,
                        landmarks: Some(posed_landmarks()),
                    },
                ]
                .into_iter(),
            };

            let cancel = AtomicBool::new(false);
            let records = extract_video(
                7,
                &mut source,
                &empty_annotations(),
                &FeatureConfig::default(),
                &cancel,
            )
            .unwrap();

            // frame 1 produced no row, but the native index kept advancing
            assert_eq!(
                records.iter().map(|r| r.frame_native).collect::<Vec<_>>(),
                vec![0, 2]
            );
        }

        #[test]
        fn cancellation_flushes_nothing_further() {
            let mut source = ScriptedSource {
                meta: meta(30.0),
                frames: vec![PoseFrame {
                    frame_native: 0,
                    landmarks: Some(posed_landmarks()),
                }]
                .into_iter(),
            };

            let cancel = AtomicBool::new(true);
            let records = extract_video(
                7,
                &mut source,
                &empty_annotations(),
                &FeatureConfig::default(),
                &cancel,
            )
            .unwrap();
            assert!(records.is_empty());
        }
    }
}
