use crate::{config::FeatureConfig, extract::FrameRecord};
use ordered_float::NotNan;
use tracing::debug;

/// A per-frame record plus the derivations computed over its video's
/// frame-ordered series. `speeds` and `angles` run parallel to the
/// configured velocity landmarks and joints.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EnrichedRecord {
    pub(crate) frame: FrameRecord,
    pub(crate) fps_eff: f64,
    pub(crate) speeds: Vec<f64>,
    pub(crate) angles: Vec<Option<f64>>,
    pub(crate) segment_id: u32,
    pub(crate) low_quality: bool,
}

/// Angle at `b` between the rays towards `a` and `c`, in degrees [0, 180].
///
/// Undefined when either ray has zero length; callers get `None` rather than
/// a NaN or a panic.
pub(crate) fn angle_deg(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<f64> {
    let ba = (a.0 - b.0, a.1 - b.1);
    let bc = (c.0 - b.0, c.1 - b.1);
    let den = ba.0.hypot(ba.1) * bc.0.hypot(bc.1);
    if den == 0.0 {
        return None;
    }
    let cos = ((ba.0 * bc.0 + ba.1 * bc.1) / den).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

fn median(mut values: Vec<NotNan<f64>>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 1 {
        values[mid].into_inner()
    } else {
        (values[mid - 1].into_inner() + values[mid].into_inner()) / 2.0
    })
}

fn usable_fps(fps: f64) -> bool {
    fps.is_finite() && fps > 0.0
}

/// Derive all features for one video's frame-ordered records.
fn enrich_group(group: &[FrameRecord], config: &FeatureConfig) -> Vec<EnrichedRecord> {
    let group_median = median(
        group
            .iter()
            .filter(|r| usable_fps(r.fps))
            .filter_map(|r| NotNan::new(r.fps).ok())
            .collect(),
    );
    let imputed_fps = group_median.unwrap_or(config.default_fps);

    let mut enriched = Vec::with_capacity(group.len());
    let mut segment_id = 1u32;

    for (i, record) in group.iter().enumerate() {
        let fps_eff = if usable_fps(record.fps) {
            record.fps
        } else {
            imputed_fps
        };

        let prev = if i > 0 { Some(&group[i - 1]) } else { None };

        let speeds = config
            .velocity_landmarks
            .iter()
            .map(|&lm| match prev {
                Some(prev) => {
                    let dx = record.landmarks[lm].x - prev.landmarks[lm].x;
                    let dy = record.landmarks[lm].y - prev.landmarks[lm].y;
                    dx.hypot(dy) * fps_eff
                }
                // first frame of a video has no prior frame
                None => 0.0,
            })
            .collect();

        let angles = config
            .joints
            .iter()
            .map(|joint| {
                angle_deg(
                    record.landmarks[joint.a].xy(),
                    record.landmarks[joint.vertex].xy(),
                    record.landmarks[joint.c].xy(),
                )
            })
            .collect();

        if let Some(prev) = prev {
            if prev.label != record.label {
                segment_id += 1;
            }
        }

        let low_quality = record.mean_visibility < config.min_mean_visibility
            || record.num_visible_lms < config.min_visible_landmarks;

        enriched.push(EnrichedRecord {
            frame: record.clone(),
            fps_eff,
            speeds,
            angles,
            segment_id,
            low_quality,
        });
    }

    enriched
}

/// Sort the full table by `(video_id, frame_native)`, then derive features
/// per video group. Groups never see each other's frames.
pub(crate) fn enrich(mut records: Vec<FrameRecord>, config: &FeatureConfig) -> Vec<EnrichedRecord> {
    records.sort_by_key(|r| (r.video_id, r.frame_native));

    let mut enriched = Vec::with_capacity(records.len());
    let mut start = 0;
    while start < records.len() {
        let video_id = records[start].video_id;
        let end = records[start..]
            .iter()
            .position(|r| r.video_id != video_id)
            .map(|offset| start + offset)
            .unwrap_or_else(|| records.len());
        debug!(video_id, rows = end - start, "enriching video group");
        enriched.extend(enrich_group(&records[start..end], config));
        start = end;
    }
    enriched
}
