/// Rescales a decoder-native frame index onto the annotation tool's numbering.
///
/// The decoder and the annotation tool may count frames differently (dropped
/// frames, differing frame-rate assumptions), so the two indices are
/// reconciled by the ratio of their maximum observed counts. This is a
/// best-effort affine rescaling, not an exact frame correspondence.
#[derive(Debug, Copy, Clone)]
pub(crate) struct FrameIndexMap {
    ratio: f64,
}

impl FrameIndexMap {
    /// `total_native` is the decoder's frame count; `max_annotation` the
    /// largest annotated end frame, when the video was annotated at all.
    /// When either is unknown or zero the mapping degrades to identity.
    pub(crate) fn new(total_native: u64, max_annotation: Option<u64>) -> Self {
        let ratio = match max_annotation {
            Some(max) if max > 0 && total_native > 0 => max as f64 / total_native as f64,
            _ => 1.0,
        };
        Self { ratio }
    }

    pub(crate) fn ratio(&self) -> f64 {
        self.ratio
    }

    pub(crate) fn map(&self, frame_native: u64) -> u64 {
        (frame_native as f64 * self.ratio).floor() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::FrameIndexMap;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn halved_index_space() {
        let map = FrameIndexMap::new(100, Some(50));
        assert_approx_eq!(map.ratio(), 0.5);
        assert_eq!(map.map(40), 20);
        assert_eq!(map.map(41), 20);
        assert_eq!(map.map(0), 0);
    }

    #[test]
    fn unannotated_video_maps_identically() {
        let map = FrameIndexMap::new(100, None);
        assert_approx_eq!(map.ratio(), 1.0);
        assert_eq!(map.map(40), 40);
    }

    #[test]
    fn zero_native_count_maps_identically() {
        let map = FrameIndexMap::new(0, Some(50));
        assert_approx_eq!(map.ratio(), 1.0);
    }

    #[test]
    fn zero_annotation_max_maps_identically() {
        let map = FrameIndexMap::new(100, Some(0));
        assert_approx_eq!(map.ratio(), 1.0);
    }

    #[test]
    fn stretched_index_space() {
        let map = FrameIndexMap::new(50, Some(100));
        assert_eq!(map.map(25), 50);
    }
}
