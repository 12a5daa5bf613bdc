use crate::error::Error;
use serde::Deserialize;
use std::{path::Path, str::FromStr};

/// Sentinel label for frames no interval covers.
pub(crate) const UNLABELED: &str = "Unlabeled";

/// How overlapping annotation intervals are resolved.
///
/// `FirstMatch` preserves the file-order scan existing datasets were labeled
/// with and is the default. `MostSpecific` prefers the narrowest containing
/// interval, ties broken by file order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum MatchPolicy {
    FirstMatch,
    MostSpecific,
}

impl FromStr for MatchPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-match" => Ok(Self::FirstMatch),
            "most-specific" => Ok(Self::MostSpecific),
            other => Err(Error::ParseMatchPolicy(other.to_owned())),
        }
    }
}

/// One labeled time range, in the annotation tool's own frame numbering.
/// Both endpoints are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Interval {
    pub(crate) start: u64,
    pub(crate) end: u64,
    pub(crate) label: String,
}

impl Interval {
    fn contains(&self, frame: u64) -> bool {
        self.start <= frame && frame <= self.end
    }

    fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VideoAnnotations {
    pub(crate) video_id: i64,
    /// On-disk file name derived from the export's upload name, when present.
    pub(crate) expected_file: Option<String>,
    /// Intervals in export file order; order is load-bearing for `FirstMatch`.
    pub(crate) intervals: Vec<Interval>,
}

#[derive(Debug, Clone)]
pub(crate) struct AnnotationSet {
    videos: Vec<VideoAnnotations>,
}

// Raw export schema. Newer exports nest results under "annotations", older
// ones under "completions"; only the first result set of an entry counts.
#[derive(Debug, Deserialize)]
struct RawEntry {
    id: i64,
    #[serde(default)]
    file_upload: Option<String>,
    #[serde(default)]
    annotations: Vec<RawResultSet>,
    #[serde(default)]
    completions: Vec<RawResultSet>,
}

#[derive(Debug, Deserialize)]
struct RawResultSet {
    #[serde(default)]
    result: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    value: RawValue,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(default)]
    ranges: Vec<RawRange>,
    #[serde(default)]
    timelinelabels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    start: u64,
    end: u64,
}

/// `Video_7.mp4` in the export names `Video 7.mp4` on disk.
fn expected_file_name(file_upload: &str) -> String {
    let base = file_upload
        .rsplit('/')
        .next()
        .unwrap_or(file_upload)
        .rsplit('-')
        .next()
        .unwrap_or(file_upload);
    let video_num = base.replace("Video_", "").replace(".mp4", "");
    format!("Video {}.mp4", video_num)
}

impl AnnotationSet {
    pub(crate) fn load<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::OpenAnnotationFile(e, path.to_path_buf()))?;
        let entries: Vec<RawEntry> = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::ParseAnnotationFile(e, path.to_path_buf()))?;
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<RawEntry>) -> Result<Self, Error> {
        let mut videos = Vec::with_capacity(entries.len());
        for entry in entries {
            let result_set = entry
                .annotations
                .first()
                .or_else(|| entry.completions.first())
                .ok_or(Error::EmptyAnnotationEntry(entry.id))?;

            let mut intervals = Vec::with_capacity(result_set.result.len());
            for (i, result) in result_set.result.iter().enumerate() {
                let range = result
                    .value
                    .ranges
                    .first()
                    .ok_or(Error::MissingRanges(entry.id, i))?;
                let label = result
                    .value
                    .timelinelabels
                    .first()
                    .ok_or(Error::MissingTimelineLabels(entry.id, i))?;
                intervals.push(Interval {
                    start: range.start,
                    end: range.end,
                    label: label.clone(),
                });
            }

            videos.push(VideoAnnotations {
                video_id: entry.id,
                expected_file: entry.file_upload.as_deref().map(expected_file_name),
                intervals,
            });
        }
        Ok(Self { videos })
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self { videos: Vec::new() }
    }

    pub(crate) fn videos(&self) -> &[VideoAnnotations] {
        &self.videos
    }

    fn video(&self, video_id: i64) -> Option<&VideoAnnotations> {
        self.videos.iter().find(|v| v.video_id == video_id)
    }

    /// Resolve a mapped frame index to a label, or [`UNLABELED`].
    pub(crate) fn lookup(&self, video_id: i64, frame: u64, policy: MatchPolicy) -> &str {
        let intervals = match self.video(video_id) {
            Some(video) => &video.intervals,
            None => return UNLABELED,
        };
        let matched = match policy {
            MatchPolicy::FirstMatch => intervals.iter().find(|iv| iv.contains(frame)),
            MatchPolicy::MostSpecific => intervals
                .iter()
                .filter(|iv| iv.contains(frame))
                .min_by_key(|iv| iv.width()),
        };
        matched.map(|iv| iv.label.as_str()).unwrap_or(UNLABELED)
    }

    /// The largest end frame annotated for a video, in tool-native units.
    pub(crate) fn max_end_frame(&self, video_id: i64) -> Option<u64> {
        self.video(video_id)
            .and_then(|video| video.intervals.iter().map(|iv| iv.end).max())
    }
}
