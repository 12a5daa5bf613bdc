use crate::{
    error::Error,
    landmarks::{Landmark, Landmarks, NUM_LANDMARKS},
};
use serde::Deserialize;
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

/// Decoder-reported metadata for one video.
#[derive(Debug, Copy, Clone, Deserialize)]
pub(crate) struct VideoMeta {
    pub(crate) total_frames: u64,
    /// Frames per second as reported by the container; zero when unknown.
    #[serde(default)]
    pub(crate) fps: f64,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Detector output for one decoded frame. `landmarks` is `None` when the
/// detector found no pose in the frame.
#[derive(Debug, Clone)]
pub(crate) struct PoseFrame {
    pub(crate) frame_native: u64,
    pub(crate) landmarks: Option<Landmarks>,
}

/// A decoded video with per-frame pose estimation attached.
///
/// Decoding and inference live behind this seam; the pipeline only ever sees
/// frame indices and fixed-size landmark sets.
pub(crate) trait PoseSource {
    /// Metadata for the whole video, known before any frame is produced.
    fn meta(&self) -> &VideoMeta;

    /// The next frame's detection, or `None` at end of stream.
    ///
    /// Frame indices must be strictly increasing; frames the decoder dropped
    /// simply never appear.
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, Error>;
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    frame: u64,
    #[serde(default)]
    landmarks: Option<Vec<[f64; 4]>>,
}

/// Pose stream stored as JSON lines: one metadata header line, then one line
/// per decoded frame.
pub(crate) struct JsonlSource {
    path: PathBuf,
    meta: VideoMeta,
    lines: std::io::Lines<std::io::BufReader<std::fs::File>>,
    line_no: usize,
    last_frame: Option<u64>,
}

/// Sidecar file holding the pose stream for a video file
/// (`Video 7.mp4` → `Video 7.landmarks.jsonl`).
pub(crate) fn sidecar_path(dir: &Path, video_file: &str) -> PathBuf {
    let stem = video_file.strip_suffix(".mp4").unwrap_or(video_file);
    dir.join(format!("{}.landmarks.jsonl", stem))
}

impl JsonlSource {
    pub(crate) fn open<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        let file =
            std::fs::File::open(&path).map_err(|e| Error::OpenPoseStream(e, path.clone()))?;
        let mut lines = std::io::BufReader::new(file).lines();

        let header = lines
            .next()
            .ok_or_else(|| Error::MissingStreamHeader(path.clone()))?
            .map_err(|e| Error::ReadStreamLine(e, 1, path.clone()))?;
        let meta: VideoMeta = serde_json::from_str(&header)
            .map_err(|e| Error::ParseStreamLine(e, 1, path.clone()))?;

        Ok(Self {
            path,
            meta,
            lines,
            line_no: 1,
            last_frame: None,
        })
    }
}

impl PoseSource for JsonlSource {
    fn meta(&self) -> &VideoMeta {
        &self.meta
    }

    fn next_frame(&mut self) -> Result<Option<PoseFrame>, Error> {
        let line = match self.lines.next() {
            Some(line) => {
                self.line_no += 1;
                line.map_err(|e| Error::ReadStreamLine(e, self.line_no, self.path.clone()))?
            }
            None => return Ok(None),
        };

        let raw: RawFrame = serde_json::from_str(&line)
            .map_err(|e| Error::ParseStreamLine(e, self.line_no, self.path.clone()))?;

        if let Some(prev) = self.last_frame {
            if raw.frame <= prev {
                return Err(Error::NonMonotonicFrames {
                    prev,
                    got: raw.frame,
                });
            }
        }
        self.last_frame = Some(raw.frame);

        let landmarks = match raw.landmarks {
            Some(points) => {
                if points.len() != NUM_LANDMARKS {
                    return Err(Error::LandmarkCountMismatch {
                        frame: raw.frame,
                        expected: NUM_LANDMARKS,
                        got: points.len(),
                    });
                }
                let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
                for (slot, &[x, y, z, visibility]) in landmarks.iter_mut().zip(&points) {
                    *slot = Landmark {
                        x,
                        y,
                        z,
                        visibility,
                    };
                }
                Some(landmarks)
            }
            None => None,
        };

        Ok(Some(PoseFrame {
            frame_native: raw.frame,
            landmarks,
        }))
    }
}
