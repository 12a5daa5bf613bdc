use crate::{
    config::FeatureConfig,
    enrich::EnrichedRecord,
    error::Error,
    extract::{BoundingBox, FrameRecord},
    landmarks::{Landmark, NUM_LANDMARKS},
};
use std::path::Path;

// Scalar columns shared by both tables, in writing order. Landmark columns
// are flattened between the metadata block and the quality block.
const META_COLUMNS: [&str; 7] = [
    "video_id",
    "frame_native",
    "frame_annotation",
    "fps",
    "timestamp_ms",
    "width",
    "height",
];

const QUALITY_COLUMNS: [&str; 12] = [
    "mean_visibility",
    "num_visible_lms",
    "hip_center_x",
    "hip_center_y",
    "torso_scale",
    "bbox_xmin",
    "bbox_ymin",
    "bbox_xmax",
    "bbox_ymax",
    "bbox_area",
    "bbox_aspect",
    "label",
];

fn frame_headers() -> Vec<String> {
    let mut headers: Vec<String> = META_COLUMNS.iter().map(|&c| c.to_owned()).collect();
    for i in 0..NUM_LANDMARKS {
        headers.push(format!("x_{}", i));
        headers.push(format!("y_{}", i));
        headers.push(format!("z_{}", i));
        headers.push(format!("v_{}", i));
    }
    headers.extend(QUALITY_COLUMNS.iter().map(|&c| c.to_owned()));
    headers
}

fn enriched_headers(config: &FeatureConfig) -> Vec<String> {
    let mut headers = frame_headers();
    headers.push("fps_eff".to_owned());
    for &lm in &config.velocity_landmarks {
        headers.push(format!("speed_{}", lm));
    }
    for joint in &config.joints {
        headers.push(format!("{}_deg", joint.name));
    }
    headers.push("segment_id".to_owned());
    headers.push("low_quality".to_owned());
    headers
}

fn push_f64(row: &mut Vec<String>, value: f64) {
    row.push(value.to_string());
}

// an empty cell encodes an undefined value
fn push_opt_f64(row: &mut Vec<String>, value: Option<f64>) {
    row.push(value.map(|v| v.to_string()).unwrap_or_default());
}

fn frame_row(record: &FrameRecord) -> Vec<String> {
    let mut row = Vec::with_capacity(META_COLUMNS.len() + NUM_LANDMARKS * 4 + QUALITY_COLUMNS.len());
    row.push(record.video_id.to_string());
    row.push(record.frame_native.to_string());
    row.push(record.frame_annotation.to_string());
    push_f64(&mut row, record.fps);
    push_opt_f64(&mut row, record.timestamp_ms);
    row.push(record.width.to_string());
    row.push(record.height.to_string());
    for lm in record.landmarks.iter() {
        push_f64(&mut row, lm.x);
        push_f64(&mut row, lm.y);
        push_f64(&mut row, lm.z);
        push_f64(&mut row, lm.visibility);
    }
    push_f64(&mut row, record.mean_visibility);
    row.push(record.num_visible_lms.to_string());
    push_f64(&mut row, record.hip_center.0);
    push_f64(&mut row, record.hip_center.1);
    push_f64(&mut row, record.torso_scale);
    push_f64(&mut row, record.bbox.xmin);
    push_f64(&mut row, record.bbox.ymin);
    push_f64(&mut row, record.bbox.xmax);
    push_f64(&mut row, record.bbox.ymax);
    push_f64(&mut row, record.bbox.area);
    push_opt_f64(&mut row, record.bbox.aspect);
    row.push(record.label.clone());
    row
}

pub(crate) fn write_frame_table<P>(path: P, records: &[FrameRecord]) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| Error::CreateOutput(e, path.to_path_buf()))?;
    writer
        .write_record(&frame_headers())
        .map_err(Error::WriteRow)?;
    for record in records {
        writer.write_record(&frame_row(record)).map_err(Error::WriteRow)?;
    }
    writer.flush().map_err(Error::FlushOutput)?;
    Ok(())
}

pub(crate) fn write_enriched_table<P>(
    path: P,
    records: &[EnrichedRecord],
    config: &FeatureConfig,
) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| Error::CreateOutput(e, path.to_path_buf()))?;
    writer
        .write_record(&enriched_headers(config))
        .map_err(Error::WriteRow)?;
    for record in records {
        let mut row = frame_row(&record.frame);
        push_f64(&mut row, record.fps_eff);
        for &speed in &record.speeds {
            push_f64(&mut row, speed);
        }
        for &angle in &record.angles {
            push_opt_f64(&mut row, angle);
        }
        row.push(record.segment_id.to_string());
        row.push(record.low_quality.to_string());
        writer.write_record(&row).map_err(Error::WriteRow)?;
    }
    writer.flush().map_err(Error::FlushOutput)?;
    Ok(())
}

/// Column accessor for one CSV row; missing columns and unparseable cells
/// are hard errors naming the column and row.
struct RowReader<'a> {
    headers: &'a csv::StringRecord,
    row: &'a csv::StringRecord,
    row_no: usize,
}

impl<'a> RowReader<'a> {
    fn raw(&self, column: &str) -> Result<&'a str, Error> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.row.get(i))
            .ok_or_else(|| Error::MissingColumn(column.to_owned()))
    }

    fn parse<T>(&self, column: &str) -> Result<T, Error>
    where
        T: std::str::FromStr,
    {
        let raw = self.raw(column)?;
        raw.parse().map_err(|_| Error::ParseColumn {
            column: column.to_owned(),
            value: raw.to_owned(),
            row: self.row_no,
        })
    }

    fn parse_opt_f64(&self, column: &str) -> Result<Option<f64>, Error> {
        let raw = self.raw(column)?;
        if raw.is_empty() {
            Ok(None)
        } else {
            self.parse(column).map(Some)
        }
    }
}

fn frame_from_row(reader: &RowReader) -> Result<FrameRecord, Error> {
    let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
    for (i, lm) in landmarks.iter_mut().enumerate() {
        lm.x = reader.parse(&format!("x_{}", i))?;
        lm.y = reader.parse(&format!("y_{}", i))?;
        lm.z = reader.parse(&format!("z_{}", i))?;
        lm.visibility = reader.parse(&format!("v_{}", i))?;
    }

    Ok(FrameRecord {
        video_id: reader.parse("video_id")?,
        frame_native: reader.parse("frame_native")?,
        frame_annotation: reader.parse("frame_annotation")?,
        fps: reader.parse("fps")?,
        timestamp_ms: reader.parse_opt_f64("timestamp_ms")?,
        width: reader.parse("width")?,
        height: reader.parse("height")?,
        landmarks,
        mean_visibility: reader.parse("mean_visibility")?,
        num_visible_lms: reader.parse("num_visible_lms")?,
        hip_center: (
            reader.parse("hip_center_x")?,
            reader.parse("hip_center_y")?,
        ),
        torso_scale: reader.parse("torso_scale")?,
        bbox: BoundingBox {
            xmin: reader.parse("bbox_xmin")?,
            ymin: reader.parse("bbox_ymin")?,
            xmax: reader.parse("bbox_xmax")?,
            ymax: reader.parse("bbox_ymax")?,
            area: reader.parse("bbox_area")?,
            aspect: reader.parse_opt_f64("bbox_aspect")?,
        },
        label: reader.raw("label")?.to_owned(),
    })
}

pub(crate) fn read_frame_table<P>(path: P) -> Result<Vec<FrameRecord>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut csv_reader =
        csv::Reader::from_path(path).map_err(|e| Error::OpenTable(e, path.to_path_buf()))?;
    let headers = csv_reader
        .headers()
        .map_err(|e| Error::ReadHeader(e, path.to_path_buf()))?
        .clone();

    let mut records = Vec::new();
    for (i, row) in csv_reader.records().enumerate() {
        let row = row.map_err(Error::ReadRow)?;
        let reader = RowReader {
            headers: &headers,
            row: &row,
            row_no: i + 2, // 1-based, after the header line
        };
        records.push(frame_from_row(&reader)?);
    }
    Ok(records)
}

pub(crate) fn read_enriched_table<P>(
    path: P,
    config: &FeatureConfig,
) -> Result<Vec<EnrichedRecord>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut csv_reader =
        csv::Reader::from_path(path).map_err(|e| Error::OpenTable(e, path.to_path_buf()))?;
    let headers = csv_reader
        .headers()
        .map_err(|e| Error::ReadHeader(e, path.to_path_buf()))?
        .clone();

    let mut records = Vec::new();
    for (i, row) in csv_reader.records().enumerate() {
        let row = row.map_err(Error::ReadRow)?;
        let reader = RowReader {
            headers: &headers,
            row: &row,
            row_no: i + 2,
        };

        let frame = frame_from_row(&reader)?;
        let speeds = config
            .velocity_landmarks
            .iter()
            .map(|&lm| reader.parse(&format!("speed_{}", lm)))
            .collect::<Result<_, _>>()?;
        let angles = config
            .joints
            .iter()
            .map(|joint| reader.parse_opt_f64(&format!("{}_deg", joint.name)))
            .collect::<Result<_, _>>()?;

        records.push(EnrichedRecord {
            frame,
            fps_eff: reader.parse("fps_eff")?,
            speeds,
            angles,
            segment_id: reader.parse("segment_id")?,
            low_quality: reader.parse("low_quality")?,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{enrich, labels::UNLABELED, landmarks::Landmark};

    fn synthetic_record(video_id: i64, frame_native: u64, label: &str) -> FrameRecord {
        let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            lm.x = 0.1 + i as f64 * 0.01;
            lm.y = 0.2 + i as f64 * 0.005;
            lm.z = -0.05 + i as f64 * 0.001;
            lm.visibility = 1.0 - i as f64 * 0.02;
        }
        FrameRecord {
            video_id,
            frame_native,
            frame_annotation: frame_native / 2,
            fps: 29.97,
            timestamp_ms: Some(frame_native as f64 / 29.97 * 1000.0),
            width: 1920,
            height: 1080,
            landmarks,
            mean_visibility: 0.68,
            num_visible_lms: 25,
            hip_center: (0.415, 0.3175),
            torso_scale: 0.21093,
            bbox: BoundingBox {
                xmin: 0.1,
                ymin: 0.2,
                xmax: 0.42,
                ymax: 0.36,
                area: 0.0512,
                aspect: Some(2.0),
            },
            label: label.to_owned(),
        }
    }

    #[test]
    fn frame_table_round_trips() {
        let records = vec![
            synthetic_record(1, 0, "Walk"),
            synthetic_record(1, 1, "Walk, fast"),
            synthetic_record(2, 0, UNLABELED),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.csv");

        write_frame_table(&path, &records).unwrap();
        let restored = read_frame_table(&path).unwrap();

        // f64::to_string round-trips exactly, so full equality holds
        assert_eq!(restored, records);
    }

    #[test]
    fn undefined_cells_survive_the_round_trip() {
        let mut record = synthetic_record(1, 0, "Walk");
        record.timestamp_ms = None;
        record.bbox.aspect = None;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.csv");

        write_frame_table(&path, &[record.clone()]).unwrap();
        let restored = read_frame_table(&path).unwrap();
        assert_eq!(restored, vec![record]);
    }

    #[test]
    fn enriched_table_round_trips() {
        let config = FeatureConfig::default();
        let records = vec![
            synthetic_record(1, 0, "Walk"),
            synthetic_record(1, 1, "Run"),
        ];
        let enriched = enrich::enrich(records, &config);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enriched.csv");

        write_enriched_table(&path, &enriched, &config).unwrap();
        let restored = read_enriched_table(&path, &config).unwrap();
        assert_eq!(restored, enriched);
    }

    #[test]
    fn missing_column_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "video_id,frame_native\n1,0\n").unwrap();
        // landmark columns are resolved first
        match read_frame_table(&path) {
            Err(Error::MissingColumn(column)) => assert_eq!(column, "x_0"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn headers_cover_full_skeleton() {
        let headers = frame_headers();
        assert_eq!(
            headers.len(),
            META_COLUMNS.len() + NUM_LANDMARKS * 4 + QUALITY_COLUMNS.len()
        );
        assert!(headers.iter().any(|h| h == "x_32"));
        assert!(headers.iter().any(|h| h == "v_0"));
    }

    #[test]
    fn enriched_headers_follow_config() {
        let headers = enriched_headers(&FeatureConfig::default());
        for expected in [
            "fps_eff",
            "speed_15",
            "speed_28",
            "knee_left_deg",
            "elbow_right_deg",
            "segment_id",
            "low_quality",
        ]
        .iter()
        {
            assert!(headers.iter().any(|h| h == expected), "{}", expected);
        }
    }
}
