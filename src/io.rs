//! File formats: corner frames in, track files out
//!
//! The frame-sequence control file names a basename, a frame range, and a
//! per-frame detection count; each frame lives in its own whitespace
//! separated file `dir/basename.N`. The output track file is text, opening
//! with a comment block that echoes the parameters.

use std::fmt::Write as _;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::TrackerParams;
use crate::errors::TrackerError;
use crate::mht::{Detection, DetectionBatch};
use crate::models::Texture;
use crate::output::{CornerTrack, ElementCode, FalseAlarm, TrackElement, PALETTE};

/// Read the control file and every frame file it names.
///
/// Returns one batch per frame, in frame order, each carrying the control
/// file's time delta.
pub fn read_corners(
    control_path: impl AsRef<Path>,
    dir: impl AsRef<Path>,
) -> Result<Vec<DetectionBatch>, TrackerError> {
    let control_path = control_path.as_ref();
    let control_str = control_path.display().to_string();
    let file = fs::File::open(control_path).map_err(|e| TrackerError::io(control_str.as_str(), e))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| TrackerError::io(control_str.as_str(), e))?,
        None => return Err(TrackerError::parse(control_str.as_str(), 1, "control header")),
    };
    let mut fields = header.split_whitespace();
    let basename = fields
        .next()
        .ok_or_else(|| TrackerError::parse(control_str.as_str(), 1, "basename"))?
        .to_string();
    let total_frames: usize = fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| TrackerError::parse(control_str.as_str(), 1, "total frame count"))?;
    let start_frame: i64 = fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| TrackerError::parse(control_str.as_str(), 1, "start frame"))?;
    let time_delta: f64 = fields.next().and_then(|v| v.parse().ok()).unwrap_or(1.0);

    let mut counts = Vec::with_capacity(total_frames);
    let mut line_no = 1;
    for line in lines {
        let line = line.map_err(|e| TrackerError::io(control_str.as_str(), e))?;
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let count: usize = trimmed
            .parse()
            .map_err(|_| TrackerError::parse(control_str.as_str(), line_no, "per-frame corner count"))?;
        counts.push(count);
        if counts.len() == total_frames {
            break;
        }
    }
    if counts.len() < total_frames {
        return Err(TrackerError::parse(
            &control_str,
            line_no,
            "one corner count per frame",
        ));
    }

    let mut batches = Vec::with_capacity(total_frames);
    for (index, &count) in counts.iter().enumerate() {
        let frame_no = start_frame + index as i64;
        let frame_path = dir.as_ref().join(format!("{}.{}", basename, frame_no));
        let detections = read_frame(&frame_path, frame_no as i32, count)?;
        batches.push(DetectionBatch::new(time_delta, detections));
    }
    Ok(batches)
}

/// Read one frame file: `x y i1..i25 cornerID` per line.
fn read_frame(
    path: &Path,
    frame_no: i32,
    count: usize,
) -> Result<Vec<Detection>, TrackerError> {
    let path_str = path.display().to_string();
    let file = fs::File::open(path).map_err(|e| TrackerError::io(path_str.as_str(), e))?;

    let mut detections = Vec::with_capacity(count);
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        if detections.len() == count {
            break;
        }
        let line = line.map_err(|e| TrackerError::io(path_str.as_str(), e))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 28 {
            return Err(TrackerError::parse(
                &path_str,
                idx + 1,
                "x y, 25 texture values and a corner id",
            ));
        }

        let parse_f64 = |s: &str| -> Result<f64, TrackerError> {
            s.parse()
                .map_err(|_| TrackerError::parse(path_str.as_str(), idx + 1, "a number"))
        };

        let x = parse_f64(fields[0])?;
        let y = parse_f64(fields[1])?;
        let mut texture = [0.0; 25];
        for (t, field) in texture.iter_mut().zip(&fields[2..27]) {
            *t = parse_f64(field)?;
        }
        let corner_id: u64 = fields[27]
            .parse()
            .map_err(|_| TrackerError::parse(path_str.as_str(), idx + 1, "an unsigned corner id"))?;

        detections.push(Detection {
            x,
            y,
            texture: Texture::new(texture),
            frame: frame_no,
            corner_id,
        });
    }
    Ok(detections)
}

/// Render the output track file.
pub fn render_track_file(
    params: &TrackerParams,
    tracks: &[CornerTrack],
    false_alarms: &[FalseAlarm],
) -> String {
    let mut out = String::new();

    out.push_str("#INFORMATION REGARDING THIS CORNER TRACKER\n");
    out.push_str("#___________________________________________\n");
    out.push_str("#\n#\n");
    out.push_str("#    Parameters: \n");
    out.push_str("#\n");
    let mut echo = |name: &str, value: String| {
        let _ = writeln!(out, "#         {}:  {}", name, value);
        out.push_str("#\n");
    };
    echo("PositionVarianceX", params.position_variance_x.to_string());
    echo("PositionVarianceY", params.position_variance_y.to_string());
    echo("GradientVariance", params.gradient_variance.to_string());
    echo("intensityVariance", params.intensity_variance.to_string());
    echo("ProcessVariance", params.process_variance.to_string());
    echo("StateVariance", params.state_variance.to_string());
    echo("Prob. Of Detection", params.prob_detect.to_string());
    echo("Prob Of Track Ending", params.prob_end.to_string());
    echo("Mean New Tracks", params.mean_new.to_string());
    echo("Mean False Alarms", params.mean_falarms.to_string());
    echo("Max Global Hypo", params.max_g_hypos.to_string());
    echo("Max Depth", params.max_depth.to_string());
    echo("MinGHypoRatio", params.min_g_hypo_ratio.to_string());
    echo("intensity Threshold", params.intensity_threshold.to_string());
    echo("Max Mahalinobus Dist1", params.max_distance_1.to_string());
    echo("Max Mahalinobus Dist2", params.max_distance_2.to_string());
    echo("Max Mahalinobus Dist3", params.max_distance_3.to_string());

    let _ = writeln!(out, "{}", tracks.len());
    let _ = writeln!(out, "{}", false_alarms.len());

    for track in tracks {
        let _ = writeln!(out, "{} {}", track.id, track.elements.len());
        for el in &track.elements {
            let _ = writeln!(
                out,
                "{} {} {} {} {} {} {} {} {} {}",
                el.code.as_char(),
                el.rx,
                el.ry,
                el.sx,
                el.sy,
                el.log_likelihood,
                el.time,
                el.frame,
                el.model_code,
                el.corner_id
            );
        }
    }

    for falarm in false_alarms {
        let _ = writeln!(
            out,
            "{} {} {} {}",
            falarm.x, falarm.y, falarm.frame, falarm.corner_id
        );
    }

    out
}

/// Write the output track file.
pub fn write_track_file(
    path: impl AsRef<Path>,
    params: &TrackerParams,
    tracks: &[CornerTrack],
    false_alarms: &[FalseAlarm],
) -> Result<(), TrackerError> {
    let path = path.as_ref();
    let body = render_track_file(params, tracks, false_alarms);
    fs::write(path, body).map_err(|e| TrackerError::io(path.display().to_string(), e))
}

/// Parse a track file back into tracks and false alarms.
///
/// The parameter echo in the header is skipped; only the data is restored.
pub fn parse_track_file(body: &str) -> Result<(Vec<CornerTrack>, Vec<FalseAlarm>), TrackerError> {
    const PATH: &str = "<track file>";
    let data: Vec<(usize, &str)> = body
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
        .map(|(no, line)| (no + 1, line))
        .collect();
    let mut pos = 0usize;

    fn next<'a>(
        data: &[(usize, &'a str)],
        pos: &mut usize,
        expected: &'static str,
    ) -> Result<(usize, &'a str), TrackerError> {
        match data.get(*pos) {
            Some(&item) => {
                *pos += 1;
                Ok(item)
            }
            None => Err(TrackerError::parse("<track file>", 0, expected)),
        }
    }

    let (no, line) = next(&data, &mut pos, "track count")?;
    let num_tracks: usize = line
        .trim()
        .parse()
        .map_err(|_| TrackerError::parse(PATH, no, "track count"))?;
    let (no, line) = next(&data, &mut pos, "false alarm count")?;
    let num_falarms: usize = line
        .trim()
        .parse()
        .map_err(|_| TrackerError::parse(PATH, no, "false alarm count"))?;

    let mut tracks = Vec::with_capacity(num_tracks);
    for _ in 0..num_tracks {
        let (no, line) = next(&data, &mut pos, "track id and length")?;
        let mut fields = line.split_whitespace();
        let id: u32 = fields
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or(TrackerError::parse(PATH, no, "track id"))?;
        let len: usize = fields
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or(TrackerError::parse(PATH, no, "track length"))?;

        let mut elements = Vec::with_capacity(len);
        for _ in 0..len {
            let (no, line) = next(&data, &mut pos, "track element")?;
            elements.push(parse_element(line, no)?);
        }
        tracks.push(CornerTrack {
            id,
            color: PALETTE[id as usize % PALETTE.len()],
            elements,
        });
    }

    let mut false_alarms = Vec::with_capacity(num_falarms);
    for _ in 0..num_falarms {
        let (no, line) = next(&data, &mut pos, "false alarm")?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(TrackerError::parse(PATH, no, "rx ry frameNo cornerID"));
        }
        let bad = || TrackerError::parse(PATH, no, "rx ry frameNo cornerID");
        false_alarms.push(FalseAlarm {
            x: fields[0].parse().map_err(|_| bad())?,
            y: fields[1].parse().map_err(|_| bad())?,
            frame: fields[2].parse().map_err(|_| bad())?,
            corner_id: fields[3].parse().map_err(|_| bad())?,
        });
    }

    Ok((tracks, false_alarms))
}

fn parse_element(line: &str, no: usize) -> Result<TrackElement, TrackerError> {
    const PATH: &str = "<track file>";
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 10 {
        return Err(TrackerError::parse(PATH, no, "10 element fields"));
    }
    let bad = || TrackerError::parse(PATH, no, "a track element field");

    let code = match fields[0] {
        "M" => ElementCode::Measured,
        "S" => ElementCode::Skipped,
        _ => return Err(TrackerError::parse(PATH, no, "element code M or S")),
    };
    Ok(TrackElement {
        code,
        rx: fields[1].parse().map_err(|_| bad())?,
        ry: fields[2].parse().map_err(|_| bad())?,
        sx: fields[3].parse().map_err(|_| bad())?,
        sy: fields[4].parse().map_err(|_| bad())?,
        log_likelihood: fields[5].parse().map_err(|_| bad())?,
        time: fields[6].parse().map_err(|_| bad())?,
        frame: fields[7].parse().map_err(|_| bad())?,
        model_code: fields[8].parse().map_err(|_| bad())?,
        corner_id: fields[9].parse().map_err(|_| bad())?,
    })
}
