//! Tracker parameters and the parameter-file reader
//!
//! The parameter file is line-oriented: one value per line, in fixed order.
//! Lines starting with `;` are comments; blank lines are skipped too (the
//! original reader mis-parsed them as zeros).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::TrackerError;

/// Every parameter consumed by the tracker, in parameter-file order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerParams {
    pub position_variance_x: f64,
    pub position_variance_y: f64,
    pub gradient_variance: f64,
    pub intensity_variance: f64,
    pub process_variance: f64,
    pub prob_detect: f64,
    pub prob_end: f64,
    pub mean_new: f64,
    pub mean_falarms: f64,
    pub max_g_hypos: usize,
    pub max_depth: usize,
    pub min_g_hypo_ratio: f64,
    pub intensity_threshold: f64,
    pub max_distance_1: f64,
    pub max_distance_2: f64,
    pub max_distance_3: f64,
    pub state_variance: f64,
    pub end_scan: i64,
    /// Placeholder for model-switching likelihoods; parsed but unused by
    /// the constant-velocity model
    pub pos2vel_likelihood: i64,
    pub vel2curv_likelihood: i64,
    /// Placeholders for future start heuristics
    pub start_a: i64,
    pub start_b: i64,
    pub start_c: i64,
}

/// Read a parameter file.
pub fn read_params(path: impl AsRef<Path>) -> Result<TrackerParams, TrackerError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let file = File::open(path).map_err(|e| TrackerError::io(path_str.as_str(), e))?;

    let mut values = ValueReader::new(BufReader::new(file), path_str);

    let params = TrackerParams {
        position_variance_x: values.required_f64("positionVarianceX")?,
        position_variance_y: values.required_f64("positionVarianceY")?,
        gradient_variance: values.required_f64("gradientVariance")?,
        intensity_variance: values.required_f64("intensityVariance")?,
        process_variance: values.required_f64("processVariance")?,
        prob_detect: values.required_f64("probDetect")?,
        prob_end: values.required_f64("probEnd")?,
        mean_new: values.required_f64("meanNew")?,
        mean_falarms: values.required_f64("meanFalarms")?,
        max_g_hypos: values.required_f64("maxGHypos")? as usize,
        max_depth: values.required_f64("maxDepth")? as usize,
        min_g_hypo_ratio: values.required_f64("minGHypoRatio")?,
        intensity_threshold: values.required_f64("intensityThreshold")?,
        max_distance_1: values.required_f64("maxDistance1")?,
        max_distance_2: values.required_f64("maxDistance2")?,
        max_distance_3: values.required_f64("maxDistance3")?,
        state_variance: values.required_f64("stateVariance")?,
        end_scan: values.required_f64("endScan")? as i64,
        pos2vel_likelihood: values.optional_i64()?,
        vel2curv_likelihood: values.optional_i64()?,
        start_a: values.optional_i64()?,
        start_b: values.optional_i64()?,
        start_c: values.optional_i64()?,
    };

    Ok(params)
}

struct ValueReader<R> {
    lines: std::io::Lines<R>,
    path: String,
    line_no: usize,
}

impl<R: BufRead> ValueReader<R> {
    fn new(reader: R, path: String) -> Self {
        ValueReader {
            lines: reader.lines(),
            path,
            line_no: 0,
        }
    }

    /// Next non-comment, non-blank line, if any.
    fn next_value(&mut self) -> Result<Option<String>, TrackerError> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|e| TrackerError::io(self.path.as_str(), e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
        Ok(None)
    }

    fn required_f64(&mut self, name: &'static str) -> Result<f64, TrackerError> {
        let Some(value) = self.next_value()? else {
            return Err(TrackerError::config(format!(
                "{}: missing parameter {}",
                self.path, name
            )));
        };
        value.parse().map_err(|_| {
            TrackerError::config(format!(
                "{}: line {}: bad value for {}: {:?}",
                self.path, self.line_no, name, value
            ))
        })
    }

    /// Trailing placeholder values default to zero when absent.
    fn optional_i64(&mut self) -> Result<i64, TrackerError> {
        match self.next_value()? {
            None => Ok(0),
            Some(value) => Ok(value.parse().unwrap_or(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_params(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("Parameters");
        let mut file = File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn sample_body() -> String {
        let values = [
            "; position variance x",
            "1.0",
            "; position variance y",
            "1.5",
            "0.1", // gradientVariance
            "100.0", // intensityVariance
            "",
            "0.01", // processVariance
            "0.9",  // probDetect
            "15.0", // probEnd
            "0.2",  // meanNew
            "0.05", // meanFalarms
            "64",   // maxGHypos
            "3",    // maxDepth
            "0.001", // minGHypoRatio
            "0.5",  // intensityThreshold
            "5.9",  // maxDistance1
            "5.99", // maxDistance2
            "6.0",  // maxDistance3
            "20.0", // stateVariance
            "100",  // endScan
        ];
        values.join("\n")
    }

    #[test]
    fn test_read_params_skips_comments_and_blanks() {
        let dir = std::env::temp_dir().join("corner_mht_params_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_params(&dir, &sample_body());

        let params = read_params(&path).unwrap();
        assert_eq!(params.position_variance_x, 1.0);
        assert_eq!(params.position_variance_y, 1.5);
        assert_eq!(params.process_variance, 0.01);
        assert_eq!(params.max_g_hypos, 64);
        assert_eq!(params.max_depth, 3);
        assert_eq!(params.max_distance_2, 5.99);
        assert_eq!(params.end_scan, 100);
        // Absent trailing placeholders default to zero
        assert_eq!(params.pos2vel_likelihood, 0);
        assert_eq!(params.start_c, 0);
    }

    #[test]
    fn test_read_params_accepts_trailing_placeholders() {
        let dir = std::env::temp_dir().join("corner_mht_params_test2");
        std::fs::create_dir_all(&dir).unwrap();
        let body = format!("{}\n1\n2\n3\n4\n5\n", sample_body());
        let path = write_params(&dir, &body);

        let params = read_params(&path).unwrap();
        assert_eq!(params.pos2vel_likelihood, 1);
        assert_eq!(params.vel2curv_likelihood, 2);
        assert_eq!(params.start_a, 3);
        assert_eq!(params.start_b, 4);
        assert_eq!(params.start_c, 5);
    }

    #[test]
    fn test_read_params_reports_missing_value() {
        let dir = std::env::temp_dir().join("corner_mht_params_test3");
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_params(&dir, "1.0\n2.0\n");

        let err = read_params(&path).unwrap_err();
        assert!(err.to_string().contains("gradientVariance"));
    }

    #[test]
    fn test_read_params_reports_bad_value() {
        let dir = std::env::temp_dir().join("corner_mht_params_test4");
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_params(&dir, "1.0\nnot-a-number\n");

        let err = read_params(&path).unwrap_err();
        assert!(err.to_string().contains("positionVarianceY"));
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        assert!(read_params("/nonexistent/Parameters").is_err());
    }
}
