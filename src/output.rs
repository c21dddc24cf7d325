//! Accumulation of verified track output
//!
//! The engine verifies one node at a time, possibly several scans after the
//! node was created. Verified START/CONTINUE/SKIP events append elements to
//! their track (created on first sight), verified FALARM events append to a
//! single false-alarm list, and END events close a track without emitting
//! an element.

/// Color indices assigned to tracks, cycled by track id.
pub const PALETTE: [u8; 25] = [
    1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 13, 14, 15, 67, 72, 75, 81, 85, 90, 97, 101, 153, 156,
    164,
];

/// Whether an element was backed by a measurement or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCode {
    /// A report was associated on this scan
    Measured,
    /// The track continued without a report
    Skipped,
}

impl ElementCode {
    pub fn as_char(self) -> char {
        match self {
            ElementCode::Measured => 'M',
            ElementCode::Skipped => 'S',
        }
    }
}

/// One verified step in the life of a track.
#[derive(Debug, Clone)]
pub struct TrackElement {
    pub code: ElementCode,
    /// Reported position; NaN for skipped scans
    pub rx: f64,
    pub ry: f64,
    /// Estimated position
    pub sx: f64,
    pub sy: f64,
    /// State log-likelihood at this step
    pub log_likelihood: f64,
    /// Engine scan time at which the step was verified
    pub time: i64,
    /// Source frame number; -9 for skipped scans
    pub frame: i32,
    /// Numeric code of the motion model that produced the estimate
    pub model_code: u32,
    /// Detection identifier; 0 for skipped scans
    pub corner_id: u64,
}

/// All verified elements of one track.
#[derive(Debug, Clone)]
pub struct CornerTrack {
    pub id: u32,
    pub color: u8,
    pub elements: Vec<TrackElement>,
}

/// A detection whose best interpretation was "spurious".
#[derive(Debug, Clone, PartialEq)]
pub struct FalseAlarm {
    pub x: f64,
    pub y: f64,
    pub frame: i32,
    pub corner_id: u64,
}

/// Verified output accumulated over the run.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: Vec<CornerTrack>,
    false_alarms: Vec<FalseAlarm>,
}

impl TrackStore {
    pub fn new() -> Self {
        TrackStore::default()
    }

    pub fn tracks(&self) -> &[CornerTrack] {
        &self.tracks
    }

    pub fn false_alarms(&self) -> &[FalseAlarm] {
        &self.false_alarms
    }

    /// Append an element to the track with the given id, creating the track
    /// on first sight.
    pub(crate) fn append_element(&mut self, track_id: u32, element: TrackElement) {
        let track = match self.tracks.iter_mut().find(|t| t.id == track_id) {
            Some(track) => track,
            None => {
                self.tracks.push(CornerTrack {
                    id: track_id,
                    color: PALETTE[track_id as usize % PALETTE.len()],
                    elements: Vec::new(),
                });
                self.tracks.last_mut().expect("track was just pushed")
            }
        };
        track.elements.push(element);
    }

    pub(crate) fn append_false_alarm(&mut self, falarm: FalseAlarm) {
        self.false_alarms.push(falarm);
    }

    /// A track ended; nothing is recorded beyond its existing elements.
    pub(crate) fn close_track(&mut self, _track_id: u32, _time: i64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(code: ElementCode) -> TrackElement {
        TrackElement {
            code,
            rx: 1.0,
            ry: 2.0,
            sx: 1.0,
            sy: 2.0,
            log_likelihood: -0.5,
            time: 3,
            frame: 2,
            model_code: 2,
            corner_id: 11,
        }
    }

    #[test]
    fn test_track_created_on_first_sight() {
        let mut store = TrackStore::new();
        store.append_element(5, element(ElementCode::Measured));
        store.append_element(5, element(ElementCode::Skipped));
        store.append_element(9, element(ElementCode::Measured));

        assert_eq!(store.tracks().len(), 2);
        assert_eq!(store.tracks()[0].id, 5);
        assert_eq!(store.tracks()[0].elements.len(), 2);
        assert_eq!(store.tracks()[1].id, 9);
    }

    #[test]
    fn test_palette_is_deterministic() {
        let mut store = TrackStore::new();
        store.append_element(0, element(ElementCode::Measured));
        store.append_element(25, element(ElementCode::Measured));
        // Ids 25 apart share a palette slot
        assert_eq!(store.tracks()[0].color, store.tracks()[1].color);
        assert_eq!(store.tracks()[0].color, PALETTE[0]);
    }

    #[test]
    fn test_false_alarms_accumulate() {
        let mut store = TrackStore::new();
        store.append_false_alarm(FalseAlarm {
            x: 1.0,
            y: 2.0,
            frame: 0,
            corner_id: 3,
        });
        assert_eq!(store.false_alarms().len(), 1);
    }
}
