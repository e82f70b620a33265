//! Musical time: MusicXML divisions on one side, quantized frames on the other.

/// Converts durations in divisions into frame counts for one part.
///
/// Each duration is rounded on its own (round-half-up); the rounding error of
/// one note is never carried into the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeModel {
    divisions_per_quarter: u32,
    quantization: u32,
    meter: Option<(u32, u32)>,
}

impl TimeModel {
    /// `quantization` is the number of frames per quarter note.
    pub fn new(divisions_per_quarter: u32, quantization: u32) -> Self {
        Self {
            divisions_per_quarter,
            quantization,
            meter: None,
        }
    }

    pub fn divisions_per_quarter(&self) -> u32 {
        self.divisions_per_quarter
    }

    pub fn quantization(&self) -> u32 {
        self.quantization
    }

    /// Same quantization and meter, new divisions
    pub fn with_divisions(self, divisions_per_quarter: u32) -> Self {
        Self {
            divisions_per_quarter,
            ..self
        }
    }

    pub fn with_meter(self, beats: u32, beat_type: u32) -> Self {
        Self {
            meter: Some((beats, beat_type)),
            ..self
        }
    }

    /// Rounded frame count of a duration. Non-positive durations give zero.
    pub fn quantize(&self, duration: i64) -> usize {
        if duration <= 0 || self.divisions_per_quarter == 0 {
            return 0;
        }
        let numerator = duration as u128 * self.quantization as u128;
        let denominator = self.divisions_per_quarter as u128;
        ((2 * numerator + denominator) / (2 * denominator)) as usize
    }

    /// Frame length of a sounding note, never less than one frame
    pub fn frames_for_duration(&self, duration: i64) -> usize {
        self.quantize(duration).max(1)
    }

    /// Length of one bar in divisions, once a time signature is known
    pub fn bar_divisions(&self) -> Option<i64> {
        let (beats, beat_type) = self.meter?;
        if beat_type == 0 {
            return None;
        }
        Some(self.divisions_per_quarter as i64 * beats as i64 * 4 / beat_type as i64)
    }
}

/// Frame length of `duration` divisions at `quantization` frames per quarter note
pub fn frames_for_duration(duration: i64, divisions_per_quarter: u32, quantization: u32) -> usize {
    TimeModel::new(divisions_per_quarter, quantization).frames_for_duration(duration)
}

/// Position of one part on the frame grid.
///
/// Positions are counted in divisions and each one is converted to a frame
/// from its absolute value, so rounding never accumulates from note to note.
/// Every measure starts where the furthest point reached by the previous one
/// ended, which makes the offset of measure N the running sum of the lengths
/// of measures 0..N. Offsets are never revised once a measure has started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeasureClock {
    time: Option<TimeModel>,
    /// Frame at which the current divisions took effect
    origin: usize,
    /// Divisions since `origin`
    start: i64,
    cursor: i64,
    end: i64,
    index: Option<u32>,
    offsets: Vec<(u32, usize)>,
}

impl MeasureClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> Option<TimeModel> {
        self.time
    }

    /// Installs a new time model. A change of divisions or quantization
    /// re-anchors the count at the start of the current measure.
    pub fn set_time(&mut self, time: TimeModel) {
        if let Some(old) = self.time {
            if old.divisions_per_quarter() != time.divisions_per_quarter()
                || old.quantization() != time.quantization()
            {
                let origin = self.frame_at(self.start);
                let old_divisions = old.divisions_per_quarter().max(1) as i64;
                let rescale = |position: i64| {
                    (position - self.start) * time.divisions_per_quarter() as i64 / old_divisions
                };
                let (cursor, end) = (rescale(self.cursor), rescale(self.end));
                self.origin = origin;
                self.start = 0;
                self.cursor = cursor;
                self.end = end;
            }
        }
        self.time = Some(time);
    }

    /// Frame of a position given in divisions since the last re-anchoring
    pub fn frame_at(&self, position: i64) -> usize {
        self.origin + self.time.map_or(0, |time| time.quantize(position))
    }

    /// Opens a new measure and returns its frame offset
    pub fn start_measure(&mut self, index: u32) -> usize {
        self.start = self.end;
        self.cursor = self.end;
        self.index = Some(index);
        let offset = self.frame_at(self.start);
        self.offsets.push((index, offset));
        offset
    }

    pub fn frame_offset_for_measure(&self, index: u32) -> Option<usize> {
        self.offsets
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, offset)| *offset)
    }

    pub fn measure_index(&self) -> Option<u32> {
        self.index
    }

    /// Cursor in divisions, for use with [`MeasureClock::frame_at`]
    pub fn position(&self) -> i64 {
        self.cursor
    }

    /// Current absolute frame
    pub fn cursor(&self) -> usize {
        self.frame_at(self.cursor)
    }

    /// Offset of the current measure
    pub fn offset(&self) -> usize {
        self.frame_at(self.start)
    }

    /// Furthest frame reached so far in the part
    pub fn end(&self) -> usize {
        self.frame_at(self.end)
    }

    pub fn advance(&mut self, duration: i64) {
        self.cursor += duration.max(0);
        self.end = self.end.max(self.cursor);
    }

    /// Moves the cursor back, stopping at the start of the current measure.
    /// Returns false when the move had to be clamped.
    pub fn rewind(&mut self, duration: i64) -> bool {
        let duration = duration.max(0);
        let available = self.cursor - self.start;
        self.cursor -= duration.min(available);
        duration <= available
    }
}
