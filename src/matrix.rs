//! Frame-indexed pianoroll, articulation and dynamics storage.
//!
//! Each part fills its own [`PartRolls`] while it is being interpreted. Completed
//! parts are handed to the [`MatrixBuilder`], which pads everything to a common
//! length and fixes the pitch axis once all parts are known.

use crate::{dynamics::BASELINE_LEVEL, resolver::NotePlacement};
use index_vec::{define_index_type, IndexVec};
use midly::num::u7;
use serde::Serialize;
use std::{collections::BTreeMap, ops::Range};

define_index_type! { pub struct FrameIdx = usize; }

/// Size of the full MIDI pitch range
pub const PITCH_COUNT: usize = 128;
pub type PitchRow = [u8; PITCH_COUNT];
type Roll = IndexVec<FrameIdx, PitchRow>;

/// How wide the pitch axis of the finished matrices is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitchAxis {
    /// All 128 MIDI pitches
    Full,
    /// From the lowest to the highest pitch sounding in any part
    Observed,
}

/// The growing matrix triple of a single part
#[derive(Clone, Debug, Default)]
pub struct PartRolls {
    pianoroll: Roll,
    articulation: Roll,
    dynamics: IndexVec<FrameIdx, f32>,
    /// Level for frames added after the part has ended
    hold: Option<f32>,
}

impl PartRolls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames on the time axis
    pub fn len(&self) -> usize {
        self.pianoroll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pianoroll.is_empty()
    }

    /// Grows the time axis to at least `frames` frames. New dynamics frames
    /// take the held level, or else the last known one.
    pub fn ensure_capacity(&mut self, frames: usize) {
        if frames <= self.len() {
            return;
        }
        let hold = self
            .hold
            .or_else(|| self.last_level())
            .unwrap_or(BASELINE_LEVEL);
        self.pianoroll.resize(frames, [0; PITCH_COUNT]);
        self.articulation.resize(frames, [0; PITCH_COUNT]);
        self.dynamics.resize(frames, hold);
    }

    /// Marks `pitch` as sounding over `frames`. Returns the first frame in the
    /// range where the pitch was already sounding, if any.
    pub fn set_pianoroll(&mut self, pitch: u7, frames: Range<usize>) -> Option<usize> {
        self.ensure_capacity(frames.end);
        let column = pitch.as_int() as usize;
        let mut overlap = None;
        for frame in frames {
            let cell = &mut self.pianoroll[FrameIdx::from_usize(frame)][column];
            if *cell == 1 && overlap.is_none() {
                overlap = Some(frame);
            }
            *cell = 1;
        }
        overlap
    }

    pub fn set_articulation(&mut self, pitch: u7, frames: Range<usize>) {
        self.ensure_capacity(frames.end);
        let column = pitch.as_int() as usize;
        for frame in frames {
            self.articulation[FrameIdx::from_usize(frame)][column] = 1;
        }
    }

    /// Dynamics are last-writer-wins
    pub fn set_dynamics(&mut self, frames: Range<usize>, level: f32) {
        self.ensure_capacity(frames.end);
        for frame in frames {
            self.dynamics[FrameIdx::from_usize(frame)] = level;
        }
    }

    /// Writes a resolved note into the pianoroll and articulation matrices.
    /// Returns the frame of an overlapping re-attack, if there was one.
    pub fn apply(&mut self, placement: &NotePlacement) -> Option<usize> {
        let onset = placement.onset;
        let overlap = self.set_pianoroll(placement.pitch, onset..onset + placement.length);
        let attack = placement.articulation_length();
        if attack > 0 {
            self.set_articulation(placement.pitch, onset..onset + attack);
        }
        if placement.continuation {
            None
        } else {
            overlap
        }
    }

    pub fn is_sounding(&self, pitch: u7, frame: usize) -> bool {
        self.pianoroll
            .get(FrameIdx::from_usize(frame))
            .map_or(false, |row| row[pitch.as_int() as usize] == 1)
    }

    pub fn is_attacked(&self, pitch: u7, frame: usize) -> bool {
        self.articulation
            .get(FrameIdx::from_usize(frame))
            .map_or(false, |row| row[pitch.as_int() as usize] == 1)
    }

    pub fn level_at(&self, frame: usize) -> Option<f32> {
        self.dynamics.get(FrameIdx::from_usize(frame)).copied()
    }

    pub fn last_level(&self) -> Option<f32> {
        self.dynamics.last().copied()
    }

    /// Sets the level that pads the part once it is finished
    pub fn hold_level(&mut self, level: f32) {
        self.hold = Some(level);
    }

    /// Folds another part of the same instrument into this one: notes are
    /// combined, the louder dynamic wins on every frame.
    pub fn merge(&mut self, other: PartRolls) {
        self.ensure_capacity(other.len());
        for (frame, (sounding, attacks)) in other
            .pianoroll
            .iter()
            .zip(other.articulation.iter())
            .enumerate()
        {
            let idx = FrameIdx::from_usize(frame);
            for pitch in 0..PITCH_COUNT {
                self.pianoroll[idx][pitch] |= sounding[pitch];
                self.articulation[idx][pitch] |= attacks[pitch];
            }
        }
        for (frame, level) in other.dynamics.iter().enumerate() {
            let idx = FrameIdx::from_usize(frame);
            self.dynamics[idx] = self.dynamics[idx].max(*level);
        }
        self.hold = match (self.hold, other.hold) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    fn sounding_pitch_range(&self) -> Option<(usize, usize)> {
        let mut range: Option<(usize, usize)> = None;
        for row in self.pianoroll.iter() {
            for (pitch, _) in row.iter().enumerate().filter(|(_, cell)| **cell == 1) {
                range = Some(match range {
                    Some((low, high)) => (low.min(pitch), high.max(pitch)),
                    None => (pitch, pitch),
                });
            }
        }
        range
    }

    fn into_triple(self, pitches: Range<usize>) -> MatrixTriple {
        let slice_rows = |roll: Roll| {
            roll.into_iter()
                .map(|row| row[pitches.clone()].to_vec())
                .collect::<Vec<_>>()
        };
        MatrixTriple {
            lowest_pitch: pitches.start as u8,
            pitch_count: pitches.len(),
            pianoroll: slice_rows(self.pianoroll),
            articulation: slice_rows(self.articulation),
            dynamics: self.dynamics.into_iter().collect(),
        }
    }
}

/// Collects completed parts and produces the final, equally long matrices
#[derive(Debug, Default)]
pub struct MatrixBuilder {
    parts: BTreeMap<String, PartRolls>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(&self, name: &str) -> Option<&PartRolls> {
        self.parts.get(name)
    }

    /// Stores a finished part. Returns true when a part of the same name
    /// already existed and the two were merged.
    pub fn commit(&mut self, name: String, rolls: PartRolls) -> bool {
        match self.parts.get_mut(&name) {
            Some(existing) => {
                existing.merge(rolls);
                true
            }
            None => {
                self.parts.insert(name, rolls);
                false
            }
        }
    }

    /// Pads every part to the longest one and cuts the pitch axis.
    /// Pianoroll and articulation are padded with zeros, dynamics hold each
    /// part's own last level.
    pub fn finalize(self, pitch_axis: PitchAxis) -> MatrixSet {
        let max_frames = self.parts.values().map(PartRolls::len).max().unwrap_or(0);
        let pitches = match pitch_axis {
            PitchAxis::Full => 0..PITCH_COUNT,
            PitchAxis::Observed => self
                .parts
                .values()
                .filter_map(PartRolls::sounding_pitch_range)
                .reduce(|(low_a, high_a), (low_b, high_b)| (low_a.min(low_b), high_a.max(high_b)))
                .map_or(0..0, |(low, high)| low..high + 1),
        };
        self.parts
            .into_iter()
            .map(|(name, mut rolls)| {
                rolls.ensure_capacity(max_frames);
                (name, rolls.into_triple(pitches.clone()))
            })
            .collect()
    }
}

/// Finished matrices of one instrument, all `frames` long
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatrixTriple {
    /// MIDI pitch of column 0
    pub lowest_pitch: u8,
    pub pitch_count: usize,
    /// `pianoroll[frame][pitch]`, 1 while the pitch sounds
    pub pianoroll: Vec<Vec<u8>>,
    /// `articulation[frame][pitch]`, 1 during note attacks
    pub articulation: Vec<Vec<u8>>,
    /// Loudness level per frame, 0.0..=1.0
    pub dynamics: Vec<f32>,
}

/// Matrices per instrument name, in name order
pub type MatrixSet = BTreeMap<String, MatrixTriple>;

impl MatrixTriple {
    pub fn frames(&self) -> usize {
        self.dynamics.len()
    }

    /// (frames, pitches)
    pub fn shape(&self) -> (usize, usize) {
        (self.frames(), self.pitch_count)
    }

    /// Column of `pitch`, if the pitch axis covers it
    pub fn pitch_index(&self, pitch: u7) -> Option<usize> {
        let pitch = pitch.as_int() as usize;
        let low = self.lowest_pitch as usize;
        (pitch >= low && pitch < low + self.pitch_count).then(|| pitch - low)
    }

    pub fn pianoroll_column(&self, pitch: u7) -> Vec<u8> {
        column(&self.pianoroll, self.pitch_index(pitch), self.frames())
    }

    pub fn articulation_column(&self, pitch: u7) -> Vec<u8> {
        column(&self.articulation, self.pitch_index(pitch), self.frames())
    }

    /// Lowest and highest sounding pitch
    pub fn pitch_range(&self) -> Option<(u7, u7)> {
        let sounding = |column: &usize| self.pianoroll.iter().any(|row| row[*column] == 1);
        let low = (0..self.pitch_count).find(sounding)?;
        let high = (0..self.pitch_count).rev().find(sounding)?;
        Some((
            u7::from(self.lowest_pitch + low as u8),
            u7::from(self.lowest_pitch + high as u8),
        ))
    }

    /// Number of note attacks, counting each run in the articulation matrix once
    pub fn attack_count(&self) -> usize {
        (0..self.pitch_count)
            .map(|column| {
                let mut previous = 0;
                let mut runs = 0;
                for row in &self.articulation {
                    if row[column] == 1 && previous == 0 {
                        runs += 1;
                    }
                    previous = row[column];
                }
                runs
            })
            .sum()
    }

    /// Pianoroll weighted by the dynamics curve on a MIDI velocity scale.
    /// Sounding cells never drop below velocity 1.
    pub fn velocity_roll(&self) -> Vec<Vec<u8>> {
        self.pianoroll
            .iter()
            .zip(self.dynamics.iter())
            .map(|(row, level)| {
                let velocity = ((level * 127.0).round() as u8).clamp(1, 127);
                row.iter().map(|cell| cell * velocity).collect()
            })
            .collect()
    }
}

fn column(matrix: &[Vec<u8>], index: Option<usize>, frames: usize) -> Vec<u8> {
    match index {
        Some(index) => matrix.iter().map(|row| row[index]).collect(),
        None => vec![0; frames],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn placement(pitch: u8, onset: usize, length: usize) -> NotePlacement {
        NotePlacement {
            pitch: u7::from(pitch),
            onset,
            length,
            continuation: false,
            short: false,
            grace: false,
        }
    }

    #[test]
    fn time_axis_only_grows() {
        let mut rolls = PartRolls::new();
        rolls.ensure_capacity(8);
        rolls.ensure_capacity(4);
        assert_eq!(rolls.len(), 8);
        assert_approx_eq!(rolls.level_at(7).unwrap(), BASELINE_LEVEL);
    }

    #[test]
    fn quarter_note_leaves_last_frame_unattacked() {
        let mut rolls = PartRolls::new();
        assert_eq!(rolls.apply(&placement(60, 4, 4)), None);
        let pitch = u7::from(60);
        assert!((4..8).all(|f| rolls.is_sounding(pitch, f)));
        assert!((4..7).all(|f| rolls.is_attacked(pitch, f)));
        assert!(!rolls.is_attacked(pitch, 7));
        assert!(!rolls.is_sounding(pitch, 3));
    }

    #[test]
    fn overlapping_attack_is_reported_and_kept() {
        let mut rolls = PartRolls::new();
        rolls.apply(&placement(62, 0, 4));
        assert_eq!(rolls.apply(&placement(62, 2, 4)), Some(2));
        assert!((0..6).all(|f| rolls.is_sounding(u7::from(62), f)));
    }

    #[test]
    fn continuation_does_not_attack() {
        let mut rolls = PartRolls::new();
        rolls.apply(&NotePlacement {
            continuation: true,
            ..placement(64, 0, 4)
        });
        assert!(rolls.is_sounding(u7::from(64), 0));
        assert!(!rolls.is_attacked(u7::from(64), 0));
    }

    #[test]
    fn finalize_pads_to_longest_part_holding_dynamics() {
        let mut short = PartRolls::new();
        short.apply(&placement(60, 0, 8));
        short.set_dynamics(0..8, 0.25);
        let mut long = PartRolls::new();
        long.apply(&placement(67, 0, 12));
        long.set_dynamics(0..12, 0.75);

        let mut builder = MatrixBuilder::new();
        assert!(!builder.commit("A".to_string(), short));
        assert!(!builder.commit("B".to_string(), long));
        let set = builder.finalize(PitchAxis::Full);

        let a = &set["A"];
        assert_eq!(a.shape(), (12, PITCH_COUNT));
        assert_eq!(a.pianoroll_column(u7::from(60))[7..], [1, 0, 0, 0, 0]);
        assert!(a.dynamics[8..].iter().all(|level| *level == 0.25));
        assert_eq!(set["B"].shape(), (12, PITCH_COUNT));
    }

    #[test]
    fn observed_axis_spans_all_parts() {
        let mut low = PartRolls::new();
        low.apply(&placement(48, 0, 2));
        let mut high = PartRolls::new();
        high.apply(&placement(72, 0, 2));
        let mut builder = MatrixBuilder::new();
        builder.commit("low".to_string(), low);
        builder.commit("high".to_string(), high);
        let set = builder.finalize(PitchAxis::Observed);

        let high = &set["high"];
        assert_eq!(high.lowest_pitch, 48);
        assert_eq!(high.shape(), (2, 25));
        assert_eq!(high.pitch_index(u7::from(72)), Some(24));
        assert_eq!(high.pitch_index(u7::from(73)), None);
        assert_eq!(high.pitch_range(), Some((u7::from(72), u7::from(72))));
    }

    #[test]
    fn held_level_pads_finished_part() {
        let mut rolls = PartRolls::new();
        rolls.set_dynamics(0..4, 0.375);
        rolls.hold_level(0.875);
        rolls.ensure_capacity(6);
        assert_approx_eq!(rolls.level_at(3).unwrap(), 0.375);
        assert_approx_eq!(rolls.level_at(5).unwrap(), 0.875);
    }

    #[test]
    fn grace_placement_has_no_attack() {
        let mut rolls = PartRolls::new();
        rolls.apply(&NotePlacement {
            grace: true,
            ..placement(62, 0, 1)
        });
        assert!(rolls.is_sounding(u7::from(62), 0));
        assert!(!rolls.is_attacked(u7::from(62), 0));
    }

    #[test]
    fn same_name_parts_merge() {
        let mut first = PartRolls::new();
        first.apply(&placement(60, 0, 4));
        first.set_dynamics(0..4, 0.5);
        let mut second = PartRolls::new();
        second.apply(&placement(64, 2, 4));
        second.set_dynamics(0..6, 0.75);

        let mut builder = MatrixBuilder::new();
        builder.commit("Violin".to_string(), first);
        assert!(builder.commit("Violin".to_string(), second));
        let merged = builder.part("Violin").unwrap();
        assert_eq!(merged.len(), 6);
        assert!(merged.is_sounding(u7::from(60), 0));
        assert!(merged.is_sounding(u7::from(64), 5));
        assert_approx_eq!(merged.level_at(1).unwrap(), 0.75);
    }

    #[test]
    fn velocity_roll_scales_by_dynamics() {
        let mut rolls = PartRolls::new();
        rolls.apply(&placement(60, 0, 2));
        rolls.set_dynamics(0..1, 0.5);
        rolls.set_dynamics(1..2, 1.0);
        let mut builder = MatrixBuilder::new();
        builder.commit("P".to_string(), rolls);
        let triple = &builder.finalize(PitchAxis::Full)["P"];
        let velocity = triple.velocity_roll();
        assert_eq!(velocity[0][60], 64);
        assert_eq!(velocity[1][60], 127);
        assert_eq!(velocity[1][61], 0);
        assert_eq!(triple.attack_count(), 1);
    }
}
