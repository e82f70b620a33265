//! Turns note events into frame placements: chord onsets, tie chains and
//! articulation lengths are decided here.

use crate::{
    error::Anomaly,
    score::{NoteEvent, PitchOrRest},
    time::{MeasureClock, TimeModel},
};
use midly::num::u7;
use std::collections::BTreeMap;

/// Where and how long a note sounds on the frame grid
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotePlacement {
    pub pitch: u7,
    /// Absolute frame within the part
    pub onset: usize,
    /// Never less than one frame
    pub length: usize,
    /// Extends a tied note instead of attacking again
    pub continuation: bool,
    /// Staccato: the attack lasts a single frame
    pub short: bool,
    /// Grace notes only attack when staccato
    pub grace: bool,
}

impl NotePlacement {
    pub fn end(&self) -> usize {
        self.onset + self.length
    }

    /// Frames of the attack written into the articulation matrix.
    ///
    /// An ordinary note stops one frame early so that repeated notes stay
    /// distinguishable from held ones.
    pub fn articulation_length(&self) -> usize {
        if self.continuation {
            0
        } else if self.short {
            1
        } else if self.grace {
            0
        } else {
            self.length.saturating_sub(1).max(1)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChordState {
    Idle,
    InChord { onset: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Anchor {
    onset: usize,
    /// Cursor in divisions when the anchor was placed
    position: i64,
    staccato: bool,
}

/// Outcome of resolving one note event
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub placement: Option<NotePlacement>,
    pub anomalies: Vec<Anomaly>,
}

/// Note state of one part
#[derive(Debug)]
pub struct NoteResolver {
    chord: ChordState,
    anchor: Option<Anchor>,
    /// Open ties by pitch, with the frame at which the tied sound ends
    open_ties: BTreeMap<u8, usize>,
}

impl Default for NoteResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteResolver {
    pub fn new() -> Self {
        Self {
            chord: ChordState::Idle,
            anchor: None,
            open_ties: BTreeMap::new(),
        }
    }

    pub fn chord_state(&self) -> ChordState {
        self.chord
    }

    pub fn has_open_tie(&self, pitch: u7) -> bool {
        self.open_ties.contains_key(&pitch.as_int())
    }

    /// Chords never span a barline
    pub fn start_measure(&mut self) {
        self.reset_chord();
    }

    /// Resolves one note or rest, moving the clock past it unless it is a
    /// chord member or a grace note.
    pub fn resolve(
        &mut self,
        note: &NoteEvent,
        time: &TimeModel,
        clock: &mut MeasureClock,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        if note.grace {
            // Grace notes steal the frame just before the beat
            if let PitchOrRest::Pitch(pitch) = note.pitch {
                resolution.placement = Some(NotePlacement {
                    pitch,
                    onset: clock.cursor().saturating_sub(1),
                    length: 1,
                    continuation: false,
                    short: note.staccato,
                    grace: true,
                });
            }
            return resolution;
        }

        let duration = if note.duration > 0 {
            note.duration
        } else {
            resolution.anomalies.push(Anomaly::NonPositiveDuration {
                duration: note.duration,
            });
            0
        };

        match note.pitch {
            PitchOrRest::Rest => {
                // Whole-measure rests are often written longer than the bar
                let duration = match time.bar_divisions() {
                    Some(bar) if bar > 0 => duration.min(bar),
                    _ => duration,
                };
                self.reset_chord();
                clock.advance(duration);
            }
            PitchOrRest::Pitch(pitch) => {
                let mut length = time.frames_for_duration(duration);
                let anchor =
                    self.place_onset(note, pitch, duration, clock, &mut resolution.anomalies);
                let onset = anchor.onset;
                let continuation = self.follow_tie(note, pitch, onset, &mut resolution.anomalies);
                if note.tie_start {
                    // The tied sound runs up to the exact end of the note
                    let end = clock.frame_at(anchor.position + duration);
                    self.open_ties.insert(pitch.as_int(), end);
                    length = length.max(end - onset);
                }
                resolution.placement = Some(NotePlacement {
                    pitch,
                    onset,
                    length,
                    continuation,
                    short: anchor.staccato,
                    grace: false,
                });
            }
        }
        resolution
    }

    /// Moves the cursor back for another voice
    pub fn backup(&mut self, duration: i64, clock: &mut MeasureClock) -> Option<Anomaly> {
        self.reset_chord();
        if clock.rewind(duration) {
            None
        } else {
            Some(Anomaly::BackupBeforeMeasureStart { duration })
        }
    }

    pub fn forward(&mut self, duration: i64, clock: &mut MeasureClock) {
        self.reset_chord();
        clock.advance(duration);
    }

    /// Ends the part, returning the pitches of ties that were never closed
    pub fn close(&mut self) -> Vec<u7> {
        self.reset_chord();
        std::mem::take(&mut self.open_ties)
            .into_keys()
            .map(u7::from)
            .collect()
    }

    fn reset_chord(&mut self) {
        self.chord = ChordState::Idle;
        self.anchor = None;
    }

    /// Returns where the note starts; chord members take their anchor's
    /// onset and staccato.
    fn place_onset(
        &mut self,
        note: &NoteEvent,
        pitch: u7,
        duration: i64,
        clock: &mut MeasureClock,
        anomalies: &mut Vec<Anomaly>,
    ) -> Anchor {
        if note.chord {
            if let Some(anchor) = self.anchor {
                self.chord = ChordState::InChord {
                    onset: anchor.onset,
                };
                return Anchor {
                    staccato: note.staccato || anchor.staccato,
                    ..anchor
                };
            }
            anomalies.push(Anomaly::OrphanChordNote { pitch });
        }
        let anchor = Anchor {
            onset: clock.cursor(),
            position: clock.position(),
            staccato: note.staccato,
        };
        clock.advance(duration);
        self.chord = ChordState::Idle;
        self.anchor = Some(anchor);
        anchor
    }

    /// Decides whether a note continues an open tie of the same pitch
    fn follow_tie(
        &mut self,
        note: &NoteEvent,
        pitch: u7,
        onset: usize,
        anomalies: &mut Vec<Anomaly>,
    ) -> bool {
        let key = pitch.as_int();
        match self.open_ties.get(&key).copied() {
            Some(end) if end == onset => {
                self.open_ties.remove(&key);
                true
            }
            // Same pitch sounding in another voice before the tie ends
            Some(end) if onset < end => {
                if note.tie_stop {
                    anomalies.push(Anomaly::UnmatchedTieStop { pitch });
                }
                false
            }
            Some(_) => {
                self.open_ties.remove(&key);
                anomalies.push(Anomaly::UnterminatedTie { pitch });
                if note.tie_stop {
                    anomalies.push(Anomaly::UnmatchedTieStop { pitch });
                }
                false
            }
            None => {
                if note.tie_stop {
                    anomalies.push(Anomaly::UnmatchedTieStop { pitch });
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn setup_with(time: TimeModel) -> (NoteResolver, TimeModel, MeasureClock) {
        let mut clock = MeasureClock::new();
        clock.set_time(time);
        clock.start_measure(0);
        (NoteResolver::new(), time, clock)
    }

    fn setup() -> (NoteResolver, TimeModel, MeasureClock) {
        setup_with(TimeModel::new(1, 4))
    }

    fn place(
        resolver: &mut NoteResolver,
        time: &TimeModel,
        clock: &mut MeasureClock,
        note: NoteEvent,
    ) -> NotePlacement {
        let resolution = resolver.resolve(&note, time, clock);
        assert!(resolution.anomalies.is_empty(), "{:?}", resolution.anomalies);
        resolution.placement.unwrap()
    }

    #[rstest(
        length, short, continuation, grace, expect,
        case(4, false, false, false, 3),
        case(2, false, false, false, 1),
        case(1, false, false, false, 1),
        case(4, true, false, false, 1),
        case(4, false, true, false, 0),
        case(4, true, true, false, 0),
        case(1, false, false, true, 0),
        case(1, true, false, true, 1),
    )]
    fn test_articulation_length(
        length: usize,
        short: bool,
        continuation: bool,
        grace: bool,
        expect: usize,
    ) {
        let placement = NotePlacement {
            pitch: u7::from(60),
            onset: 0,
            length,
            continuation,
            short,
            grace,
        };
        assert_eq!(placement.articulation_length(), expect);
    }

    #[test]
    fn consecutive_notes_advance_the_cursor() {
        let (mut resolver, time, mut clock) = setup();
        let first = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1));
        let second = place(&mut resolver, &time, &mut clock, NoteEvent::note(62, 2));
        assert_eq!((first.onset, first.length), (0, 4));
        assert_eq!((second.onset, second.length), (4, 8));
        assert_eq!(clock.cursor(), 12);
    }

    #[test]
    fn chord_members_share_the_onset() {
        let (mut resolver, time, mut clock) = setup();
        place(&mut resolver, &time, &mut clock, NoteEvent::note(55, 1));
        let root = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1));
        assert_eq!(resolver.chord_state(), ChordState::Idle);
        let third = place(&mut resolver, &time, &mut clock, NoteEvent::note(64, 1).chord());
        let fifth = place(&mut resolver, &time, &mut clock, NoteEvent::note(67, 1).chord());
        assert_eq!(resolver.chord_state(), ChordState::InChord { onset: 4 });
        assert_eq!([root.onset, third.onset, fifth.onset], [4, 4, 4]);
        assert_eq!(clock.cursor(), 8);
        place(&mut resolver, &time, &mut clock, NoteEvent::note(62, 1));
        assert_eq!(resolver.chord_state(), ChordState::Idle);
    }

    #[test]
    fn chord_members_inherit_staccato() {
        let (mut resolver, time, mut clock) = setup();
        place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).staccato());
        let member = place(&mut resolver, &time, &mut clock, NoteEvent::note(64, 1).chord());
        assert!(member.short);
    }

    #[test]
    fn chord_without_anchor_is_a_plain_note() {
        let (mut resolver, time, mut clock) = setup();
        let resolution = resolver.resolve(&NoteEvent::note(60, 1).chord(), &time, &mut clock);
        assert_eq!(
            resolution.anomalies,
            [Anomaly::OrphanChordNote {
                pitch: u7::from(60)
            }]
        );
        assert_eq!(clock.cursor(), 4);
    }

    #[test]
    fn tie_chain_continues_without_new_attack() {
        let (mut resolver, time, mut clock) = setup();
        let first = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).tie_start());
        assert!(resolver.has_open_tie(u7::from(60)));
        let middle = place(
            &mut resolver,
            &time,
            &mut clock,
            NoteEvent::note(60, 1).tie_stop().tie_start(),
        );
        let last = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).tie_stop());
        assert!(!first.continuation);
        assert!(middle.continuation && last.continuation);
        assert_eq!(last.onset, 8);
        assert!(resolver.close().is_empty());
    }

    #[test]
    fn unmatched_tie_stop_is_a_new_note() {
        let (mut resolver, time, mut clock) = setup();
        let resolution = resolver.resolve(&NoteEvent::note(60, 1).tie_stop(), &time, &mut clock);
        assert_eq!(
            resolution.anomalies,
            [Anomaly::UnmatchedTieStop {
                pitch: u7::from(60)
            }]
        );
        assert!(!resolution.placement.unwrap().continuation);
    }

    #[test]
    fn tie_broken_by_gap_is_dropped() {
        let (mut resolver, time, mut clock) = setup();
        place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).tie_start());
        resolver.resolve(&NoteEvent::rest(1), &time, &mut clock);
        let resolution = resolver.resolve(&NoteEvent::note(60, 1), &time, &mut clock);
        assert_eq!(
            resolution.anomalies,
            [Anomaly::UnterminatedTie {
                pitch: u7::from(60)
            }]
        );
        assert!(!resolution.placement.unwrap().continuation);
    }

    #[test]
    fn unterminated_ties_surface_at_close() {
        let (mut resolver, time, mut clock) = setup();
        place(&mut resolver, &time, &mut clock, NoteEvent::note(67, 1).tie_start());
        assert_eq!(resolver.close(), [u7::from(67)]);
    }

    #[test]
    fn rests_advance_without_placement() {
        let (mut resolver, time, mut clock) = setup();
        let resolution = resolver.resolve(&NoteEvent::rest(2), &time, &mut clock);
        assert_eq!(resolution, Resolution::default());
        assert_eq!(clock.cursor(), 8);
    }

    #[test]
    fn long_rest_is_clamped_to_bar() {
        let (mut resolver, time, mut clock) = setup_with(TimeModel::new(1, 4).with_meter(3, 4));
        resolver.resolve(&NoteEvent::rest(4), &time, &mut clock);
        assert_eq!(clock.cursor(), 12);
    }

    #[test]
    fn grace_note_precedes_the_beat() {
        let (mut resolver, time, mut clock) = setup();
        place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1));
        let grace = place(&mut resolver, &time, &mut clock, NoteEvent::grace(62));
        assert_eq!((grace.onset, grace.length), (3, 1));
        assert_eq!(grace.articulation_length(), 0);
        assert_eq!(clock.cursor(), 4);
    }

    #[test]
    fn grace_note_at_part_start_takes_frame_zero() {
        let (mut resolver, time, mut clock) = setup();
        let grace = place(&mut resolver, &time, &mut clock, NoteEvent::grace(62));
        assert_eq!((grace.onset, grace.length), (0, 1));
        let main = place(&mut resolver, &time, &mut clock, NoteEvent::note(64, 1));
        assert_eq!(main.onset, 0);
    }

    #[test]
    fn triplet_onsets_follow_exact_positions() {
        let (mut resolver, time, mut clock) = setup_with(TimeModel::new(3, 4));
        let onsets: Vec<usize> = [60, 62, 64, 65]
            .iter()
            .map(|pitch| place(&mut resolver, &time, &mut clock, NoteEvent::note(*pitch, 1)).onset)
            .collect();
        assert_eq!(onsets, [0, 1, 3, 4]);
    }

    #[test]
    fn tied_triplets_sound_without_gaps() {
        let (mut resolver, time, mut clock) = setup_with(TimeModel::new(3, 4));
        let first = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).tie_start());
        let second = place(
            &mut resolver,
            &time,
            &mut clock,
            NoteEvent::note(60, 1).tie_stop().tie_start(),
        );
        let last = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).tie_stop());
        assert_eq!((first.onset, first.length), (0, 1));
        assert_eq!((second.onset, second.length), (1, 2));
        assert!(second.continuation && last.continuation);
        assert_eq!(last.onset, 3);
    }

    #[test]
    fn tie_from_zero_frame_note_continues() {
        // One division at 8 per quarter is an eighth of a frame, which rounds to 0
        let (mut resolver, time, mut clock) = setup_with(TimeModel::new(8, 1));
        let first = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1).tie_start());
        assert_eq!((first.onset, first.length), (0, 1));
        let next = place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 8).tie_stop());
        assert!(next.continuation);
        assert_eq!(next.onset, 0);
        assert!(resolver.close().is_empty());
    }

    #[test]
    fn zero_duration_note_gets_one_frame() {
        let (mut resolver, time, mut clock) = setup();
        let resolution = resolver.resolve(&NoteEvent::note(60, 0), &time, &mut clock);
        assert_eq!(
            resolution.anomalies,
            [Anomaly::NonPositiveDuration { duration: 0 }]
        );
        assert_eq!(resolution.placement.unwrap().length, 1);
        assert_eq!(clock.cursor(), 0);
    }

    #[test]
    fn backup_is_clamped_at_measure_start() {
        let (mut resolver, time, mut clock) = setup();
        place(&mut resolver, &time, &mut clock, NoteEvent::note(60, 1));
        assert_eq!(resolver.backup(1, &mut clock), None);
        assert_eq!(clock.cursor(), 0);
        assert_eq!(
            resolver.backup(1, &mut clock),
            Some(Anomaly::BackupBeforeMeasureStart { duration: 1 })
        );
        resolver.forward(2, &mut clock);
        assert_eq!(clock.cursor(), 8);
    }
}
