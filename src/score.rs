use midly::num::u7;
use std::fmt::{self, Display};

/// Either a sounding pitch (MIDI numbering, C4 = 60) or a rest
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitchOrRest {
    Pitch(u7),
    Rest,
}

/// One `<note>` element of a MusicXML part, reduced to what the interpreter needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: PitchOrRest,
    /// Duration in divisions of the enclosing part
    pub duration: i64,
    /// Shares its onset with the preceding note
    pub chord: bool,
    pub tie_start: bool,
    pub tie_stop: bool,
    pub staccato: bool,
    /// Grace notes carry no duration and are squeezed in just before the beat
    pub grace: bool,
}

impl NoteEvent {
    pub fn note(pitch: u8, duration: i64) -> Self {
        Self {
            pitch: PitchOrRest::Pitch(u7::from(pitch)),
            duration,
            chord: false,
            tie_start: false,
            tie_stop: false,
            staccato: false,
            grace: false,
        }
    }

    pub fn rest(duration: i64) -> Self {
        Self {
            pitch: PitchOrRest::Rest,
            ..Self::note(0, duration)
        }
    }

    pub fn grace(pitch: u8) -> Self {
        Self {
            grace: true,
            ..Self::note(pitch, 0)
        }
    }

    pub fn chord(self) -> Self {
        Self {
            chord: true,
            ..self
        }
    }

    pub fn tie_start(self) -> Self {
        Self {
            tie_start: true,
            ..self
        }
    }

    pub fn tie_stop(self) -> Self {
        Self {
            tie_stop: true,
            ..self
        }
    }

    pub fn staccato(self) -> Self {
        Self {
            staccato: true,
            ..self
        }
    }
}

/// Hairpin markings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wedge {
    Crescendo,
    Diminuendo,
    Stop,
}

/// A structured event pulled from a MusicXML document, in document order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScoreEvent {
    PartStart { id: String, name: Option<String> },
    Divisions(i64),
    TimeSignature { beats: u32, beat_type: u32 },
    MeasureStart { index: u32 },
    Note(NoteEvent),
    Backup(i64),
    Forward(i64),
    Dynamics(String),
    Wedge(Wedge),
    PartEnd,
}

impl Display for ScoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreEvent::PartStart { id, name: Some(name) } => write!(f, "part-start {id} ({name})"),
            ScoreEvent::PartStart { id, name: None } => write!(f, "part-start {id}"),
            ScoreEvent::Divisions(value) => write!(f, "divisions {value}"),
            ScoreEvent::TimeSignature { beats, beat_type } => {
                write!(f, "time-signature {beats}/{beat_type}")
            }
            ScoreEvent::MeasureStart { index } => write!(f, "measure-start {index}"),
            ScoreEvent::Note(note) => {
                match note.pitch {
                    PitchOrRest::Pitch(pitch) => write!(f, "note {}", pitch_to_name(pitch))?,
                    PitchOrRest::Rest => write!(f, "rest")?,
                }
                write!(f, " {}", note.duration)?;
                for (flag, label) in [
                    (note.chord, "chord"),
                    (note.tie_start, "tie-start"),
                    (note.tie_stop, "tie-stop"),
                    (note.staccato, "staccato"),
                    (note.grace, "grace"),
                ] {
                    if flag {
                        write!(f, " {label}")?;
                    }
                }
                Ok(())
            }
            ScoreEvent::Backup(duration) => write!(f, "backup {duration}"),
            ScoreEvent::Forward(duration) => write!(f, "forward {duration}"),
            ScoreEvent::Dynamics(token) => write!(f, "dynamics {token}"),
            ScoreEvent::Wedge(Wedge::Crescendo) => write!(f, "wedge crescendo"),
            ScoreEvent::Wedge(Wedge::Diminuendo) => write!(f, "wedge diminuendo"),
            ScoreEvent::Wedge(Wedge::Stop) => write!(f, "wedge stop"),
            ScoreEvent::PartEnd => write!(f, "part-end"),
        }
    }
}

const STEP_SEMITONES: [(char, i32); 7] = [
    ('C', 0),
    ('D', 2),
    ('E', 4),
    ('F', 5),
    ('G', 7),
    ('A', 9),
    ('B', 11),
];

/// Spells a MusicXML `<pitch>` (step, alter, octave) as a MIDI note number.
/// Returns `None` for an unknown step or a result outside 0..=127.
pub fn pitch_from_step(step: char, alter: i32, octave: i32) -> Option<u7> {
    let semitone = STEP_SEMITONES
        .iter()
        .find(|(name, _)| *name == step.to_ascii_uppercase())
        .map(|(_, semitone)| *semitone)?;
    let midi = (octave + 1) * 12 + semitone + alter;
    if (0..=127).contains(&midi) {
        Some(u7::from(midi as u8))
    } else {
        None
    }
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

pub fn pitch_to_name(pitch: u7) -> String {
    let pitch_u8 = pitch.as_int();
    let pitch_class = (pitch_u8 % 12) as usize;
    let octave = (pitch_u8 / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[pitch_class], octave)
}
