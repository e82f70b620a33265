use crate::score::pitch_to_name;
use midly::num::u7;
use std::fmt::{self, Display};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("quantization must be at least one frame per quarter note")]
    ZeroQuantization,
}

/// Errors which abort the interpretation of a single part
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartError {
    #[error("{event} appears outside of any part")]
    EventOutsidePart { event: String },
    #[error("divisions must be positive, got {value}")]
    InvalidDivisions { value: i64 },
    #[error("{event} appears before the part declares its divisions")]
    MissingDivisions { event: String },
    #[error("part {next} started while part {open} was still open")]
    PartAlreadyOpen { open: String, next: String },
}

/// A part whose matrices were dropped from the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFailure {
    /// `None` when the offending event did not belong to any part
    pub part: Option<String>,
    pub error: PartError,
}

impl Display for PartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "part {part}: {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Recoverable irregularities found while interpreting a part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    UnmatchedTieStop { pitch: u7 },
    UnterminatedTie { pitch: u7 },
    UnknownDynamic { token: String },
    NonPositiveDuration { duration: i64 },
    OrphanChordNote { pitch: u7 },
    BackupBeforeMeasureStart { duration: i64 },
    UnmatchedWedgeStop,
    NoteOverlap { pitch: u7, frame: usize },
    UnclosedPart,
    MergedPart { id: String },
}

impl Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::UnmatchedTieStop { pitch } => write!(
                f,
                "tie stop on {} without an open tie, played as a new note",
                pitch_to_name(*pitch)
            ),
            Anomaly::UnterminatedTie { pitch } => write!(
                f,
                "tie on {} never stopped, closed at the end of the tied note",
                pitch_to_name(*pitch)
            ),
            Anomaly::UnknownDynamic { token } => write!(f, "unknown dynamic marking {token:?} ignored"),
            Anomaly::NonPositiveDuration { duration } => {
                write!(f, "duration {duration} clamped to one frame")
            }
            Anomaly::OrphanChordNote { pitch } => write!(
                f,
                "chord note {} has no preceding note in the measure",
                pitch_to_name(*pitch)
            ),
            Anomaly::BackupBeforeMeasureStart { duration } => {
                write!(f, "backup of {duration} divisions stopped at the measure start")
            }
            Anomaly::UnmatchedWedgeStop => write!(f, "wedge stop without a crescendo or diminuendo"),
            Anomaly::NoteOverlap { pitch, frame } => write!(
                f,
                "{} attacked at frame {frame} while already sounding",
                pitch_to_name(*pitch)
            ),
            Anomaly::UnclosedPart => write!(f, "part still open at the end of the score"),
            Anomaly::MergedPart { id } => write!(f, "merged part {id} into an earlier part of the same name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub part: String,
    pub measure: Option<u32>,
    pub anomaly: Anomaly,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.measure {
            Some(measure) => write!(f, "{} measure {}: {}", self.part, measure, self.anomaly),
            None => write!(f, "{}: {}", self.part, self.anomaly),
        }
    }
}
