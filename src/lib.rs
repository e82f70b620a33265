//! Converts MusicXML scores into frame-quantized matrices, one
//! pianoroll/articulation/dynamics triple per instrument.

#[cfg(test)]
#[macro_use]
mod test_helpers;

pub mod cmdline;
pub mod dynamics;
pub mod error;
pub mod interpreter;
pub mod matrix;
pub mod musicxml;
pub mod resolver;
pub mod score;
pub mod time;

pub use error::{Anomaly, ConfigError, Diagnostic, PartError, PartFailure};
pub use interpreter::{interpret, Config, Interpretation, ScoreInterpreter};
pub use matrix::{MatrixSet, MatrixTriple, PitchAxis};
pub use score::{NoteEvent, PitchOrRest, ScoreEvent, Wedge};

use std::path::Path;

/// Reads a MusicXML file and interprets it in one go
pub fn score_to_pianoroll(path: &Path, config: Config) -> anyhow::Result<Interpretation> {
    let events = musicxml::read_file(path)?;
    Ok(interpret(events, config)?)
}
