use crate::{interpreter::Config, matrix::PitchAxis};
use std::{num::ParseIntError, path::PathBuf};

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "Converts a MusicXML score into pianoroll, articulation and dynamics matrices")]
pub struct Cli {
    #[structopt(short = "i", long = "input", parse(from_os_str))]
    pub input: PathBuf,
    /// Frames per quarter note
    #[structopt(
        short = "q",
        long = "quantization",
        parse(try_from_str = parse_quantization),
        default_value = "4"
    )]
    pub quantization: u32,
    /// JSON output file, stdout if omitted
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    pub output: Option<PathBuf>,
    #[structopt(long = "discard-grace")]
    pub discard_grace: bool,
    /// Trim the pitch axis to the pitches used in the score
    #[structopt(long = "observed-pitches")]
    pub observed_pitches: bool,
    /// Also write pianorolls weighted by dynamics as MIDI velocities
    #[structopt(long = "velocity")]
    pub velocity: bool,
    /// Don't report recoverable anomalies
    #[structopt(long = "quiet")]
    pub quiet: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum QuantizationError {
    NotANumber(ParseIntError),
    Zero,
}

impl std::fmt::Display for QuantizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantizationError::NotANumber(err) => write!(f, "{}", err),
            QuantizationError::Zero => write!(f, "must be at least 1"),
        }
    }
}

fn parse_quantization(src: &str) -> Result<u32, QuantizationError> {
    match src.parse() {
        Ok(0) => Err(QuantizationError::Zero),
        Ok(frames) => Ok(frames),
        Err(err) => Err(QuantizationError::NotANumber(err)),
    }
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            quantization: self.quantization,
            discard_grace: self.discard_grace,
            pitch_axis: if self.observed_pitches {
                PitchAxis::Observed
            } else {
                PitchAxis::Full
            },
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::from_args()
}
