//! Single pass over a score's event stream.
//!
//! The interpreter keeps the state of the part being read (time model, clock,
//! note resolver, dynamics tracker and its growing matrices). Finished parts
//! are handed to the [`MatrixBuilder`]; a part which hits a fatal error is
//! dropped without touching the parts completed before it.

use crate::{
    dynamics::{DynamicMark, DynamicsTracker, UnknownDynamic},
    error::{Anomaly, ConfigError, Diagnostic, PartError, PartFailure},
    matrix::{MatrixBuilder, MatrixSet, PartRolls, PitchAxis},
    resolver::NoteResolver,
    score::ScoreEvent,
    time::{MeasureClock, TimeModel},
};
use std::{borrow::Borrow, mem};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Frames per quarter note
    pub quantization: u32,
    pub discard_grace: bool,
    pub pitch_axis: PitchAxis,
}

impl Config {
    pub fn new(quantization: u32) -> Self {
        Self {
            quantization,
            discard_grace: false,
            pitch_axis: PitchAxis::Full,
        }
    }
}

/// Everything a conversion produces
#[derive(Debug)]
pub struct Interpretation {
    pub matrices: MatrixSet,
    pub diagnostics: Vec<Diagnostic>,
    pub failures: Vec<PartFailure>,
}

struct PartState {
    id: String,
    name: String,
    meter: Option<(u32, u32)>,
    clock: MeasureClock,
    resolver: NoteResolver,
    dynamics: DynamicsTracker,
    rolls: PartRolls,
}

impl PartState {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            meter: None,
            clock: MeasureClock::new(),
            resolver: NoteResolver::new(),
            dynamics: DynamicsTracker::new(),
            rolls: PartRolls::new(),
        }
    }

    fn report(&self, diagnostics: &mut Vec<Diagnostic>, anomaly: Anomaly) {
        diagnostics.push(Diagnostic {
            part: self.name.clone(),
            measure: self.clock.measure_index(),
            anomaly,
        });
    }

    fn time_model(&self, event: &ScoreEvent) -> Result<TimeModel, PartError> {
        self.clock.time().ok_or_else(|| PartError::MissingDivisions {
            event: event.to_string(),
        })
    }

    fn apply(
        &mut self,
        event: &ScoreEvent,
        config: &Config,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), PartError> {
        match event {
            ScoreEvent::Divisions(value) => {
                let divisions = u32::try_from(*value)
                    .ok()
                    .filter(|divisions| *divisions > 0)
                    .ok_or(PartError::InvalidDivisions { value: *value })?;
                self.clock.set_time(match (self.clock.time(), self.meter) {
                    (Some(time), _) => time.with_divisions(divisions),
                    (None, Some((beats, beat_type))) => {
                        TimeModel::new(divisions, config.quantization).with_meter(beats, beat_type)
                    }
                    (None, None) => TimeModel::new(divisions, config.quantization),
                });
            }
            ScoreEvent::TimeSignature { beats, beat_type } => {
                self.meter = Some((*beats, *beat_type));
                if let Some(time) = self.clock.time() {
                    self.clock.set_time(time.with_meter(*beats, *beat_type));
                }
            }
            ScoreEvent::MeasureStart { index } => {
                self.resolver.start_measure();
                self.clock.start_measure(*index);
            }
            ScoreEvent::Note(note) => {
                if note.grace && config.discard_grace {
                    return Ok(());
                }
                let time = self.time_model(event)?;
                let resolution = self.resolver.resolve(note, &time, &mut self.clock);
                for anomaly in resolution.anomalies {
                    self.report(diagnostics, anomaly);
                }
                if let Some(placement) = resolution.placement {
                    if let Some(frame) = self.rolls.apply(&placement) {
                        self.report(
                            diagnostics,
                            Anomaly::NoteOverlap {
                                pitch: placement.pitch,
                                frame,
                            },
                        );
                    }
                }
            }
            ScoreEvent::Backup(duration) => {
                self.time_model(event)?;
                if let Some(anomaly) = self.resolver.backup(*duration, &mut self.clock) {
                    self.report(diagnostics, anomaly);
                }
            }
            ScoreEvent::Forward(duration) => {
                self.time_model(event)?;
                self.resolver.forward(*duration, &mut self.clock);
            }
            ScoreEvent::Dynamics(token) => match token.parse::<DynamicMark>() {
                Ok(mark) => {
                    self.dynamics
                        .on_dynamic_mark(mark, self.clock.cursor(), &mut self.rolls)
                }
                Err(UnknownDynamic(token)) => {
                    self.report(diagnostics, Anomaly::UnknownDynamic { token })
                }
            },
            ScoreEvent::Wedge(wedge) => {
                if !self
                    .dynamics
                    .on_wedge(*wedge, self.clock.cursor(), &mut self.rolls)
                {
                    self.report(diagnostics, Anomaly::UnmatchedWedgeStop);
                }
            }
            // Part boundaries belong to the interpreter
            ScoreEvent::PartStart { .. } | ScoreEvent::PartEnd => {}
        }
        Ok(())
    }

    /// Closes open ties and the last dynamics range
    fn finish(mut self, diagnostics: &mut Vec<Diagnostic>) -> (String, String, PartRolls) {
        for pitch in self.resolver.close() {
            self.report(diagnostics, Anomaly::UnterminatedTie { pitch });
        }
        let end = self.clock.end().max(self.rolls.len());
        self.rolls.ensure_capacity(end);
        self.dynamics.finish(end, &mut self.rolls);
        // A mark at the very end still governs the padding
        self.rolls.hold_level(self.dynamics.level());
        (self.id, self.name, self.rolls)
    }
}

enum Position {
    Between,
    InPart(Box<PartState>),
    /// A failed part whose remaining events are ignored
    Skipping,
}

/// Converts one score. Instances share nothing, so separate scores can be
/// interpreted on separate threads.
pub struct ScoreInterpreter {
    config: Config,
    position: Position,
    builder: MatrixBuilder,
    diagnostics: Vec<Diagnostic>,
    failures: Vec<PartFailure>,
}

impl ScoreInterpreter {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        if config.quantization == 0 {
            return Err(ConfigError::ZeroQuantization);
        }
        Ok(Self {
            config,
            position: Position::Between,
            builder: MatrixBuilder::new(),
            diagnostics: vec![],
            failures: vec![],
        })
    }

    pub fn consume(&mut self, event: &ScoreEvent) {
        match event {
            ScoreEvent::PartStart { id, name } => {
                let name = name.clone().unwrap_or_else(|| id.clone());
                if let Position::InPart(open) = mem::replace(&mut self.position, Position::Between)
                {
                    self.failures.push(PartFailure {
                        part: Some(open.name.clone()),
                        error: PartError::PartAlreadyOpen {
                            open: open.name,
                            next: name.clone(),
                        },
                    });
                }
                self.position = Position::InPart(Box::new(PartState::new(id.clone(), name)));
            }
            ScoreEvent::PartEnd => match mem::replace(&mut self.position, Position::Between) {
                Position::InPart(part) => self.complete(*part),
                Position::Skipping => {}
                Position::Between => self.failures.push(outside_part(event)),
            },
            _ => {
                let failure = match &mut self.position {
                    Position::InPart(part) => part
                        .apply(event, &self.config, &mut self.diagnostics)
                        .err()
                        .map(|error| PartFailure {
                            part: Some(part.name.clone()),
                            error,
                        }),
                    Position::Skipping => None,
                    Position::Between => Some(outside_part(event)),
                };
                if let Some(failure) = failure {
                    if failure.part.is_some() {
                        self.position = Position::Skipping;
                    }
                    self.failures.push(failure);
                }
            }
        }
    }

    /// Closes a part left open by the stream and pads all parts to a common length
    pub fn finish(mut self) -> Interpretation {
        if let Position::InPart(part) = mem::replace(&mut self.position, Position::Between) {
            part.report(&mut self.diagnostics, Anomaly::UnclosedPart);
            self.complete(*part);
        }
        Interpretation {
            matrices: self.builder.finalize(self.config.pitch_axis),
            diagnostics: self.diagnostics,
            failures: self.failures,
        }
    }

    fn complete(&mut self, part: PartState) {
        let (id, name, rolls) = part.finish(&mut self.diagnostics);
        if self.builder.commit(name.clone(), rolls) {
            self.diagnostics.push(Diagnostic {
                part: name,
                measure: None,
                anomaly: Anomaly::MergedPart { id },
            });
        }
    }
}

fn outside_part(event: &ScoreEvent) -> PartFailure {
    PartFailure {
        part: None,
        error: PartError::EventOutsidePart {
            event: event.to_string(),
        },
    }
}

/// Runs a whole event stream through a fresh interpreter
pub fn interpret<I>(events: I, config: Config) -> Result<Interpretation, ConfigError>
where
    I: IntoIterator,
    I::Item: Borrow<ScoreEvent>,
{
    let mut interpreter = ScoreInterpreter::new(config)?;
    for event in events {
        interpreter.consume(event.borrow());
    }
    Ok(interpreter.finish())
}
