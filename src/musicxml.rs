//! Pulls [`ScoreEvent`]s out of a partwise MusicXML document.
//!
//! Only the elements the interpreter understands are read; everything else
//! (layout, lyrics, beams, ...) is skipped.

use crate::score::{pitch_from_step, NoteEvent, PitchOrRest, ScoreEvent, Wedge};
use anyhow::{bail, Context, Result};
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

#[derive(Debug, Default)]
struct NoteDraft {
    hidden: bool,
    rest: bool,
    step: Option<char>,
    alter: i32,
    octave: Option<i32>,
    duration: Option<i64>,
    chord: bool,
    grace: bool,
    tie_start: bool,
    tie_stop: bool,
    staccato: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShiftKind {
    Backup,
    Forward,
}

#[derive(Debug)]
struct EventCollector {
    events: Vec<ScoreEvent>,
    /// Names of the currently open elements
    path: Vec<String>,
    part_names: HashMap<String, String>,
    score_part: Option<String>,
    part: Option<String>,
    measure_count: u32,
    note: Option<NoteDraft>,
    shift: Option<(ShiftKind, Option<i64>)>,
    beats: Option<u32>,
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>> {
    Ok(match e.try_get_attribute(name)? {
        Some(attr) => Some(attr.unescape_value()?.into_owned()),
        None => None,
    })
}

fn parse_number<T: FromStr>(element: &str, text: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.trim()
        .parse()
        .with_context(|| format!("invalid <{element}> value {text:?}"))
}

impl EventCollector {
    fn new() -> Self {
        Self {
            events: vec![],
            path: vec![],
            part_names: HashMap::new(),
            score_part: None,
            part: None,
            measure_count: 0,
            note: None,
            shift: None,
            beats: None,
        }
    }

    fn parent(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }

    fn inside(&self, element: &str) -> bool {
        self.path.iter().any(|open| open == element)
    }

    /// Handles an opening or empty element. `name` is not yet on the path.
    fn open(&mut self, e: &BytesStart, name: &str) -> Result<()> {
        if self.parent() == Some("dynamics") && name != "other-dynamics" {
            self.events.push(ScoreEvent::Dynamics(name.to_string()));
            return Ok(());
        }
        match name {
            "score-part" => self.score_part = attribute(e, "id")?,
            "part" => {
                let id = attribute(e, "id")?.unwrap_or_default();
                self.events.push(ScoreEvent::PartStart {
                    name: self.part_names.get(&id).cloned(),
                    id: id.clone(),
                });
                self.part = Some(id);
                self.measure_count = 0;
                self.beats = None;
            }
            "measure" => {
                self.events.push(ScoreEvent::MeasureStart {
                    index: self.measure_count,
                });
                self.measure_count += 1;
            }
            "note" => {
                self.note = Some(NoteDraft {
                    hidden: attribute(e, "print-object")?.as_deref() == Some("no"),
                    ..NoteDraft::default()
                });
            }
            "backup" => self.shift = Some((ShiftKind::Backup, None)),
            "forward" => self.shift = Some((ShiftKind::Forward, None)),
            "wedge" => match attribute(e, "type")?.as_deref() {
                Some("crescendo") => self.events.push(ScoreEvent::Wedge(Wedge::Crescendo)),
                Some("diminuendo") => self.events.push(ScoreEvent::Wedge(Wedge::Diminuendo)),
                Some("stop") => self.events.push(ScoreEvent::Wedge(Wedge::Stop)),
                _ => {}
            },
            _ => {
                if let Some(note) = self.note.as_mut() {
                    match name {
                        "rest" | "unpitched" => note.rest = true,
                        "chord" => note.chord = true,
                        "grace" => note.grace = true,
                        "staccato" => note.staccato = true,
                        // <tied> under <notations> repeats what <tie> says
                        "tie" => match attribute(e, "type")?.as_deref() {
                            Some("start") => note.tie_start = true,
                            Some("stop") => note.tie_stop = true,
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let element = match self.parent() {
            Some(element) => element.to_string(),
            None => return Ok(()),
        };
        match element.as_str() {
            "part-name" if self.inside("score-part") => {
                if let Some(id) = self.score_part.clone() {
                    self.part_names
                        .entry(id)
                        .or_default()
                        .push_str(text.trim());
                }
            }
            "divisions" => {
                let divisions = parse_number(&element, text)?;
                self.events.push(ScoreEvent::Divisions(divisions));
            }
            "beats" => {
                // Composite signatures like 3+2 count as their sum
                let beats = text
                    .split('+')
                    .map(|beats| parse_number::<u32>(&element, beats))
                    .sum::<Result<u32>>()?;
                self.beats = Some(beats);
            }
            "beat-type" => {
                let beat_type = parse_number(&element, text)?;
                if let Some(beats) = self.beats.take() {
                    self.events.push(ScoreEvent::TimeSignature { beats, beat_type });
                }
            }
            "duration" => {
                let duration = parse_number(&element, text)?;
                if let Some((_, shift)) = self.shift.as_mut() {
                    *shift = Some(duration);
                } else if let Some(note) = self.note.as_mut() {
                    note.duration = Some(duration);
                }
            }
            "step" => {
                if let Some(note) = self.note.as_mut() {
                    note.step = text.trim().chars().next();
                }
            }
            "alter" => {
                if let Some(note) = self.note.as_mut() {
                    // Microtonal alterations snap to the nearest semitone
                    note.alter = parse_number::<f64>(&element, text)?.round() as i32;
                }
            }
            "octave" => {
                if let Some(note) = self.note.as_mut() {
                    note.octave = Some(parse_number(&element, text)?);
                }
            }
            "other-dynamics" => self.events.push(ScoreEvent::Dynamics(text.trim().to_string())),
            _ => {}
        }
        Ok(())
    }

    /// Handles a closing element, or the end of an empty one
    fn close(&mut self, name: &str) -> Result<()> {
        match name {
            "score-part" => self.score_part = None,
            "part" => {
                self.events.push(ScoreEvent::PartEnd);
                self.part = None;
            }
            "note" => {
                if let Some(draft) = self.note.take() {
                    if let Some(note) = self.finish_note(draft)? {
                        self.events.push(ScoreEvent::Note(note));
                    }
                }
            }
            "backup" | "forward" => {
                if let Some((kind, duration)) = self.shift.take() {
                    let duration = match duration {
                        Some(duration) => duration,
                        None => bail!("<{name}> without duration {}", self.location()),
                    };
                    self.events.push(match kind {
                        ShiftKind::Backup => ScoreEvent::Backup(duration),
                        ShiftKind::Forward => ScoreEvent::Forward(duration),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_note(&self, draft: NoteDraft) -> Result<Option<NoteEvent>> {
        if draft.hidden {
            return Ok(None);
        }
        let duration = match (draft.duration, draft.grace) {
            (Some(duration), false) => duration,
            (_, true) => 0,
            (None, false) => bail!("note without duration {}", self.location()),
        };
        let pitch = if draft.rest {
            PitchOrRest::Rest
        } else {
            match (draft.step, draft.octave) {
                (Some(step), Some(octave)) => match pitch_from_step(step, draft.alter, octave) {
                    Some(pitch) => PitchOrRest::Pitch(pitch),
                    None => bail!(
                        "pitch {step}{octave} (alter {}) out of MIDI range {}",
                        draft.alter,
                        self.location()
                    ),
                },
                _ => bail!("note without pitch or rest {}", self.location()),
            }
        };
        Ok(Some(NoteEvent {
            pitch,
            duration,
            chord: draft.chord,
            tie_start: draft.tie_start,
            tie_stop: draft.tie_stop,
            staccato: draft.staccato,
            grace: draft.grace,
        }))
    }

    fn location(&self) -> String {
        match &self.part {
            Some(part) => format!("in part {part} measure {}", self.measure_count.saturating_sub(1)),
            None => "outside of any part".to_string(),
        }
    }
}

/// Reads all score events from a MusicXML document
pub fn read_events<R: BufRead>(source: R) -> Result<Vec<ScoreEvent>> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut collector = EventCollector::new();
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .with_context(|| format!("malformed XML at byte {}", reader.buffer_position()))?
        {
            Event::Start(e) => {
                let name = local_name(&e);
                collector.open(&e, &name)?;
                collector.path.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                collector.open(&e, &name)?;
                collector.close(&name)?;
            }
            Event::Text(t) => collector.text(&t.unescape()?)?,
            Event::End(_) => {
                if let Some(name) = collector.path.pop() {
                    collector.close(&name)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(collector.events)
}

pub fn read_str(xml: &str) -> Result<Vec<ScoreEvent>> {
    read_events(xml.as_bytes())
}

pub fn read_file(path: &Path) -> Result<Vec<ScoreEvent>> {
    let file = File::open(path).with_context(|| format!("can't open {}", path.display()))?;
    read_events(BufReader::new(file)).with_context(|| format!("can't read {}", path.display()))
}
