use crate::score::{NoteEvent, ScoreEvent};

macro_rules! note {
    ( $p:expr, $d:expr ) => {
        $crate::score::ScoreEvent::Note($crate::score::NoteEvent::note($p, $d))
    };
}

macro_rules! rest {
    ( $d:expr ) => {
        $crate::score::ScoreEvent::Note($crate::score::NoteEvent::rest($d))
    };
}

macro_rules! notes {
    (
        $( ($p: expr, $d: expr) ),+
    ) => {
        vec![ $( note!($p, $d) ),+ ]
    }
}

/// Wraps measure contents into a complete part: start, divisions, one
/// measure-start per measure and the closing part-end.
pub fn part(id: &str, divisions: i64, measures: Vec<Vec<ScoreEvent>>) -> Vec<ScoreEvent> {
    let mut events = vec![
        ScoreEvent::PartStart {
            id: id.to_string(),
            name: None,
        },
        ScoreEvent::Divisions(divisions),
    ];
    for (index, measure) in measures.into_iter().enumerate() {
        events.push(ScoreEvent::MeasureStart {
            index: index as u32,
        });
        events.extend(measure);
    }
    events.push(ScoreEvent::PartEnd);
    events
}

pub fn dynamics(token: &str) -> ScoreEvent {
    ScoreEvent::Dynamics(token.to_string())
}

/// A chain of notes of one pitch, each tied to the next
pub fn tied(pitch: u8, durations: &[i64]) -> Vec<ScoreEvent> {
    let last = durations.len().saturating_sub(1);
    durations
        .iter()
        .enumerate()
        .map(|(i, duration)| {
            let mut note = NoteEvent::note(pitch, *duration);
            note.tie_stop = i > 0;
            note.tie_start = i < last;
            ScoreEvent::Note(note)
        })
        .collect()
}

/// (start, length) of every run of ones in a matrix column
pub fn runs(column: &[u8]) -> Vec<(usize, usize)> {
    let mut runs = vec![];
    let mut start = None;
    for (frame, cell) in column.iter().chain([0].iter()).enumerate() {
        match (start, *cell) {
            (None, 1) => start = Some(frame),
            (Some(first), 0) => {
                runs.push((first, frame - first));
                start = None;
            }
            _ => {}
        }
    }
    runs
}

#[test]
fn runs_split_at_zeros() {
    assert_eq!(runs(&[1, 1, 0, 0, 1, 0, 1]), [(0, 2), (4, 1), (6, 1)]);
    assert!(runs(&[0, 0]).is_empty());
}
