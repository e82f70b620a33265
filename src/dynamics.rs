//! Loudness markings and the per-part level they leave behind.
//!
//! Levels are written lazily: a marking only closes the range opened by the
//! previous one, so the dynamics curve of a part is stamped piecewise as the
//! score advances and finished once the part ends.

use crate::{matrix::PartRolls, score::Wedge};
use once_cell::sync::Lazy;
use std::{collections::HashMap, str::FromStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DynamicMark {
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
    /// sf, sfz, sffz and fz: a single accented frame
    Sforzando,
    /// Loud attack, soft from the next frame on
    FortePiano,
}

/// Level in effect before a part's first marking
pub const BASELINE_LEVEL: f32 = 0.625;

/// Amount a hairpin raises or lowers the level
const WEDGE_STEP: f32 = 0.1;

static TOKENS: Lazy<HashMap<&'static str, DynamicMark>> = Lazy::new(|| {
    use DynamicMark::*;
    HashMap::from([
        ("ppp", Ppp),
        ("pp", Pp),
        ("p", P),
        ("mp", Mp),
        ("mf", Mf),
        ("f", F),
        ("ff", Ff),
        ("fff", Fff),
        ("sf", Sforzando),
        ("sfz", Sforzando),
        ("sffz", Sforzando),
        ("fz", Sforzando),
        ("fp", FortePiano),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDynamic(pub String);

impl FromStr for DynamicMark {
    type Err = UnknownDynamic;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        TOKENS
            .get(token.trim())
            .copied()
            .ok_or_else(|| UnknownDynamic(token.to_string()))
    }
}

impl DynamicMark {
    /// ppp..fff sit on an evenly spaced scale of eighths
    pub fn level(self) -> f32 {
        match self {
            DynamicMark::Ppp => 0.125,
            DynamicMark::Pp => 0.25,
            DynamicMark::P => 0.375,
            DynamicMark::Mp => 0.5,
            DynamicMark::Mf => 0.625,
            DynamicMark::F => 0.75,
            DynamicMark::Ff => 0.875,
            DynamicMark::Fff | DynamicMark::Sforzando => 1.0,
            DynamicMark::FortePiano => DynamicMark::F.level(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct OpenWedge {
    rising: bool,
    start: usize,
    level: f32,
}

/// Current loudness of one part
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicsTracker {
    level: f32,
    open_since: usize,
    wedge: Option<OpenWedge>,
}

impl Default for DynamicsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicsTracker {
    pub fn new() -> Self {
        Self {
            level: BASELINE_LEVEL,
            open_since: 0,
            wedge: None,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Applies a marking found at `frame`, closing the range of the previous one
    pub fn on_dynamic_mark(&mut self, mark: DynamicMark, frame: usize, rolls: &mut PartRolls) {
        self.close_pending(frame, rolls);
        match mark {
            DynamicMark::Sforzando => {
                rolls.set_dynamics(frame..frame + 1, mark.level());
                self.open_since = frame + 1;
            }
            DynamicMark::FortePiano => {
                rolls.set_dynamics(frame..frame + 1, mark.level());
                self.level = DynamicMark::P.level();
                self.open_since = frame + 1;
            }
            _ => {
                self.level = mark.level();
                self.open_since = frame;
            }
        }
    }

    /// Starts or stops a hairpin at `frame`. Returns false for a stop with
    /// no hairpin open.
    pub fn on_wedge(&mut self, wedge: Wedge, frame: usize, rolls: &mut PartRolls) -> bool {
        match wedge {
            Wedge::Crescendo | Wedge::Diminuendo => {
                self.close_pending(frame, rolls);
                self.wedge = Some(OpenWedge {
                    rising: wedge == Wedge::Crescendo,
                    start: frame,
                    level: self.level,
                });
                true
            }
            Wedge::Stop if self.wedge.is_some() => {
                self.close_pending(frame, rolls);
                true
            }
            Wedge::Stop => false,
        }
    }

    /// Writes the current level over `frames`
    pub fn stamp_range(&self, frames: std::ops::Range<usize>, rolls: &mut PartRolls) {
        if frames.start < frames.end {
            rolls.set_dynamics(frames, self.level);
        }
    }

    /// Closes the last open range at the part's final frame
    pub fn finish(&mut self, end: usize, rolls: &mut PartRolls) {
        self.close_pending(end, rolls);
    }

    fn close_pending(&mut self, frame: usize, rolls: &mut PartRolls) {
        match self.wedge.take() {
            Some(wedge) => {
                let target = if wedge.rising {
                    (wedge.level + WEDGE_STEP).min(1.0)
                } else {
                    (wedge.level - WEDGE_STEP).max(0.0)
                };
                write_ramp(rolls, wedge.start..frame, wedge.level, target);
                self.level = target;
            }
            None => self.stamp_range(self.open_since..frame, rolls),
        }
        self.open_since = frame;
    }
}

/// Linear ramp over `frames`, hitting `from` on the first and `to` on the last frame
fn write_ramp(rolls: &mut PartRolls, frames: std::ops::Range<usize>, from: f32, to: f32) {
    let steps = frames.len();
    for (i, frame) in frames.enumerate() {
        let level = if steps > 1 {
            from + (to - from) * i as f32 / (steps - 1) as f32
        } else {
            from
        };
        rolls.set_dynamics(frame..frame + 1, level);
    }
}
