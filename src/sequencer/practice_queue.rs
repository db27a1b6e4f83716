// Practice queue - Walks a plan of exercises, reconfiguring the metronome for each
// Exercises are completed or skipped in order; a pending one can be jumped to

use super::scheduler::Metronome;
use super::speed_trainer::SpeedTrainerConfig;
use crate::audio::backend::BackendFactory;
use serde::{Deserialize, Serialize};

/// Minutes given to an exercise that does not say
pub const DEFAULT_EXERCISE_MINUTES: u32 = 5;

/// Plan sections, in the order they are summarised
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    #[default]
    Fundamentals,
    OutOfContext,
    Tunes,
    InteractingWithHistory,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Fundamentals,
        Section::OutOfContext,
        Section::Tunes,
        Section::InteractingWithHistory,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Section::Fundamentals => "Fundamentals",
            Section::OutOfContext => "Out of Context",
            Section::Tunes => "Tunes",
            Section::InteractingWithHistory => "Interacting With History",
        }
    }

    /// Loose match on a free-form name. Unknown names file under Fundamentals.
    pub fn from_name(name: &str) -> Self {
        let slug: String = name
            .chars()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if slug.starts_with("outofcontext") {
            Section::OutOfContext
        } else if slug.starts_with("tune") {
            Section::Tunes
        } else if slug.starts_with("interactingwithhistory") || slug.starts_with("history") {
            Section::InteractingWithHistory
        } else {
            Section::Fundamentals
        }
    }
}

/// How an exercise drives the tempo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ExerciseTempo {
    /// Plain metronome at one tempo, trainer disarmed
    Fixed { bpm: f64 },
    /// Speed trainer drill
    Ramp(SpeedTrainerConfig),
}

impl ExerciseTempo {
    /// Tempo the exercise opens at
    pub fn start_bpm(&self) -> f64 {
        match self {
            ExerciseTempo::Fixed { bpm } => *bpm,
            ExerciseTempo::Ramp(config) => config.start_bpm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub label: String,
    pub section: Section,
    pub duration_minutes: u32,
    pub tempo: ExerciseTempo,
}

impl Exercise {
    pub fn fixed(label: impl Into<String>, section: Section, minutes: u32, bpm: f64) -> Self {
        Self::new(label, section, minutes, ExerciseTempo::Fixed { bpm })
    }

    pub fn ramp(
        label: impl Into<String>,
        section: Section,
        minutes: u32,
        config: SpeedTrainerConfig,
    ) -> Self {
        Self::new(label, section, minutes, ExerciseTempo::Ramp(config.sanitized()))
    }

    fn new(label: impl Into<String>, section: Section, minutes: u32, tempo: ExerciseTempo) -> Self {
        Self {
            label: label.into(),
            section,
            duration_minutes: minutes.max(1),
            tempo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseStatus {
    Pending,
    Complete,
    Skipped,
}

/// What a queue step led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Another exercise is now active
    Next(usize),
    /// Nothing pending after the settled exercise
    Finished,
    /// No exercise was active
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    pub section: Section,
    pub total_minutes: u32,
    pub completed_minutes: u32,
    pub total_exercises: usize,
    pub completed_exercises: usize,
    pub skipped_exercises: usize,
}

impl SectionSummary {
    fn empty(section: Section) -> Self {
        Self {
            section,
            total_minutes: 0,
            completed_minutes: 0,
            total_exercises: 0,
            completed_exercises: 0,
            skipped_exercises: 0,
        }
    }
}

/// Where a plan stands, ready for display or JSON.
///
/// Skipped exercises count as settled: their minutes move into
/// `completed_minutes` so `remaining_minutes` tracks what is left to play.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueProgress {
    pub title: String,
    pub active_index: Option<usize>,
    pub total_exercises: usize,
    pub completed_exercises: usize,
    pub skipped_exercises: usize,
    pub total_minutes: u32,
    pub completed_minutes: u32,
    pub remaining_minutes: u32,
    pub sections: Vec<SectionSummary>,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    exercise: Exercise,
    status: ExerciseStatus,
}

/// A practice plan being worked through
#[derive(Debug, Clone, Default)]
pub struct PracticeQueue {
    title: String,
    entries: Vec<QueueEntry>,
    active: Option<usize>,
}

impl PracticeQueue {
    /// Start a plan. The first exercise, if any, becomes active.
    pub fn new(title: impl Into<String>, exercises: Vec<Exercise>) -> Self {
        let entries: Vec<QueueEntry> = exercises
            .into_iter()
            .map(|exercise| QueueEntry {
                exercise,
                status: ExerciseStatus::Pending,
            })
            .collect();
        let active = if entries.is_empty() { None } else { Some(0) };
        Self {
            title: title.into(),
            entries,
            active,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&Exercise> {
        self.active
            .and_then(|index| self.entries.get(index))
            .map(|entry| &entry.exercise)
    }

    pub fn status(&self, index: usize) -> Option<ExerciseStatus> {
        self.entries.get(index).map(|entry| entry.status)
    }

    /// No exercise left to play
    pub fn is_finished(&self) -> bool {
        self.active.is_none()
    }

    pub fn complete_active(&mut self) -> Advance {
        self.settle_active(ExerciseStatus::Complete)
    }

    pub fn skip_active(&mut self) -> Advance {
        self.settle_active(ExerciseStatus::Skipped)
    }

    /// Make a pending exercise active. Settled or out-of-range indices are
    /// ignored and return false.
    pub fn go_to(&mut self, index: usize) -> bool {
        match self.entries.get(index) {
            Some(entry) if entry.status == ExerciseStatus::Pending => {
                self.active = Some(index);
                true
            }
            _ => false,
        }
    }

    fn settle_active(&mut self, status: ExerciseStatus) -> Advance {
        let Some(index) = self.active else {
            return Advance::Idle;
        };
        let Some(entry) = self.entries.get_mut(index) else {
            self.active = None;
            return Advance::Idle;
        };
        entry.status = status;
        log::debug!("Exercise '{}' {:?}", entry.exercise.label, status);

        // Earlier pending exercises stay reachable through go_to
        self.active = self.entries[index + 1..]
            .iter()
            .position(|entry| entry.status == ExerciseStatus::Pending)
            .map(|offset| index + 1 + offset);

        match self.active {
            Some(next) => Advance::Next(next),
            None => {
                log::info!("Practice plan '{}' finished", self.title);
                Advance::Finished
            }
        }
    }

    /// Set the metronome up for the active exercise.
    ///
    /// A running metronome is stopped first, so the exercise starts from its
    /// own count-in on the next start. Returns false when nothing is active.
    pub fn configure<F: BackendFactory>(&self, metronome: &mut Metronome<F>) -> bool {
        let (Some(index), Some(exercise)) = (self.active, self.active()) else {
            return false;
        };
        if metronome.is_running() {
            metronome.stop();
        }
        match exercise.tempo {
            ExerciseTempo::Fixed { bpm } => {
                metronome.disarm();
                metronome.set_tempo(bpm);
            }
            ExerciseTempo::Ramp(config) => {
                metronome.set_tempo(config.start_bpm);
                metronome.arm_with(config);
            }
        }
        log::info!(
            "Exercise {}/{}: {} ({}, {} min)",
            index + 1,
            self.entries.len(),
            exercise.label,
            exercise.section.label(),
            exercise.duration_minutes
        );
        true
    }

    pub fn progress(&self) -> QueueProgress {
        let mut sections: Vec<SectionSummary> =
            Section::ALL.iter().map(|&s| SectionSummary::empty(s)).collect();
        let mut completed_exercises = 0;
        let mut skipped_exercises = 0;
        let mut completed_minutes = 0;

        for entry in &self.entries {
            let minutes = entry.exercise.duration_minutes;
            let Some(summary) = sections
                .iter_mut()
                .find(|summary| summary.section == entry.exercise.section)
            else {
                continue;
            };
            summary.total_exercises += 1;
            summary.total_minutes += minutes;

            if entry.status == ExerciseStatus::Pending {
                continue;
            }
            completed_exercises += 1;
            completed_minutes += minutes;
            summary.completed_exercises += 1;
            summary.completed_minutes += minutes;
            if entry.status == ExerciseStatus::Skipped {
                skipped_exercises += 1;
                summary.skipped_exercises += 1;
            }
        }

        let total_minutes = sections.iter().map(|s| s.total_minutes).sum::<u32>();
        QueueProgress {
            title: self.title.clone(),
            active_index: self.active,
            total_exercises: self.entries.len(),
            completed_exercises,
            skipped_exercises,
            total_minutes,
            completed_minutes,
            remaining_minutes: total_minutes.saturating_sub(completed_minutes),
            sections,
        }
    }
}
