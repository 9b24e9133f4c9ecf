use crate::geometry::{Day, LabWindow, Period};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// Type aliases for clarity
pub type RequirementId = usize;
pub type TeacherId = String;
pub type Year = u8;

/// One row of upstream input, exactly as it arrived.
///
/// Every field is a loose JSON value so that a garbled entry never fails the
/// whole batch; [`crate::normalize`] coerces them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawEntry {
    #[serde(default)]
    pub teacher: Value,
    #[serde(default)]
    pub year: Value,
    #[serde(default)]
    pub subject: Value,
    #[serde(default)]
    pub hours: Value,
    /// Explicit non-lab hours for a lab-only subject.
    #[serde(default)]
    pub theory_hours: Value,
    #[serde(default)]
    pub is_integrated: Value,
    #[serde(default)]
    pub is_lab: Value,
    #[serde(default)]
    pub is_external_lab: Value,
    #[serde(default, alias = "day_time_prefs")]
    pub preferences: Value,
}

/// Single-period sessions needed per week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TheoryComponent {
    pub hours: u32,
}

/// Where a lab block may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabPolicy {
    /// Integrated and external: afternoon block only.
    AfternoonOnly,
    /// Integrated only: morning or midday block.
    MorningOrMidday,
    Any,
}

/// One contiguous block scheduled once per week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabComponent {
    pub duration: usize,
    pub policy: LabPolicy,
}

impl LabComponent {
    pub fn allows(&self, window: LabWindow) -> bool {
        let by_policy = match self.policy {
            LabPolicy::AfternoonOnly => window == LabWindow::Afternoon,
            LabPolicy::MorningOrMidday => window != LabWindow::Afternoon,
            LabPolicy::Any => true,
        };
        by_policy && window.len() == self.duration
    }

    pub fn windows(self) -> impl Iterator<Item = LabWindow> {
        LabWindow::ALL.into_iter().filter(move |w| self.allows(*w))
    }
}

/// A normalized teacher + year + subject scheduling need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub teacher: TeacherId,
    pub year: Year,
    pub subject: String,
    pub hours: u32,
    pub is_integrated: bool,
    pub is_lab: bool,
    pub is_external_lab: bool,
    pub preferences: BTreeMap<Day, Period>,
    pub theory: Option<TheoryComponent>,
    pub lab: Option<LabComponent>,
}

impl Requirement {
    pub fn theory_hours(&self) -> u32 {
        self.theory.map_or(0, |t| t.hours)
    }

    pub fn lab_label(&self) -> String {
        format!("{} - Lab", self.subject)
    }

    /// The preferences both strategies act on: one per theory hour at most,
    /// earliest day first. Anything past that is dropped.
    pub fn honoured_preferences(&self) -> impl Iterator<Item = (Day, Period)> + '_ {
        self.preferences
            .iter()
            .map(|(&day, &period)| (day, period))
            .take(self.theory_hours() as usize)
    }

    /// Stated preferences that exceed the theory hours.
    pub fn surplus_preferences(&self) -> usize {
        self.preferences
            .len()
            .saturating_sub(self.theory_hours() as usize)
    }

    /// True when `(day, period)` is one of this requirement's honoured preferences.
    pub fn prefers(&self, day: Day, period: Period) -> bool {
        self.honoured_preferences()
            .any(|slot| slot == (day, period))
    }
}

/// `year -> day -> nine optional labels`.
pub type Timetable = BTreeMap<Year, BTreeMap<Day, Vec<Option<String>>>>;

/// What could not be placed for one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unallocated {
    pub subject: String,
    pub teacher: TeacherId,
    pub year: Year,
    pub theory_remaining: u32,
    pub lab_remaining: u32,
    pub lab_needed: bool,
    pub is_integrated: bool,
    pub is_external_lab: bool,
    pub lab_length: u32,
}

impl fmt::Display for Unallocated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| if b { "Y" } else { "N" };
        write!(
            f,
            "{} (Year {}) - {} - theory: {}, lab: {} - int: {} - ext: {}",
            self.teacher,
            self.year,
            self.subject,
            self.theory_remaining,
            self.lab_remaining,
            flag(self.is_integrated),
            flag(self.is_external_lab)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemesterType {
    #[default]
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    /// Produced by the greedy passes; may carry a shortfall.
    BestEffort,
}

/// The final output of an allocation run.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutput {
    pub timetable: Timetable,
    pub unallocated: Vec<Unallocated>,
    pub strategy: &'static str,
    pub status: SolveStatus,
    pub teacher_subjects: BTreeMap<TeacherId, Vec<String>>,
    pub year_labels: BTreeMap<Year, String>,
}
