use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into the nine-slot day row.
pub type Period = usize;

pub const DAY_COUNT: usize = 5;
pub const PERIOD_COUNT: usize = 9;

pub const SHORT_BREAK: Period = 2;
pub const LUNCH_BREAK: Period = 5;

/// Periods that can hold a class, in day order.
pub const TEACHING_PERIODS: [Period; 7] = [0, 1, 3, 4, 6, 7, 8];

/// The first three teaching periods. Every year must have something here each day.
pub const MORNING_PERIODS: [Period; 3] = [0, 1, 3];

/// Afternoon periods, filled front to back.
pub const AFTERNOON_PERIODS: [Period; 3] = [6, 7, 8];

/// Display descriptor for one slot of the day row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeriodInfo {
    pub name: &'static str,
    pub time: &'static str,
    pub teaching: bool,
}

pub const PERIODS: [PeriodInfo; PERIOD_COUNT] = [
    PeriodInfo { name: "1st", time: "9:00-10:00", teaching: true },
    PeriodInfo { name: "2nd", time: "10:00-11:00", teaching: true },
    PeriodInfo { name: "Break", time: "11:00-11:15", teaching: false },
    PeriodInfo { name: "3rd", time: "11:15-12:15", teaching: true },
    PeriodInfo { name: "4th", time: "12:15-1:15", teaching: true },
    PeriodInfo { name: "Lunch", time: "1:15-2:30", teaching: false },
    PeriodInfo { name: "5th", time: "2:30-3:20", teaching: true },
    PeriodInfo { name: "6th", time: "3:20-4:15", teaching: true },
    PeriodInfo { name: "7th", time: "4:15-5:00", teaching: true },
];

pub fn is_teaching(period: Period) -> bool {
    period < PERIOD_COUNT && PERIODS[period].teaching
}

/// The period a teacher must leave free after teaching `period`.
/// `None` for the last teaching period of the day.
pub fn next_rest(period: Period) -> Option<Period> {
    match period {
        0 => Some(1),
        1 => Some(3),
        3 => Some(4),
        4 => Some(6),
        6 => Some(7),
        7 => Some(8),
        _ => None,
    }
}

/// Inverse of [`next_rest`]: the teaching period whose rest slot is `period`.
pub fn previous_teaching(period: Period) -> Option<Period> {
    TEACHING_PERIODS
        .iter()
        .copied()
        .find(|&p| next_rest(p) == Some(period))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
}

impl Day {
    pub const ALL: [Day; DAY_COUNT] = [Day::Mon, Day::Tue, Day::Wed, Day::Thu, Day::Fri];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn previous(self) -> Option<Day> {
        match self {
            Day::Mon => None,
            other => Some(Day::ALL[other.index() - 1]),
        }
    }

    /// Accepts short (`Mon`) and long (`monday`) names, case-insensitively.
    pub fn parse(name: &str) -> Option<Day> {
        let lowered = name.trim().to_ascii_lowercase();
        Day::ALL.into_iter().find(|day| {
            let short = day.short_name().to_ascii_lowercase();
            lowered == short || lowered == day.long_name()
        })
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Day::Mon => "Mon",
            Day::Tue => "Tue",
            Day::Wed => "Wed",
            Day::Thu => "Thu",
            Day::Fri => "Fri",
        }
    }

    fn long_name(self) -> &'static str {
        match self {
            Day::Mon => "monday",
            Day::Tue => "tuesday",
            Day::Wed => "wednesday",
            Day::Thu => "thursday",
            Day::Fri => "friday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// One of the three contiguous blocks a lab may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabWindow {
    Morning,
    Midday,
    Afternoon,
}

impl LabWindow {
    pub const ALL: [LabWindow; 3] = [LabWindow::Morning, LabWindow::Midday, LabWindow::Afternoon];

    pub fn periods(self) -> &'static [Period] {
        match self {
            LabWindow::Morning => &[0, 1],
            LabWindow::Midday => &[3, 4],
            LabWindow::Afternoon => &[6, 7, 8],
        }
    }

    pub fn start(self) -> Period {
        self.periods()[0]
    }

    pub fn last(self) -> Period {
        self.periods()[self.len() - 1]
    }

    pub fn len(self) -> usize {
        self.periods().len()
    }

    pub fn covers(self, period: Period) -> bool {
        self.periods().contains(&period)
    }

    pub fn from_start(period: Period) -> Option<LabWindow> {
        LabWindow::ALL.into_iter().find(|w| w.start() == period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teaching_periods_skip_breaks() {
        assert_eq!(TEACHING_PERIODS.len(), 7);
        assert!(!is_teaching(SHORT_BREAK));
        assert!(!is_teaching(LUNCH_BREAK));
        assert!(!is_teaching(PERIOD_COUNT));
        for p in TEACHING_PERIODS {
            assert!(is_teaching(p));
        }
    }

    #[test]
    fn rest_chain_crosses_breaks() {
        assert_eq!(next_rest(1), Some(3));
        assert_eq!(next_rest(4), Some(6));
        assert_eq!(next_rest(8), None);
        assert_eq!(previous_teaching(3), Some(1));
        assert_eq!(previous_teaching(0), None);
    }

    #[test]
    fn lab_windows_are_contiguous_teaching_runs() {
        for window in LabWindow::ALL {
            assert!(window.periods().iter().all(|&p| is_teaching(p)));
            for pair in window.periods().windows(2) {
                assert_eq!(next_rest(pair[0]), Some(pair[1]));
            }
        }
        assert_eq!(LabWindow::from_start(6), Some(LabWindow::Afternoon));
        assert_eq!(LabWindow::from_start(7), None);
        assert_eq!(LabWindow::Afternoon.len(), 3);
        assert_eq!(LabWindow::Midday.last(), 4);
        assert!(LabWindow::Morning.covers(1));
        assert!(!LabWindow::Morning.covers(3));
    }

    #[test]
    fn day_names_parse_loosely() {
        assert_eq!(Day::parse("Mon"), Some(Day::Mon));
        assert_eq!(Day::parse(" wednesday "), Some(Day::Wed));
        assert_eq!(Day::parse("FRI"), Some(Day::Fri));
        assert_eq!(Day::parse("Sat"), None);
        assert_eq!(Day::Tue.previous(), Some(Day::Mon));
        assert_eq!(Day::Mon.previous(), None);
    }
}
