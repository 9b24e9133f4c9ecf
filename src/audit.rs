//! Independent re-check of the hard rules over a finished grid.

use crate::data::{Requirement, RequirementId, TeacherId, Year};
use crate::geometry::{Day, LabWindow, Period, is_teaching, next_rest};
use crate::grid::{Cell, Grid};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    NonTeachingSlot { year: Year, day: Day, period: Period },
    UnknownRequirement { year: Year, id: RequirementId },
    TeacherDoubleBooked { teacher: TeacherId, day: Day, period: Period },
    /// `period` is the rest slot that was taught straight after a session.
    RestSkipped { teacher: TeacherId, day: Day, period: Period },
    BrokenLab { year: Year, subject: String, day: Day },
    LabRepeated { year: Year, subject: String },
    SubjectTwiceInDay { year: Year, subject: String, day: Day },
    /// A taught afternoon period with an untaught one before it.
    AfternoonGap { year: Year, day: Day },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NonTeachingSlot { year, day, period } => {
                write!(f, "Y{year} {day} p{period}: session placed in a break")
            }
            Violation::UnknownRequirement { year, id } => {
                write!(f, "Y{year}: cell refers to unknown requirement {id}")
            }
            Violation::TeacherDoubleBooked { teacher, day, period } => {
                write!(f, "{teacher} double-booked on {day} p{period}")
            }
            Violation::RestSkipped { teacher, day, period } => {
                write!(f, "{teacher} has no rest before {day} p{period}")
            }
            Violation::BrokenLab { year, subject, day } => {
                write!(f, "Y{year} {day}: {subject} lab is not one valid block")
            }
            Violation::LabRepeated { year, subject } => {
                write!(f, "Y{year}: {subject} lab placed on more than one day")
            }
            Violation::SubjectTwiceInDay { year, subject, day } => {
                write!(f, "Y{year} {day}: {subject} has more than one session")
            }
            Violation::AfternoonGap { year, day } => {
                write!(f, "Y{year} {day}: afternoon session after an empty period")
            }
        }
    }
}

type Slot = (Year, Cell);

/// Every hard-rule breach in `grid`; empty when the grid is sound.
pub fn audit(grid: &Grid, requirements: &[Requirement]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut teaching: BTreeMap<(&str, Day), BTreeMap<Period, Vec<Slot>>> = BTreeMap::new();
    let mut lab_runs: BTreeMap<(Year, RequirementId, Day), Vec<Period>> = BTreeMap::new();
    let mut sessions: BTreeMap<(Year, &str, Day), usize> = BTreeMap::new();

    for (year, day, period, cell) in grid.cells() {
        if !is_teaching(period) {
            violations.push(Violation::NonTeachingSlot { year, day, period });
            continue;
        }
        let Some(id) = cell.requirement() else {
            continue;
        };
        let Some(req) = requirements.get(id) else {
            violations.push(Violation::UnknownRequirement { year, id });
            continue;
        };
        teaching
            .entry((req.teacher.as_str(), day))
            .or_default()
            .entry(period)
            .or_default()
            .push((year, cell));
        match cell {
            Cell::Lab(_) => lab_runs.entry((year, id, day)).or_default().push(period),
            _ => *sessions.entry((year, req.subject.as_str(), day)).or_default() += 1,
        }
    }

    for (&(teacher, day), by_period) in &teaching {
        for (&period, slots) in by_period {
            if slots.len() > 1 {
                violations.push(Violation::TeacherDoubleBooked {
                    teacher: teacher.to_string(),
                    day,
                    period,
                });
            }
            let Some(rest) = next_rest(period) else {
                continue;
            };
            let Some(after) = by_period.get(&rest) else {
                continue;
            };
            // a lab block running on is still one session
            let continues = matches!(slots.as_slice(), [(_, Cell::Lab(_))]) && after == slots;
            if !continues {
                violations.push(Violation::RestSkipped {
                    teacher: teacher.to_string(),
                    day,
                    period: rest,
                });
            }
        }
    }

    let mut lab_days: BTreeMap<(Year, RequirementId), usize> = BTreeMap::new();
    for (&(year, id, day), periods) in &lab_runs {
        let req = &requirements[id];
        *lab_days.entry((year, id)).or_default() += 1;
        *sessions.entry((year, req.subject.as_str(), day)).or_default() += 1;

        let window = periods
            .first()
            .and_then(|&p| LabWindow::from_start(p))
            .filter(|w| w.periods() == periods.as_slice());
        let valid = window.is_some_and(|w| req.lab.is_some_and(|lab| lab.allows(w)));
        if !valid {
            violations.push(Violation::BrokenLab {
                year,
                subject: req.subject.clone(),
                day,
            });
        }
    }
    for ((year, id), days) in lab_days {
        if days > 1 {
            violations.push(Violation::LabRepeated {
                year,
                subject: requirements[id].subject.clone(),
            });
        }
    }

    for ((year, subject, day), count) in sessions {
        if count > 1 {
            violations.push(Violation::SubjectTwiceInDay {
                year,
                subject: subject.to_string(),
                day,
            });
        }
    }

    for year in grid.years() {
        for day in Day::ALL {
            if !grid.afternoon_gapless(year, day) {
                violations.push(Violation::AfternoonGap { year, day });
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LabComponent, LabPolicy, TheoryComponent};

    fn req(id: usize, teacher: &str, year: Year, subject: &str) -> Requirement {
        Requirement {
            id,
            teacher: teacher.into(),
            year,
            subject: subject.into(),
            hours: 2,
            is_integrated: false,
            is_lab: false,
            is_external_lab: false,
            preferences: Default::default(),
            theory: Some(TheoryComponent { hours: 2 }),
            lab: None,
        }
    }

    fn with_lab(mut r: Requirement, duration: usize, policy: LabPolicy) -> Requirement {
        r.lab = Some(LabComponent { duration, policy });
        r
    }

    #[test]
    fn sound_grid_passes() {
        let reqs = vec![
            req(0, "T1", 1, "Math"),
            with_lab(req(1, "T2", 1, "Chem"), 3, LabPolicy::AfternoonOnly),
        ];
        let mut grid = Grid::new([1]);
        grid.set(1, Day::Mon, 0, Some(Cell::Theory(0)));
        grid.set(1, Day::Mon, 3, Some(Cell::Theory(1)));
        for p in [6, 7, 8] {
            grid.set(1, Day::Tue, p, Some(Cell::Lab(1)));
        }
        grid.fill_tutorials();
        assert!(audit(&grid, &reqs).is_empty());
    }

    #[test]
    fn flags_double_booking_across_years() {
        let reqs = vec![req(0, "T1", 1, "Math"), req(1, "T1", 2, "Physics")];
        let mut grid = Grid::new([1, 2]);
        grid.set(1, Day::Wed, 4, Some(Cell::Theory(0)));
        grid.set(2, Day::Wed, 4, Some(Cell::Theory(1)));
        let violations = audit(&grid, &reqs);
        assert!(violations.contains(&Violation::TeacherDoubleBooked {
            teacher: "T1".into(),
            day: Day::Wed,
            period: 4,
        }));
    }

    #[test]
    fn flags_missing_rest_across_short_break() {
        let reqs = vec![req(0, "T1", 1, "Math"), req(1, "T1", 1, "Physics")];
        let mut grid = Grid::new([1]);
        grid.set(1, Day::Thu, 1, Some(Cell::Theory(0)));
        grid.set(1, Day::Thu, 3, Some(Cell::Theory(1)));
        assert_eq!(
            audit(&grid, &reqs),
            vec![Violation::RestSkipped {
                teacher: "T1".into(),
                day: Day::Thu,
                period: 3,
            }]
        );
    }

    #[test]
    fn flags_lab_outside_its_window() {
        let reqs = vec![with_lab(req(0, "T1", 1, "Chem"), 2, LabPolicy::MorningOrMidday)];
        let mut grid = Grid::new([1]);
        grid.set(1, Day::Fri, 6, Some(Cell::Lab(0)));
        grid.set(1, Day::Fri, 7, Some(Cell::Lab(0)));
        let violations = audit(&grid, &reqs);
        assert!(matches!(violations.as_slice(), [Violation::BrokenLab { .. }]));
    }

    #[test]
    fn flags_subject_twice_in_a_day() {
        let reqs = vec![with_lab(req(0, "T1", 1, "Chem"), 2, LabPolicy::MorningOrMidday)];
        let mut grid = Grid::new([1]);
        grid.set(1, Day::Mon, 0, Some(Cell::Lab(0)));
        grid.set(1, Day::Mon, 1, Some(Cell::Lab(0)));
        grid.set(1, Day::Mon, 6, Some(Cell::Theory(0)));
        let violations = audit(&grid, &reqs);
        assert_eq!(
            violations,
            vec![Violation::SubjectTwiceInDay {
                year: 1,
                subject: "Chem".into(),
                day: Day::Mon,
            }]
        );
    }

    #[test]
    fn flags_afternoon_gap_behind_a_tutorial() {
        let reqs = vec![req(0, "T1", 2, "Math")];
        let mut grid = Grid::new([2]);
        grid.set(2, Day::Tue, 8, Some(Cell::Theory(0)));
        grid.fill_tutorials();
        assert_eq!(audit(&grid, &reqs), vec![Violation::AfternoonGap { year: 2, day: Day::Tue }]);
    }
}
