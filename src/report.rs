//! Turns a typed grid into the labelled output tables.

use crate::data::{Requirement, SemesterType, TeacherId, Timetable, Unallocated, Year};
use crate::geometry::{Day, PERIOD_COUNT, is_teaching};
use crate::grid::{Cell, Grid};
use std::collections::BTreeMap;

pub const TUTORIAL_LABEL: &str = "Tutorial";

/// Full timetable: every year, every teaching period labelled.
pub fn render(grid: &Grid, requirements: &[Requirement]) -> Timetable {
    render_filtered(grid, requirements, None)
}

/// The same layout restricted to one teacher's sessions. Tutorials and other
/// teachers' cells come out empty.
pub fn teacher_timetable(grid: &Grid, requirements: &[Requirement], teacher: &str) -> Timetable {
    render_filtered(grid, requirements, Some(teacher))
}

fn render_filtered(grid: &Grid, requirements: &[Requirement], teacher: Option<&str>) -> Timetable {
    let keep = |id: usize| {
        requirements
            .get(id)
            .filter(|r| teacher.is_none_or(|t| r.teacher == t))
    };

    let mut timetable = Timetable::new();
    for year in grid.years() {
        let days = timetable.entry(year).or_default();
        for day in Day::ALL {
            let row = (0..PERIOD_COUNT)
                .map(|p| {
                    if !is_teaching(p) {
                        return None;
                    }
                    match grid.get(year, day, p)? {
                        Cell::Theory(id) => keep(id).map(|r| r.subject.clone()),
                        Cell::Lab(id) => keep(id).map(Requirement::lab_label),
                        Cell::Tutorial => teacher.is_none().then(|| TUTORIAL_LABEL.to_string()),
                    }
                })
                .collect();
            days.insert(day, row);
        }
    }
    timetable
}

/// Shortfall per requirement, read back from the grid itself.
pub fn unallocated(grid: &Grid, requirements: &[Requirement]) -> Vec<Unallocated> {
    requirements
        .iter()
        .filter_map(|req| {
            let placed = u32::try_from(grid.theory_count(req.year, req.id)).unwrap_or(u32::MAX);
            let theory_remaining = req.theory_hours().saturating_sub(placed);
            let lab_placed = grid
                .cells_of(req.year)
                .any(|(_, _, cell)| cell == Cell::Lab(req.id));
            let lab_needed = req.lab.is_some() && !lab_placed;
            let lab_length = req.lab.map_or(0, |lab| lab.duration as u32);
            if theory_remaining == 0 && !lab_needed {
                return None;
            }
            Some(Unallocated {
                subject: req.subject.clone(),
                teacher: req.teacher.clone(),
                year: req.year,
                theory_remaining,
                lab_remaining: if lab_needed { lab_length } else { 0 },
                lab_needed,
                is_integrated: req.is_integrated,
                is_external_lab: req.is_external_lab,
                lab_length,
            })
        })
        .collect()
}

/// Subjects per teacher, in first-seen order.
pub fn teacher_subjects(requirements: &[Requirement]) -> BTreeMap<TeacherId, Vec<String>> {
    let mut map: BTreeMap<TeacherId, Vec<String>> = BTreeMap::new();
    for req in requirements {
        let subjects = map.entry(req.teacher.clone()).or_default();
        if !subjects.contains(&req.subject) {
            subjects.push(req.subject.clone());
        }
    }
    map
}

/// Semester shown next to each year: odd terms run 3/5/7, even terms 4/6/8.
pub fn semester_label(year: Year, semester: SemesterType) -> String {
    let offset = match semester {
        SemesterType::Odd => 1,
        SemesterType::Even => 2,
    };
    format!("Semester {}", u32::from(year) * 2 + offset)
}

pub fn year_labels(years: impl IntoIterator<Item = Year>, semester: SemesterType) -> BTreeMap<Year, String> {
    years
        .into_iter()
        .map(|y| (y, semester_label(y, semester)))
        .collect()
}
