use serde_json::{Value, json};
use std::time::Duration;
use timetable_allocator::allocator::{Allocation, Allocator, ExactAllocator, GreedyAllocator};
use timetable_allocator::audit::audit;
use timetable_allocator::data::{RawEntry, Requirement};
use timetable_allocator::geometry::{Day, LabWindow, MORNING_PERIODS};
use timetable_allocator::grid::Cell;
use timetable_allocator::heuristic::GreedyOptions;
use timetable_allocator::model::{ModelOptions, PreferenceMode};
use timetable_allocator::normalize::normalize;

fn raw(value: Value) -> Vec<RawEntry> {
    serde_json::from_value(value).unwrap()
}

/// Two cohorts sharing teachers, with every lab flavour and a preference.
fn department() -> Vec<Requirement> {
    normalize(&raw(json!([
        {"teacher": "Iyer", "year": 1, "subject": "Math", "hours": 4},
        {"teacher": "Rao", "year": 1, "subject": "Networks", "hours": 3, "is_integrated": true},
        {"teacher": "Das", "year": 1, "subject": "Chemistry", "hours": 2,
         "is_integrated": true, "is_external_lab": true},
        {"teacher": "Iyer", "year": 2, "subject": "Stats", "hours": 3},
        {"teacher": "Rao", "year": 2, "subject": "DBMS", "hours": 2, "is_lab": true, "theory_hours": 1},
        {"teacher": "Menon", "year": 2, "subject": "Physics", "hours": 4, "preferences": {"Tue": 3}}
    ])))
}

/// Three cohorts of six subjects each; every teacher takes one subject per year.
fn crowded_department() -> Vec<Requirement> {
    let hours = [4, 4, 3, 3, 3, 2];
    let entries: Vec<Value> = (1..=3)
        .flat_map(|year| {
            hours.iter().enumerate().map(move |(i, h)| {
                json!({
                    "teacher": format!("T{}", (i + year) % hours.len()),
                    "year": year,
                    "subject": format!("S{i}"),
                    "hours": h
                })
            })
        })
        .collect();
    normalize(&raw(Value::Array(entries)))
}

/// Three full-week subjects: exactly enough to cover every morning slot.
fn morning_filling() -> Vec<Requirement> {
    normalize(&raw(json!([
        {"teacher": "A", "year": 3, "subject": "Algebra", "hours": 5},
        {"teacher": "B", "year": 3, "subject": "Botany", "hours": 5},
        {"teacher": "C", "year": 3, "subject": "Civics", "hours": 5}
    ])))
}

fn greedy() -> GreedyAllocator {
    GreedyAllocator {
        options: GreedyOptions::default(),
        post_process: true,
    }
}

fn exact(morning_coverage: bool) -> ExactAllocator {
    ExactAllocator {
        options: ModelOptions {
            preference_mode: PreferenceMode::Soft,
            morning_coverage,
        },
        time_limit: Duration::from_secs(30),
        post_process: true,
    }
}

fn assert_sound(allocation: &Allocation, reqs: &[Requirement]) {
    let violations = audit(&allocation.grid, reqs);
    assert!(violations.is_empty(), "{violations:?}");

    assert_afternoon_prefix(allocation);

    for req in reqs {
        let lab_cells: Vec<_> = allocation
            .grid
            .cells_of(req.year)
            .filter(|(_, _, c)| *c == Cell::Lab(req.id))
            .collect();
        let Some(lab) = req.lab else {
            assert!(lab_cells.is_empty());
            continue;
        };
        if lab_cells.is_empty() {
            continue;
        }
        assert_eq!(lab_cells.len(), lab.duration);
        let periods: Vec<usize> = lab_cells.iter().map(|(_, p, _)| *p).collect();
        assert!(
            LabWindow::ALL
                .iter()
                .any(|w| w.periods() == periods.as_slice() && lab.allows(*w)),
            "{} lab at {periods:?}",
            req.subject
        );
    }
}

/// No real session sits behind an afternoon period without one.
fn assert_afternoon_prefix(allocation: &Allocation) {
    let occupied = |year, day, p| allocation.grid.is_taught(year, day, p);
    for year in allocation.grid.years() {
        for day in Day::ALL {
            assert!(!occupied(year, day, 8) || occupied(year, day, 7), "Y{year} {day}: 8 without 7");
            assert!(!occupied(year, day, 7) || occupied(year, day, 6), "Y{year} {day}: 7 without 6");
        }
    }
}

fn assert_accounted(allocation: &Allocation, reqs: &[Requirement]) {
    for req in reqs {
        let remaining = allocation
            .unallocated
            .iter()
            .find(|u| u.subject == req.subject && u.year == req.year)
            .map_or(0, |u| u.theory_remaining);
        assert_eq!(
            allocation.grid.theory_count(req.year, req.id) as u32 + remaining,
            req.theory_hours(),
            "{}",
            req.subject
        );
    }
}

#[test]
fn heuristic_grid_keeps_hard_rules() {
    let reqs = department();
    let allocation = greedy().allocate(&reqs).unwrap();
    assert_sound(&allocation, &reqs);
    assert_accounted(&allocation, &reqs);
}

#[test]
fn crowded_heuristic_grid_keeps_afternoons_gapless() {
    let reqs = crowded_department();
    let allocation = greedy().allocate(&reqs).unwrap();
    assert_sound(&allocation, &reqs);
    assert_accounted(&allocation, &reqs);
}

#[test]
fn exact_grid_keeps_hard_rules_and_places_everything() {
    let reqs = department();
    let allocation = exact(false).allocate(&reqs).unwrap();
    assert_sound(&allocation, &reqs);
    assert!(allocation.unallocated.is_empty(), "{:?}", allocation.unallocated);
}

#[test]
fn exact_covers_every_morning_slot() {
    let reqs = morning_filling();
    let allocation = exact(true).allocate(&reqs).unwrap();
    assert_sound(&allocation, &reqs);
    for day in Day::ALL {
        for p in MORNING_PERIODS {
            assert!(allocation.grid.is_taught(3, day, p), "{day} p{p} is empty");
        }
    }
}

#[test]
fn greedy_runs_are_deterministic() {
    let reqs = department();
    let first = greedy().allocate(&reqs).unwrap();
    let second = greedy().allocate(&reqs).unwrap();
    assert_eq!(first.grid, second.grid);
}

#[test]
fn normalization_is_idempotent() {
    let entries = raw(json!([
        {"teacher": " Rao ", "year": "2", "subject": "DBMS", "hours": "3.0", "is_lab": "yes"},
        {"year": 9, "hours": -1, "preferences": "{\"monday\": \"4\"}"}
    ]));
    assert_eq!(normalize(&entries), normalize(&entries));
}
