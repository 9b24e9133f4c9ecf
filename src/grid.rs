use crate::data::{Requirement, RequirementId, Year};
use crate::geometry::{AFTERNOON_PERIODS, DAY_COUNT, Day, PERIOD_COUNT, Period, TEACHING_PERIODS};
use std::collections::BTreeMap;

/// What sits in one (year, day, period) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Theory(RequirementId),
    Lab(RequirementId),
    Tutorial,
}

impl Cell {
    pub fn requirement(self) -> Option<RequirementId> {
        match self {
            Cell::Theory(id) | Cell::Lab(id) => Some(id),
            Cell::Tutorial => None,
        }
    }
}

type YearRows = [[Option<Cell>; PERIOD_COUNT]; DAY_COUNT];

/// Per-year weekly grid with typed cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    years: BTreeMap<Year, YearRows>,
}

impl Grid {
    pub fn new(years: impl IntoIterator<Item = Year>) -> Self {
        Self {
            years: years
                .into_iter()
                .map(|y| (y, [[None; PERIOD_COUNT]; DAY_COUNT]))
                .collect(),
        }
    }

    /// An empty grid with a row set for every year that appears in `requirements`.
    pub fn for_requirements(requirements: &[Requirement]) -> Self {
        Self::new(requirements.iter().map(|r| r.year))
    }

    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        self.years.keys().copied()
    }

    pub fn get(&self, year: Year, day: Day, period: Period) -> Option<Cell> {
        self.years
            .get(&year)
            .and_then(|rows| rows[day.index()].get(period).copied().flatten())
    }

    pub fn set(&mut self, year: Year, day: Day, period: Period, cell: Option<Cell>) {
        let rows = self
            .years
            .entry(year)
            .or_insert([[None; PERIOD_COUNT]; DAY_COUNT]);
        rows[day.index()][period] = cell;
    }

    /// Empty or holding the `Tutorial` placeholder.
    pub fn is_vacant(&self, year: Year, day: Day, period: Period) -> bool {
        matches!(self.get(year, day, period), None | Some(Cell::Tutorial))
    }

    /// A cell with a real session (theory or lab).
    pub fn is_taught(&self, year: Year, day: Day, period: Period) -> bool {
        self.get(year, day, period)
            .and_then(Cell::requirement)
            .is_some()
    }

    /// A real session may sit at `period` only when every earlier afternoon
    /// period of that day is taught. Always true outside the afternoon.
    pub fn afternoon_open(&self, year: Year, day: Day, period: Period) -> bool {
        AFTERNOON_PERIODS
            .iter()
            .take_while(|&&p| p < period)
            .all(|&p| self.is_taught(year, day, p))
    }

    /// The taught afternoon periods of a day form a prefix of the block.
    pub fn afternoon_gapless(&self, year: Year, day: Day) -> bool {
        AFTERNOON_PERIODS
            .iter()
            .all(|&p| !self.is_taught(year, day, p) || self.afternoon_open(year, day, p))
    }

    pub fn fill_tutorials(&mut self) {
        for rows in self.years.values_mut() {
            for row in rows.iter_mut() {
                for p in TEACHING_PERIODS {
                    if row[p].is_none() {
                        row[p] = Some(Cell::Tutorial);
                    }
                }
            }
        }
    }

    /// Number of theory cells a requirement holds in its year.
    pub fn theory_count(&self, year: Year, id: RequirementId) -> usize {
        self.cells_of(year)
            .filter(|(_, _, cell)| *cell == Cell::Theory(id))
            .count()
    }

    /// Real sessions (theory or lab periods) on one day of a year.
    pub fn day_load(&self, year: Year, day: Day) -> usize {
        TEACHING_PERIODS
            .iter()
            .filter(|&&p| self.is_taught(year, day, p))
            .count()
    }

    /// Every non-empty cell of a year, in day then period order.
    pub fn cells_of(&self, year: Year) -> impl Iterator<Item = (Day, Period, Cell)> + '_ {
        self.years.get(&year).into_iter().flat_map(|rows| {
            Day::ALL.into_iter().flat_map(move |day| {
                rows[day.index()]
                    .iter()
                    .enumerate()
                    .filter_map(move |(p, cell)| cell.map(|c| (day, p, c)))
            })
        })
    }

    /// Every non-empty cell of the grid.
    pub fn cells(&self) -> impl Iterator<Item = (Year, Day, Period, Cell)> + '_ {
        self.years()
            .flat_map(move |y| self.cells_of(y).map(move |(d, p, c)| (y, d, p, c)))
    }
}
