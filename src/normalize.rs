//! Turns loose upstream entries into typed [`Requirement`]s.
//!
//! Never rejects a batch: each field is coerced to a safe default and the
//! coercion is logged.

use crate::data::{LabComponent, LabPolicy, RawEntry, Requirement, TheoryComponent, Year};
use crate::geometry::{Day, Period, is_teaching};
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_TEACHER: &str = "Unassigned";
const MIN_YEAR: Year = 1;
const MAX_YEAR: Year = 3;

pub fn normalize(entries: &[RawEntry]) -> Vec<Requirement> {
    entries
        .iter()
        .enumerate()
        .map(|(id, entry)| normalize_entry(id, entry))
        .collect()
}

fn normalize_entry(id: usize, entry: &RawEntry) -> Requirement {
    let teacher = coerce_text(&entry.teacher).unwrap_or_else(|| {
        warn!("entry {id}: missing teacher, using '{DEFAULT_TEACHER}'");
        DEFAULT_TEACHER.to_string()
    });
    let year = coerce_year(id, &entry.year);
    let subject = coerce_text(&entry.subject).unwrap_or_else(|| format!("{teacher}-Y{year}"));
    let hours = coerce_count(id, "hours", &entry.hours);
    let theory_hours = coerce_count(id, "theory_hours", &entry.theory_hours);
    let is_integrated = coerce_flag(&entry.is_integrated);
    let is_lab = coerce_flag(&entry.is_lab);
    let is_external_lab = coerce_flag(&entry.is_external_lab);
    let preferences = coerce_preferences(id, &entry.preferences);

    let (theory, lab) = decompose(hours, theory_hours, is_integrated, is_lab, is_external_lab);
    debug!(
        "entry {id}: {teacher}/Y{year}/{subject} -> theory {:?}, lab {:?}",
        theory.map(|t| t.hours),
        lab.map(|l| l.duration)
    );

    Requirement {
        id,
        teacher,
        year,
        subject,
        hours,
        is_integrated,
        is_lab,
        is_external_lab,
        preferences,
        theory,
        lab,
    }
}

/// Splits one entry into its theory and lab parts.
///
/// Lab time never draws from the theory hour budget: an integrated subject
/// keeps all of `hours` as theory and gets its lab on top.
pub fn decompose(
    hours: u32,
    theory_hours: u32,
    is_integrated: bool,
    is_lab: bool,
    is_external_lab: bool,
) -> (Option<TheoryComponent>, Option<LabComponent>) {
    let duration = if is_external_lab { 3 } else { 2 };
    let theory = |h: u32| (h > 0).then_some(TheoryComponent { hours: h });

    if is_integrated {
        let policy = if is_external_lab {
            LabPolicy::AfternoonOnly
        } else {
            LabPolicy::MorningOrMidday
        };
        (theory(hours), Some(LabComponent { duration, policy }))
    } else if is_lab || is_external_lab {
        (theory(theory_hours), Some(LabComponent { duration, policy: LabPolicy::Any }))
    } else {
        (theory(hours), None)
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn coerce_year(id: usize, value: &Value) -> Year {
    let parsed = match value {
        Value::Null => return MIN_YEAR,
        Value::Number(n) => n.as_i64().or_else(|| whole(n.as_f64()?)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| whole(s.parse::<f64>().ok()?))
        }
        _ => None,
    };
    match parsed {
        Some(y) if (i64::from(MIN_YEAR)..=i64::from(MAX_YEAR)).contains(&y) => y as Year,
        Some(y) => {
            let clamped = y.clamp(i64::from(MIN_YEAR), i64::from(MAX_YEAR)) as Year;
            warn!("entry {id}: year {y} out of range, clamped to {clamped}");
            clamped
        }
        None => {
            warn!("entry {id}: unreadable year {value}, defaulting to {MIN_YEAR}");
            MIN_YEAR
        }
    }
}

/// `2.0` reads as 2; `2.5` is not a year.
fn whole(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

fn coerce_count(id: usize, field: &str, value: &Value) -> u32 {
    let parsed = match value {
        Value::Null => return 0,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return 0,
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(h) if h.is_finite() && h >= 0.0 => h.floor().min(f64::from(u32::MAX)) as u32,
        _ => {
            warn!("entry {id}: {field} {value} is not a non-negative number, using 0");
            0
        }
    }
}

fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "on" | "yes" | "1"
        ),
        _ => false,
    }
}

fn coerce_preferences(id: usize, value: &Value) -> BTreeMap<Day, Period> {
    let map = match value {
        Value::Object(map) => map.clone(),
        // Older clients send the map JSON-encoded inside a string.
        Value::String(s) if s.trim().is_empty() => return BTreeMap::new(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!("entry {id}: unreadable preference string, ignoring");
                return BTreeMap::new();
            }
        },
        _ => return BTreeMap::new(),
    };

    let mut prefs = BTreeMap::new();
    for (key, raw) in &map {
        let Some(day) = Day::parse(key) else {
            warn!("entry {id}: unknown preference day '{key}'");
            continue;
        };
        let period = match raw {
            Value::Number(n) => n.as_u64().map(|p| p as Period),
            Value::String(s) => s.trim().parse::<Period>().ok(),
            _ => None,
        };
        match period {
            Some(p) if is_teaching(p) => {
                prefs.insert(day, p);
            }
            // An empty value means "no preference for this day".
            None if raw.is_null() || raw.as_str().is_some_and(|s| s.trim().is_empty()) => {}
            _ => warn!("entry {id}: preference {key}={raw} is not a teaching period"),
        }
    }
    prefs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn integrated_keeps_theory_hours_and_adds_lab() {
        let reqs = normalize(&[raw(json!({
            "teacher": "T1", "year": 1, "subject": "DBMS", "hours": 3, "is_integrated": true
        }))]);
        let r = &reqs[0];
        assert_eq!(r.theory, Some(TheoryComponent { hours: 3 }));
        assert_eq!(
            r.lab,
            Some(LabComponent { duration: 2, policy: LabPolicy::MorningOrMidday })
        );
    }

    #[test]
    fn integrated_external_gets_afternoon_block() {
        let (theory, lab) = decompose(3, 0, true, false, true);
        assert_eq!(theory, Some(TheoryComponent { hours: 3 }));
        assert_eq!(lab, Some(LabComponent { duration: 3, policy: LabPolicy::AfternoonOnly }));
    }

    #[test]
    fn integrated_lab_exists_without_theory_hours() {
        let (theory, lab) = decompose(0, 0, true, false, false);
        assert_eq!(theory, None);
        assert!(lab.is_some());
    }

    #[test]
    fn lab_only_ignores_raw_hours_unless_theory_hours_given() {
        assert_eq!(decompose(4, 0, false, true, false).0, None);
        assert_eq!(
            decompose(4, 2, false, true, false).0,
            Some(TheoryComponent { hours: 2 })
        );
        let (_, lab) = decompose(0, 0, false, false, true);
        assert_eq!(lab, Some(LabComponent { duration: 3, policy: LabPolicy::Any }));
    }

    #[test]
    fn plain_theory_has_no_lab() {
        assert_eq!(
            decompose(4, 0, false, false, false),
            (Some(TheoryComponent { hours: 4 }), None)
        );
        assert_eq!(decompose(0, 0, false, false, false), (None, None));
    }

    #[test]
    fn garbled_fields_fall_back_to_defaults() {
        let reqs = normalize(&[raw(json!({
            "year": "seven",
            "hours": "lots",
            "is_lab": "on",
            "preferences": "not json"
        }))]);
        let r = &reqs[0];
        assert_eq!(r.teacher, DEFAULT_TEACHER);
        assert_eq!(r.year, 1);
        assert_eq!(r.subject, "Unassigned-Y1");
        assert_eq!(r.hours, 0);
        assert!(r.is_lab);
        assert!(r.preferences.is_empty());
    }

    #[test]
    fn whole_float_years_are_read_as_integers() {
        let reqs = normalize(&[
            raw(json!({"teacher": "T", "year": 2.0, "hours": 1})),
            raw(json!({"teacher": "T", "year": "3.0", "hours": 1})),
            raw(json!({"teacher": "T", "year": 2.5, "hours": 1})),
        ]);
        let years: Vec<Year> = reqs.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2, 3, MIN_YEAR]);
    }

    #[test]
    fn out_of_range_year_is_clamped() {
        let reqs = normalize(&[raw(json!({"teacher": "T", "year": 9, "hours": 1}))]);
        assert_eq!(reqs[0].year, 3);
    }

    #[test]
    fn preferences_accept_strings_and_drop_breaks() {
        let reqs = normalize(&[raw(json!({
            "teacher": "T", "year": 2, "subject": "OS", "hours": 3,
            "day_time_prefs": "{\"Mon\": \"0\", \"wednesday\": 3, \"Thu\": \"2\", \"Fri\": \"\"}"
        }))]);
        let prefs = &reqs[0].preferences;
        assert_eq!(prefs.get(&Day::Mon), Some(&0));
        assert_eq!(prefs.get(&Day::Wed), Some(&3));
        assert!(!prefs.contains_key(&Day::Thu));
        assert!(!prefs.contains_key(&Day::Fri));
    }

    #[test]
    fn normalization_is_idempotent() {
        let input = vec![
            raw(json!({"teacher": "A", "year": 1, "subject": "X", "hours": 4,
                       "preferences": {"Tue": 1}})),
            raw(json!({"teacher": "B", "year": "2", "subject": "Y", "hours": "3.0",
                       "is_integrated": true, "is_external_lab": 1})),
        ];
        assert_eq!(normalize(&input), normalize(&input));
    }
}
