use log::{debug, info};
use smallvec::{smallvec, SmallVec};
use stack_string::{format_sstr, StackString};
use std::{
    collections::{btree_map::Entry, BTreeMap, BTreeSet},
    fmt,
};
use time::Date;

use sync_lib::{
    sync_config::{DistanceUnit, SameDayPolicy},
    sync_util::{format_duration, format_pace, round_to_hundredths},
};

use crate::strava_activity::StravaActivity;

/// A run reduced to what the training log records.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRun {
    pub date: Date,
    /// Distance in `unit`, rounded to two decimals.
    pub distance: f64,
    pub unit: DistanceUnit,
    /// `None` when there was no distance to compute a pace from.
    pub pace: Option<StackString>,
    pub duration: StackString,
    pub name: StackString,
    pub meters: f64,
    pub seconds: i64,
    pub activity_ids: SmallVec<[i64; 2]>,
}

impl NormalizedRun {
    #[must_use]
    pub fn from_totals(
        date: Date,
        meters: f64,
        seconds: i64,
        name: StackString,
        unit: DistanceUnit,
    ) -> Self {
        let meters = meters.max(0.0);
        let distance_in_unit = meters / unit.meters_per_unit();
        Self {
            date,
            distance: round_to_hundredths(distance_in_unit),
            unit,
            pace: format_pace(seconds, distance_in_unit),
            duration: format_duration(seconds),
            name,
            meters,
            seconds,
            activity_ids: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn from_activity(activity: &StravaActivity, unit: DistanceUnit) -> Self {
        Self {
            activity_ids: smallvec![activity.id],
            ..Self::from_totals(
                activity.local_date(),
                activity.distance,
                activity.duration_seconds(),
                activity.name.trim().into(),
                unit,
            )
        }
    }

    /// Fold another run on the same date into this one.
    #[must_use]
    pub fn combined_with(&self, other: &Self) -> Self {
        let name = match (self.name.is_empty(), other.name.is_empty()) {
            (_, true) => self.name.clone(),
            (true, false) => other.name.clone(),
            (false, false) => format_sstr!("{} + {}", self.name, other.name),
        };
        let mut activity_ids = self.activity_ids.clone();
        activity_ids.extend_from_slice(&other.activity_ids);
        Self {
            activity_ids,
            ..Self::from_totals(
                self.date,
                self.meters + other.meters,
                self.seconds + other.seconds,
                name,
                self.unit,
            )
        }
    }
}

impl fmt::Display for NormalizedRun {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{d}  |  {dist:.2} {u}  |  {p}  |  {dur}  |  {n}",
            d = self.date,
            dist = self.distance,
            u = self.unit.label(),
            p = self.pace.as_ref().map_or("-", StackString::as_str),
            dur = self.duration,
            n = self.name,
        )
    }
}

/// Runs keyed by calendar date, plus what was dropped on the way in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRuns {
    pub runs: BTreeMap<Date, NormalizedRun>,
    /// Activities dropped because they weren't runs.
    pub activities_filtered: usize,
    /// Runs that landed on a date already holding another run.
    pub same_day_collisions: usize,
}

impl NormalizedRuns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collision rule is applied here, on insert, so the result never
    /// depends on map iteration order.
    pub fn insert(&mut self, run: NormalizedRun, policy: SameDayPolicy) {
        match self.runs.entry(run.date) {
            Entry::Vacant(entry) => {
                entry.insert(run);
            }
            Entry::Occupied(mut entry) => {
                self.same_day_collisions += 1;
                let merged = match policy {
                    SameDayPolicy::LastWins => {
                        info!(
                            "{}: keeping {:?} over earlier run {:?}",
                            run.date,
                            run.name,
                            entry.get().name
                        );
                        run
                    }
                    SameDayPolicy::Sum => {
                        info!("{}: adding {:?} to {:?}", run.date, run.name, entry.get().name);
                        entry.get().combined_with(&run)
                    }
                };
                entry.insert(merged);
            }
        }
    }

    #[must_use]
    pub fn get(&self, date: &Date) -> Option<&NormalizedRun> {
        self.runs.get(date)
    }

    #[must_use]
    pub fn dates(&self) -> BTreeSet<Date> {
        self.runs.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedRun> {
        self.runs.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Normalize with the default same-day rule: the later run in feed order
/// wins.
#[must_use]
pub fn normalize(activities: &[StravaActivity], unit: DistanceUnit) -> NormalizedRuns {
    normalize_with_policy(activities, unit, SameDayPolicy::LastWins)
}

#[must_use]
pub fn normalize_with_policy(
    activities: &[StravaActivity],
    unit: DistanceUnit,
    policy: SameDayPolicy,
) -> NormalizedRuns {
    let mut runs = NormalizedRuns::new();
    for activity in activities {
        if !activity.is_run() {
            debug!(
                "skipping {} {} {:?}",
                activity.id, activity.activity_type, activity.name
            );
            runs.activities_filtered += 1;
            continue;
        }
        runs.insert(NormalizedRun::from_activity(activity, unit), policy);
    }
    runs
}
