use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::{serde::rfc3339, Date, OffsetDateTime};

use sync_lib::strava_timezone::StravaTimeZone;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ActivityType {
    Run,
    Ride,
    Walk,
    Hike,
    Swim,
    WeightTraining,
    #[default]
    Other,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_strava_activity())
    }
}

impl From<String> for ActivityType {
    fn from(item: String) -> Self {
        Self::from_strava_activity(&item)
    }
}

impl From<ActivityType> for String {
    fn from(item: ActivityType) -> Self {
        item.to_strava_activity().into()
    }
}

impl ActivityType {
    #[must_use]
    pub fn to_strava_activity(self) -> &'static str {
        match self {
            Self::Run => "Run",
            Self::Ride => "Ride",
            Self::Walk => "Walk",
            Self::Hike => "Hike",
            Self::Swim => "Swim",
            Self::WeightTraining => "WeightTraining",
            Self::Other => "Other",
        }
    }

    /// Anything Strava reports that we don't name explicitly is `Other`.
    #[must_use]
    pub fn from_strava_activity(item: &str) -> Self {
        match item {
            "Run" => Self::Run,
            "Ride" => Self::Ride,
            "Walk" => Self::Walk,
            "Hike" => Self::Hike,
            "Swim" => Self::Swim,
            "WeightTraining" => Self::WeightTraining,
            _ => Self::Other,
        }
    }
}

/// One entry of `GET /athlete/activities`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StravaActivity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(with = "rfc3339")]
    pub start_date: OffsetDateTime,
    /// Wall-clock start time, rendered by Strava with a `Z` suffix.
    #[serde(default, with = "rfc3339::option")]
    pub start_date_local: Option<OffsetDateTime>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: Option<i64>,
    #[serde(default)]
    pub elapsed_time: i64,
}

impl StravaActivity {
    #[must_use]
    pub fn is_run(&self) -> bool {
        self.activity_type == ActivityType::Run
    }

    /// Calendar date the run happened on for the athlete.
    #[must_use]
    pub fn local_date(&self) -> Date {
        if let Some(start_date_local) = self.start_date_local {
            return start_date_local.date();
        }
        if let Some(timezone) = &self.timezone {
            match timezone.parse::<StravaTimeZone>() {
                Ok(tz) => return tz.local_date(self.start_date),
                Err(e) => debug!("activity {} timezone {timezone}: {e}", self.id),
            }
        }
        self.start_date.date()
    }

    /// Seconds used for pace and duration: moving time when Strava has it.
    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        self.moving_time.unwrap_or(self.elapsed_time).max(0)
    }
}
