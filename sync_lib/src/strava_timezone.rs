use smallvec::SmallVec;
use stack_string::format_sstr;
use std::{fmt, str::FromStr};
use time::{Date, OffsetDateTime, UtcOffset};
use time_tz::{timezones::get_by_name, OffsetDateTimeExt, TimeZone, Tz};

use crate::errors::SyncError as Error;

/// Strava reports an athlete timezone as `"(GMT-05:00) America/New_York"`,
/// the fixed offset at upload time followed by the IANA zone name.
#[derive(Debug, PartialEq, Copy, Clone, Eq)]
pub struct StravaTimeZone(UtcOffset, &'static Tz);

impl fmt::Display for StravaTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (h, m, _) = self.0.as_hms();
        write!(
            f,
            "(GMT{s}{h:02}:{m:02}) {t}",
            s = if self.0.is_negative() { '-' } else { '+' },
            h = h.abs(),
            m = m.abs(),
            t = self.1.name(),
        )
    }
}

impl FromStr for StravaTimeZone {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_strava_str(s)
    }
}

impl StravaTimeZone {
    #[must_use]
    pub fn tz(&self) -> &'static Tz {
        self.1
    }

    /// Calendar date of `datetime` as seen on a wall clock in this zone.
    #[must_use]
    pub fn local_date(&self, datetime: OffsetDateTime) -> Date {
        datetime.to_timezone(self.tz()).date()
    }

    /// # Errors
    /// Return error if parsing timezone fails
    pub fn from_strava_str(s: &str) -> Result<Self, Error> {
        let mut offset = None;
        let tz_strs: SmallVec<[&str; 2]> = s.split_whitespace().take(2).collect();
        if let Some(tz) = tz_strs.first() {
            if tz.get(1..=3) != Some("GMT") {
                return Err(Error::CustomError(format_sstr!(
                    "Time string isn't GMT: {tz}"
                )));
            }
            if let Some(hours) = tz.get(4..=6).and_then(|s| s.parse::<i32>().ok()) {
                if let Some(minutes) = tz.get(8..=9).and_then(|s| s.parse::<i32>().ok()) {
                    let minutes = if hours < 0 { -minutes } else { minutes };
                    offset.replace(
                        UtcOffset::from_whole_seconds(hours * 3600 + minutes * 60)
                            .unwrap_or(UtcOffset::UTC),
                    );
                }
            }
        }
        if let Some(tz) = tz_strs.get(1) {
            let tz = get_by_name(tz)
                .ok_or_else(|| Error::CustomError(format_sstr!("{tz} is not a valid timezone")))?;
            let offset = offset.ok_or_else(|| Error::StaticCustomError("Bad offset"))?;
            Ok(Self(offset, tz))
        } else {
            Err(Error::StaticCustomError("Bad Timezone String"))
        }
    }
}
