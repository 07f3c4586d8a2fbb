use serde::{Deserialize, Serialize};
use stack_string::{format_sstr, StackString};
use std::{
    collections::HashSet,
    fmt,
    ops::Deref,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::{errors::SyncError as Error, sync_util::METERS_PER_MILE};

/// Unit that distances (and therefore paces) are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
}

impl DistanceUnit {
    #[must_use]
    pub fn meters_per_unit(self) -> f64 {
        match self {
            Self::Miles => METERS_PER_MILE,
            Self::Kilometers => 1000.0,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Miles => "mi",
            Self::Kilometers => "km",
        }
    }

    #[must_use]
    pub fn to_str(self) -> &'static str {
        match self {
            Self::Miles => "miles",
            Self::Kilometers => "km",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl FromStr for DistanceUnit {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "miles" | "mile" | "mi" => Ok(Self::Miles),
            "km" | "kilometers" | "kilometres" => Ok(Self::Kilometers),
            _ => Err(Error::ConfigError(format_sstr!(
                "UNITS must be miles or km, got {s}"
            ))),
        }
    }
}

impl TryFrom<String> for DistanceUnit {
    type Error = Error;
    fn try_from(item: String) -> Result<Self, Self::Error> {
        item.parse()
    }
}

impl From<DistanceUnit> for String {
    fn from(item: DistanceUnit) -> Self {
        item.to_str().into()
    }
}

/// What to do when more than one run lands on the same calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SameDayPolicy {
    /// The later activity in feed order replaces the earlier one.
    #[default]
    LastWins,
    /// Distances and times are added together.
    Sum,
}

impl SameDayPolicy {
    #[must_use]
    pub fn to_str(self) -> &'static str {
        match self {
            Self::LastWins => "last",
            Self::Sum => "sum",
        }
    }
}

impl FromStr for SameDayPolicy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "last" | "last_wins" => Ok(Self::LastWins),
            "sum" => Ok(Self::Sum),
            _ => Err(Error::ConfigError(format_sstr!(
                "SAME_DAY_POLICY must be last or sum, got {s}"
            ))),
        }
    }
}

impl TryFrom<String> for SameDayPolicy {
    type Error = Error;
    fn try_from(item: String) -> Result<Self, Self::Error> {
        item.parse()
    }
}

impl From<SameDayPolicy> for String {
    fn from(item: SameDayPolicy) -> Self {
        item.to_str().into()
    }
}

/// 1-indexed destination columns. The date column is only ever read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub date: usize,
    pub distance: usize,
    pub pace: usize,
    pub duration: Option<usize>,
    pub notes: Option<usize>,
}

impl ColumnMapping {
    /// # Errors
    /// Return error if a mandatory column is missing, a column is zero, a
    /// write column overlaps the date column or two roles share a column
    pub fn new(
        date: usize,
        distance: Option<usize>,
        pace: Option<usize>,
        duration: Option<usize>,
        notes: Option<usize>,
    ) -> Result<Self, Error> {
        let distance =
            distance.ok_or_else(|| Error::ConfigError("DISTANCE_COLUMN is required".into()))?;
        let pace = pace.ok_or_else(|| Error::ConfigError("PACE_COLUMN is required".into()))?;

        let roles = [
            ("DATE_COLUMN", Some(date)),
            ("DISTANCE_COLUMN", Some(distance)),
            ("PACE_COLUMN", Some(pace)),
            ("DURATION_COLUMN", duration),
            ("NOTES_COLUMN", notes),
        ];
        let mut seen = HashSet::new();
        for (name, column) in roles {
            let Some(column) = column else {
                continue;
            };
            if column == 0 {
                return Err(Error::ConfigError(format_sstr!(
                    "{name} is 1-indexed, 0 is not a column"
                )));
            }
            if !seen.insert(column) {
                return Err(Error::ConfigError(format_sstr!(
                    "{name} ({column}) is already used by another column"
                )));
            }
        }
        Ok(Self {
            date,
            distance,
            pace,
            duration,
            notes,
        })
    }
}

/// Spreadsheet and tab that a run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: StackString,
    pub sheet_name: StackString,
}

/// `SyncConfig` holds configuration information which can be set either
/// through environment variables or the config.env file, see the dotenvy
/// crate for more information about the config file format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfigInner {
    #[serde(default)]
    pub strava_client_id: String,
    #[serde(default)]
    pub strava_client_secret: String,
    #[serde(default = "default_strava_tokenfile")]
    pub strava_tokenfile: PathBuf,
    #[serde(default = "default_callback_port")]
    pub strava_callback_port: u16,
    #[serde(default)]
    pub google_service_account_json: PathBuf,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default)]
    pub units: DistanceUnit,
    #[serde(default = "default_date_column")]
    pub date_column: usize,
    pub distance_column: Option<usize>,
    pub pace_column: Option<usize>,
    pub duration_column: Option<usize>,
    pub notes_column: Option<usize>,
    #[serde(default)]
    pub header_rows: u32,
    #[serde(default)]
    pub same_day_policy: SameDayPolicy,
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| Path::new("/tmp").to_path_buf())
}

fn default_strava_tokenfile() -> PathBuf {
    default_home_dir().join(".strava_sheets_sync_tokens")
}

fn default_callback_port() -> u16 {
    8089
}

fn default_sheet_name() -> String {
    "Sheet1".into()
}

fn default_date_column() -> usize {
    1
}

impl Default for SyncConfigInner {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConfigInner {
    /// Some variables have natural default values, which we set in the new()
    /// method.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strava_client_id: String::new(),
            strava_client_secret: String::new(),
            strava_tokenfile: default_strava_tokenfile(),
            strava_callback_port: default_callback_port(),
            google_service_account_json: PathBuf::new(),
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            units: DistanceUnit::default(),
            date_column: default_date_column(),
            distance_column: None,
            pace_column: None,
            duration_column: None,
            notes_column: None,
            header_rows: 0,
            same_day_policy: SameDayPolicy::default(),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct SyncConfig(Arc<SyncConfigInner>);

impl From<SyncConfigInner> for SyncConfig {
    fn from(item: SyncConfigInner) -> Self {
        Self(Arc::new(item))
    }
}

impl SyncConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull configuration from a file if it exists,
    /// first look for a config.env file in the current directory,
    /// then try `${HOME}/.config/strava_sheets_sync/config.env`,
    /// if that doesn't exist fall back on the default behaviour of dotenvy
    ///
    /// # Errors
    /// Return error if the environment can't be deserialized or no Strava
    /// client id is set
    pub fn get_config(fname: Option<&Path>) -> Result<Self, Error> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::StaticCustomError("No CONFIG directory"))?;
        let default_fname = config_dir.join("strava_sheets_sync").join("config.env");

        let env_file = match fname {
            Some(fname) if fname.exists() => fname,
            _ => &default_fname,
        };

        dotenvy::dotenv().ok();

        if env_file.exists() {
            dotenvy::from_path(env_file).ok();
        } else if Path::new("config.env").exists() {
            dotenvy::from_filename("config.env").ok();
        }

        let conf: SyncConfigInner = envy::from_env()?;

        if conf.strava_client_id.is_empty() {
            Err(Error::ConfigError("No STRAVA_CLIENT_ID specified".into()))
        } else {
            Ok(Self(Arc::new(conf)))
        }
    }

    /// # Errors
    /// Return error if the column configuration is invalid
    pub fn column_mapping(&self) -> Result<ColumnMapping, Error> {
        ColumnMapping::new(
            self.date_column,
            self.distance_column,
            self.pace_column,
            self.duration_column,
            self.notes_column,
        )
    }

    /// Sheet row holding the first date, just below the header rows.
    ///
    /// # Errors
    /// Return error if `HEADER_ROWS` leaves no room for data
    pub fn first_data_row(&self) -> Result<u32, Error> {
        self.header_rows
            .checked_add(1)
            .ok_or_else(|| {
                Error::ConfigError(format_sstr!("HEADER_ROWS {} is too large", self.header_rows))
            })
    }

    /// # Errors
    /// Return error if no spreadsheet is configured
    pub fn sheet_target(&self) -> Result<SheetTarget, Error> {
        if self.spreadsheet_id.is_empty() {
            return Err(Error::ConfigError("No SPREADSHEET_ID specified".into()));
        }
        if self.sheet_name.is_empty() {
            return Err(Error::ConfigError("SHEET_NAME is empty".into()));
        }
        Ok(SheetTarget {
            spreadsheet_id: self.spreadsheet_id.as_str().into(),
            sheet_name: self.sheet_name.as_str().into(),
        })
    }
}

impl Deref for SyncConfig {
    type Target = SyncConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
