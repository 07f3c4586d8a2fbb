use log::info;
use stack_string::format_sstr;
use time::{Date, Duration};

use sync_lib::{errors::SyncError as Error, stdout_channel::StdoutChannel, sync_config::SyncConfig};
use sync_models::{
    normalized_run::normalize_with_policy,
    sheet_row_index::match_dates,
    sync_capabilities::{ActivitySource, SheetReader, SheetWriter},
    write_plan::{ExecutionReport, WritePlan},
};

/// Start of the lookback window: an explicit date wins over `days`.
#[must_use]
pub fn resolve_since(today: Date, days: u32, since: Option<Date>) -> Date {
    since.unwrap_or_else(|| today - Duration::days(i64::from(days)))
}

#[derive(Clone, Debug)]
pub struct SyncCli {
    pub config: SyncConfig,
    pub stdout: StdoutChannel,
}

impl SyncCli {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            stdout: StdoutChannel::new(),
        }
    }

    /// # Errors
    /// Return error if the configuration can't be loaded
    pub fn with_config() -> Result<Self, Error> {
        let config = SyncConfig::get_config(None)?;
        Ok(Self::new(config))
    }

    /// One sequential pass: fetch, normalize, read the date column, match,
    /// plan and execute. Configuration problems surface before anything
    /// remote is touched.
    ///
    /// # Errors
    /// Return error on bad configuration or if any remote call fails
    pub async fn run_sync<A, S>(
        &self,
        source: &A,
        sheets: &S,
        since: Date,
        dry_run: bool,
    ) -> Result<ExecutionReport, Error>
    where
        A: ActivitySource,
        S: SheetReader + SheetWriter,
    {
        let columns = self.config.column_mapping()?;
        let sheet = self.config.sheet_target()?;
        let first_row = self.config.first_data_row()?;

        self.stdout
            .send(format_sstr!("Fetching Strava runs since {since}..."));
        let activities = source.list_activities(since).await?;
        let runs = normalize_with_policy(&activities, self.config.units, self.config.same_day_policy);
        info!(
            "{} activities, {} runs, {} filtered",
            activities.len(),
            runs.len(),
            runs.activities_filtered
        );

        if runs.is_empty() {
            self.stdout.send("No runs found in that time range.");
            return Ok(ExecutionReport {
                activities_filtered: runs.activities_filtered,
                ..ExecutionReport::default()
            });
        }

        self.stdout.send(format_sstr!("Found {} run(s):", runs.len()));
        for run in runs.iter() {
            self.stdout.send(format_sstr!("    {run}"));
        }

        let column = sheets.read_column(&sheet, columns.date, first_row).await?;
        let matches = match_dates(&column, &runs.dates(), self.config.header_rows);
        let plan = WritePlan::build(&matches, &runs, &columns);

        let report = plan.execute(&sheet, sheets, dry_run).await?;

        if dry_run {
            self.stdout.send("Planned writes:");
            for line in plan.preview_lines() {
                self.stdout.send(format_sstr!("    {line}"));
            }
            self.stdout
                .send("(Dry run, no data written to Google Sheets)");
        } else {
            self.stdout.send(format_sstr!("Done! {report}"));
        }
        for line in report.warning_lines() {
            self.stdout.send(line);
        }
        Ok(report)
    }
}
