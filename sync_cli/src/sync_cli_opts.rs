use anyhow::Error;
use clap::Parser;
use time::{macros::format_description, Date, OffsetDateTime};

use sheets_lib::sheets_client::SheetsClient;
use strava_lib::strava_client::StravaClient;
use sync_lib::errors::SyncError;

use crate::sync_cli::{resolve_since, SyncCli};

fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

/// Sync Strava runs into a Google Sheets training log
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "strava-sheets-sync")]
pub enum SyncCliOpts {
    /// Authorize Strava access and save the tokens
    Auth,
    /// Write recent runs into the sheet
    Sync {
        /// Number of days to look back
        #[arg(short, long, default_value_t = 1)]
        days: u32,
        /// Sync runs on or after this date (YYYY-MM-DD), overrides --days
        #[arg(short, long, value_parser = parse_date)]
        since: Option<Date>,
        /// Show what would be written without touching the sheet
        #[arg(long)]
        dry_run: bool,
    },
}

impl SyncCliOpts {
    /// # Errors
    /// Return error if configuration, authentication or the sync fails
    pub async fn process_args() -> Result<(), Error> {
        let opts = Self::parse();
        let cli = SyncCli::with_config()?;
        let stdout_task = cli.stdout.spawn_stdout_task();

        let result = opts.run(&cli).await;

        cli.stdout.close().await?;
        stdout_task.await??;
        result
    }

    async fn run(self, cli: &SyncCli) -> Result<(), Error> {
        match self {
            Self::Auth => {
                let strava = StravaClient::from_config(cli.config.clone()).await?;
                strava.authorize(&cli.stdout).await?;
            }
            Self::Sync {
                days,
                since,
                dry_run,
            } => {
                let strava = StravaClient::from_config(cli.config.clone()).await?;
                if !strava.has_refresh_token().await {
                    return Err(SyncError::AuthError(
                        "No Strava tokens found, run `strava-sheets-sync auth` first".into(),
                    )
                    .into());
                }
                let sheets = SheetsClient::from_config(&cli.config).await?;
                let today = OffsetDateTime::now_utc().date();
                let since = resolve_since(today, days, since);
                cli.run_sync(&strava, &sheets, since, dry_run).await?;
            }
        }
        Ok(())
    }
}
