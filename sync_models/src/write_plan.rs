use log::info;
use serde::Serialize;
use stack_string::{format_sstr, StackString};
use std::fmt;
use time::Date;

use sync_lib::{
    errors::SyncError as Error,
    sync_config::{ColumnMapping, SheetTarget},
    sync_util::cell_reference,
};

use crate::{
    normalized_run::{NormalizedRun, NormalizedRuns},
    sheet_row_index::RowMatch,
    sync_capabilities::SheetWriter,
};

/// Distances go out as numbers so the sheet can sum them, everything else
/// as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(StackString),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n:.2}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub row: u32,
    pub column: usize,
    pub value: CellValue,
}

impl CellWrite {
    /// A1 reference, `E12`.
    #[must_use]
    pub fn reference(&self) -> StackString {
        cell_reference(self.row, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRow {
    pub date: Date,
    pub row: u32,
    pub run: NormalizedRun,
    pub cells: Vec<CellWrite>,
}

impl PlannedRow {
    fn new(row: u32, run: &NormalizedRun, columns: &ColumnMapping) -> Self {
        let mut cells = vec![CellWrite {
            row,
            column: columns.distance,
            value: CellValue::Number(run.distance),
        }];
        if let Some(pace) = &run.pace {
            cells.push(CellWrite {
                row,
                column: columns.pace,
                value: CellValue::Text(pace.clone()),
            });
        }
        if let Some(column) = columns.duration {
            cells.push(CellWrite {
                row,
                column,
                value: CellValue::Text(run.duration.clone()),
            });
        }
        if let Some(column) = columns.notes {
            if !run.name.is_empty() {
                cells.push(CellWrite {
                    row,
                    column,
                    value: CellValue::Text(run.name.clone()),
                });
            }
        }
        Self {
            date: run.date,
            row,
            run: run.clone(),
            cells,
        }
    }
}

impl fmt::Display for PlannedRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> row {}:", self.date, self.row)?;
        for cell in &self.cells {
            write!(f, " {}={}", cell.reference(), cell.value)?;
        }
        Ok(())
    }
}

/// Every cell a sync would touch, worked out before anything is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
    pub rows: Vec<PlannedRow>,
    /// Dates with a run but no row in the sheet, in date order.
    pub unmatched_dates: Vec<Date>,
    pub activities_filtered: usize,
}

impl WritePlan {
    /// Rows come out in date order and cells in column-role order
    /// (distance, pace, duration, notes).
    #[must_use]
    pub fn build(matches: &RowMatch, runs: &NormalizedRuns, columns: &ColumnMapping) -> Self {
        let mut plan = Self {
            activities_filtered: runs.activities_filtered,
            ..Self::default()
        };
        for run in runs.iter() {
            match matches.rows.get(&run.date) {
                Some(row) => plan.rows.push(PlannedRow::new(*row, run, columns)),
                None => plan.unmatched_dates.push(run.date),
            }
        }
        plan
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellWrite> {
        self.rows.iter().flat_map(|row| row.cells.iter())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn preview_lines(&self) -> Vec<StackString> {
        self.rows.iter().map(StackString::from_display).collect()
    }

    /// Everything up to the write itself is shared between dry and real
    /// runs, so a dry run reports exactly what a real one would do.
    ///
    /// # Errors
    /// Return error if the batched write fails
    pub async fn execute<W: SheetWriter>(
        &self,
        sheet: &SheetTarget,
        writer: &W,
        dry_run: bool,
    ) -> Result<ExecutionReport, Error> {
        let report = ExecutionReport::from_plan(self);
        if dry_run {
            info!(
                "dry run, not writing {} cells to {}",
                report.cells_written, sheet.sheet_name
            );
        } else if !self.is_empty() {
            let cells: Vec<CellWrite> = self.cells().cloned().collect();
            let updated = writer.batch_write(sheet, &cells).await?;
            info!("{updated} cells updated in {}", sheet.sheet_name);
        }
        Ok(report)
    }
}

#[must_use]
pub fn build_plan(matches: &RowMatch, runs: &NormalizedRuns, columns: &ColumnMapping) -> WritePlan {
    WritePlan::build(matches, runs, columns)
}

/// # Errors
/// Return error if the batched write fails
pub async fn execute<W: SheetWriter>(
    plan: &WritePlan,
    sheet: &SheetTarget,
    writer: &W,
    dry_run: bool,
) -> Result<ExecutionReport, Error> {
    plan.execute(sheet, writer, dry_run).await
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub rows_written: usize,
    pub cells_written: usize,
    /// Runs with no matching row.
    pub rows_skipped: usize,
    pub activities_filtered: usize,
    pub unmatched_dates: Vec<Date>,
}

impl ExecutionReport {
    #[must_use]
    pub fn from_plan(plan: &WritePlan) -> Self {
        Self {
            rows_written: plan.rows.len(),
            cells_written: plan.cells().count(),
            rows_skipped: plan.unmatched_dates.len(),
            activities_filtered: plan.activities_filtered,
            unmatched_dates: plan.unmatched_dates.clone(),
        }
    }

    #[must_use]
    pub fn warning_lines(&self) -> Vec<StackString> {
        if self.unmatched_dates.is_empty() {
            return Vec::new();
        }
        let dates: Vec<String> = self
            .unmatched_dates
            .iter()
            .map(ToString::to_string)
            .collect();
        vec![
            format_sstr!(
                "WARNING: no row in the sheet for {}",
                dates.join(", ")
            ),
            "Make sure those dates exist in the sheet's date column.".into(),
        ]
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "rows written: {}, rows skipped: {}, activities filtered: {}",
            self.rows_written, self.rows_skipped, self.activities_filtered
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::{date, datetime};

    use sync_lib::{
        errors::SyncError as Error,
        sync_config::{ColumnMapping, DistanceUnit, SheetTarget},
    };

    use crate::{
        normalized_run::normalize,
        sheet_row_index::match_dates,
        strava_activity::{ActivityType, StravaActivity},
        sync_capabilities::SheetWriter,
        write_plan::{build_plan, execute, CellValue, CellWrite, WritePlan},
    };

    #[derive(Default)]
    struct CountingWriter {
        calls: AtomicUsize,
    }

    impl SheetWriter for CountingWriter {
        async fn batch_write(
            &self,
            _sheet: &SheetTarget,
            cells: &[CellWrite],
        ) -> Result<usize, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(cells.len())
        }
    }

    fn sheet() -> SheetTarget {
        SheetTarget {
            spreadsheet_id: "sheet-id".into(),
            sheet_name: "Training".into(),
        }
    }

    fn sample_plan(columns: &ColumnMapping) -> WritePlan {
        let run = |id: i64, day: u8, meters: f64, name: &str| StravaActivity {
            id,
            name: name.into(),
            activity_type: ActivityType::Run,
            start_date: datetime!(2024-03-01 07:00 UTC)
                .replace_day(day)
                .unwrap(),
            start_date_local: None,
            timezone: None,
            distance: meters,
            moving_time: Some(2_415),
            elapsed_time: 2_500,
        };
        let activities = [
            run(1, 1, 8046.72, "Morning Run"),
            run(2, 2, 0.0, ""),
            run(3, 9, 5000.0, "Lost Run"),
            StravaActivity {
                activity_type: ActivityType::Ride,
                ..run(4, 1, 20_000.0, "Ride")
            },
        ];
        let runs = normalize(&activities, DistanceUnit::Miles);
        let column = ["Date", "2024-03-01", "03/02/2024", "2024-03-03"];
        let matches = match_dates(&column, &runs.dates(), 1);
        build_plan(&matches, &runs, columns)
    }

    #[test]
    fn test_build_plan_all_columns() {
        let columns = ColumnMapping::new(1, Some(5), Some(6), Some(7), Some(8)).unwrap();
        let plan = sample_plan(&columns);

        assert_eq!(plan.rows.len(), 2);
        assert_eq!(plan.unmatched_dates, vec![date!(2024 - 03 - 09)]);
        assert_eq!(plan.activities_filtered, 1);

        let first = &plan.rows[0];
        assert_eq!(first.row, 3);
        let refs: Vec<_> = first.cells.iter().map(|c| c.reference().to_string()).collect();
        assert_eq!(refs, vec!["E3", "F3", "G3", "H3"]);
        assert_eq!(first.cells[0].value, CellValue::Number(5.0));
        assert_eq!(first.cells[1].value, CellValue::Text("8:03".into()));
        assert_eq!(first.cells[2].value, CellValue::Text("40:15".into()));
        assert_eq!(first.cells[3].value, CellValue::Text("Morning Run".into()));

        // zero distance: no pace, and an unnamed run leaves notes alone
        let second = &plan.rows[1];
        assert_eq!(second.row, 4);
        let refs: Vec<_> = second.cells.iter().map(|c| c.reference().to_string()).collect();
        assert_eq!(refs, vec!["E4", "G4"]);
    }

    #[test]
    fn test_build_plan_optional_columns_disabled() {
        let columns = ColumnMapping::new(1, Some(2), Some(3), None, None).unwrap();
        let plan = sample_plan(&columns);
        assert_eq!(plan.cells().count(), 3);
        assert!(plan.cells().all(|c| c.column == 2 || c.column == 3));
    }

    #[test]
    fn test_preview_lines() {
        let columns = ColumnMapping::new(1, Some(5), Some(6), Some(7), None).unwrap();
        let plan = sample_plan(&columns);
        let lines = plan.preview_lines();
        assert_eq!(lines[0].as_str(), "2024-03-01 -> row 3: E3=5.00 F3=8:03 G3=40:15");
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_run() -> Result<(), Error> {
        let columns = ColumnMapping::new(1, Some(5), Some(6), Some(7), Some(8)).unwrap();
        let plan = sample_plan(&columns);

        let dry_writer = CountingWriter::default();
        let dry_report = execute(&plan, &sheet(), &dry_writer, true).await?;
        assert_eq!(dry_writer.calls.load(Ordering::SeqCst), 0);

        let writer = CountingWriter::default();
        let report = execute(&plan, &sheet(), &writer, false).await?;
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);

        assert_eq!(dry_report, report);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.cells_written, 6);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.activities_filtered, 1);
        assert_eq!(
            report.to_string(),
            "rows written: 2, rows skipped: 1, activities filtered: 1"
        );
        assert_eq!(
            report.warning_lines()[0].as_str(),
            "WARNING: no row in the sheet for 2024-03-09"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_plan_skips_write() -> Result<(), Error> {
        let writer = CountingWriter::default();
        let report = WritePlan::default()
            .execute(&sheet(), &writer, false)
            .await?;
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.rows_written, 0);
        assert!(report.warning_lines().is_empty());
        Ok(())
    }

    #[test]
    fn test_cell_value_json() -> Result<(), serde_json::Error> {
        let values = vec![
            CellValue::Number(3.11),
            CellValue::Text("8:03".into()),
        ];
        assert_eq!(serde_json::to_string(&values)?, r#"[3.11,"8:03"]"#);
        Ok(())
    }
}
