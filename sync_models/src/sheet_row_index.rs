use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, parsing::Parsed, Date,
};

/// How the year of a sheet date is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetYear {
    Full,
    /// `00`-`68` is 2000-2068, `69`-`99` is 1969-1999.
    LastTwo,
}

pub struct SheetDateFormat {
    pub name: &'static str,
    pub description: &'static [BorrowedFormatItem<'static>],
    pub year: SheetYear,
}

impl SheetDateFormat {
    #[must_use]
    pub fn parse(&self, cell: &str) -> Option<Date> {
        match self.year {
            SheetYear::Full => Date::parse(cell, self.description).ok(),
            SheetYear::LastTwo => {
                let mut parsed = Parsed::new();
                let remaining = parsed
                    .parse_items(cell.as_bytes(), self.description)
                    .ok()?;
                if !remaining.is_empty() {
                    return None;
                }
                let year = expand_two_digit_year(parsed.year_last_two()?);
                Date::from_calendar_date(year, parsed.month()?, parsed.day()?.get()).ok()
            }
        }
    }
}

#[must_use]
pub fn expand_two_digit_year(year: u8) -> i32 {
    let year = i32::from(year);
    if year < 69 {
        2000 + year
    } else {
        1900 + year
    }
}

/// Formats tried, in order, against every date cell. The first one that
/// parses wins, so `01/02/2024` is always January 2nd: month/day readings
/// come before day/month, which is only reached when the month/day reading
/// is impossible (`13/02/2024`).
pub const SHEET_DATE_FORMATS: [SheetDateFormat; 7] = [
    SheetDateFormat {
        name: "YYYY-MM-DD",
        description: format_description!("[year]-[month]-[day]"),
        year: SheetYear::Full,
    },
    SheetDateFormat {
        name: "MM/DD/YYYY",
        description: format_description!("[month]/[day]/[year]"),
        year: SheetYear::Full,
    },
    SheetDateFormat {
        name: "M/D/YYYY",
        description: format_description!("[month padding:none]/[day padding:none]/[year]"),
        year: SheetYear::Full,
    },
    SheetDateFormat {
        name: "M/D/YY",
        description: format_description!(
            "[month padding:none]/[day padding:none]/[year repr:last_two]"
        ),
        year: SheetYear::LastTwo,
    },
    SheetDateFormat {
        name: "DD/MM/YYYY",
        description: format_description!("[day]/[month]/[year]"),
        year: SheetYear::Full,
    },
    SheetDateFormat {
        name: "Month D, YYYY",
        description: format_description!(
            "[month repr:long case_sensitive:false] [day padding:none], [year]"
        ),
        year: SheetYear::Full,
    },
    SheetDateFormat {
        name: "Mon D, YYYY",
        description: format_description!(
            "[month repr:short case_sensitive:false] [day padding:none], [year]"
        ),
        year: SheetYear::Full,
    },
];

/// Parse a date cell, `None` for blanks, headers and anything else that
/// isn't one of `SHEET_DATE_FORMATS`.
#[must_use]
pub fn parse_sheet_date(cell: &str) -> Option<Date> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    SHEET_DATE_FORMATS
        .iter()
        .find_map(|format| format.parse(cell))
}

/// Calendar date to sheet row, built from one scan of the date column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRowIndex {
    rows: BTreeMap<Date, u32>,
    duplicates: usize,
}

impl SheetRowIndex {
    /// `values[0]` sits on sheet row `row_offset + 1`. When a date shows up
    /// more than once the topmost row keeps it.
    #[must_use]
    pub fn from_column<T: AsRef<str>>(values: &[T], row_offset: u32) -> Self {
        let mut index = Self::default();
        for (idx, value) in values.iter().enumerate() {
            let Some(date) = parse_sheet_date(value.as_ref()) else {
                continue;
            };
            let Some(row) = u32::try_from(idx)
                .ok()
                .and_then(|idx| idx.checked_add(row_offset)?.checked_add(1))
            else {
                break;
            };
            if let Some(first_row) = index.rows.get(&date) {
                warn!("{date} appears on row {first_row} and row {row}, using row {first_row}");
                index.duplicates += 1;
            } else {
                index.rows.insert(date, row);
            }
        }
        debug!(
            "indexed {} dates from {} cells",
            index.rows.len(),
            values.len()
        );
        index
    }

    #[must_use]
    pub fn row(&self, date: &Date) -> Option<u32> {
        self.rows.get(date).copied()
    }

    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn match_dates(&self, dates_needed: &BTreeSet<Date>) -> RowMatch {
        let mut matched = RowMatch::default();
        for date in dates_needed {
            match self.row(date) {
                Some(row) => {
                    matched.rows.insert(*date, row);
                }
                None => matched.unmatched.push(*date),
            }
        }
        matched
    }
}

/// Rows found for the requested dates and the dates that have no row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMatch {
    pub rows: BTreeMap<Date, u32>,
    pub unmatched: Vec<Date>,
}

/// Resolve `dates_needed` against the raw text of a date column.
#[must_use]
pub fn match_dates<T: AsRef<str>>(
    date_column_values: &[T],
    dates_needed: &BTreeSet<Date>,
    row_offset: u32,
) -> RowMatch {
    SheetRowIndex::from_column(date_column_values, row_offset).match_dates(dates_needed)
}
