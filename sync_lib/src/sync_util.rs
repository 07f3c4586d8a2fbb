use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use log::debug;
use rand::{
    distributions::{Distribution, Uniform},
    thread_rng, Rng,
};
use smallvec::SmallVec;
use stack_string::{format_sstr, StackString};
use std::future::Future;
use tokio::time::{sleep, Duration};

use crate::errors::SyncError as Error;

pub const METERS_PER_MILE: f64 = 1609.344;

#[must_use]
pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `H:MM:SS` for an hour or more, otherwise `MM:SS`.
#[must_use]
pub fn format_duration(total_seconds: i64) -> StackString {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format_sstr!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format_sstr!("{minutes:02}:{seconds:02}")
    }
}

/// Minutes and seconds per unit, rounded to the nearest whole second.
/// Returns `None` when there is no distance to divide by.
#[must_use]
pub fn format_pace(total_seconds: i64, distance: f64) -> Option<StackString> {
    if !(distance > 0.0) || !distance.is_finite() {
        return None;
    }
    let pace_seconds = (total_seconds.max(0) as f64 / distance).round() as i64;
    let minutes = pace_seconds / 60;
    let seconds = pace_seconds % 60;
    Some(format_sstr!("{minutes}:{seconds:02}"))
}

/// Parse `H:MM:SS`, `MM:SS` or `M:SS` back into seconds.
///
/// # Errors
/// Return error if a component isn't an integer or there are too many
/// components
pub fn parse_clock_seconds(clock: &str) -> Result<i64, Error> {
    let parts: SmallVec<[i64; 3]> = clock
        .trim()
        .split(':')
        .map(str::parse)
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [m, s] => Ok(m * 60 + s),
        [h, m, s] => Ok(h * 3600 + m * 60 + s),
        _ => Err(Error::CustomError(format_sstr!("Invalid clock string {clock}"))),
    }
}

/// Spreadsheet column letters for a 1-indexed column: 1 -> A, 27 -> AA.
#[must_use]
pub fn column_letters(column: usize) -> StackString {
    let mut letters: SmallVec<[u8; 4]> = SmallVec::new();
    let mut column = column;
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    let letters: String = letters.into_iter().map(char::from).collect();
    letters.into()
}

/// A1 reference for a single cell.
#[must_use]
pub fn cell_reference(row: u32, column: usize) -> StackString {
    format_sstr!("{}{row}", column_letters(column))
}

/// # Errors
/// Return error if closure fails
pub async fn exponential_retry<T, U, F>(f: T) -> Result<U, Error>
where
    T: Fn() -> F,
    F: Future<Output = Result<U, Error>>,
{
    let mut timeout: f64 = 1.0;
    let range = Uniform::from(0..1000);
    loop {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(err) => {
                if timeout >= 16.0 {
                    return Err(err);
                }
                debug!("retrying in {timeout:.1}s after {err}");
                sleep(Duration::from_millis((timeout * 1000.0) as u64)).await;
                timeout *= 2.0 + f64::from(range.sample(&mut thread_rng())) / 1000.0;
            }
        }
    }
}

#[must_use]
pub fn get_random_string() -> StackString {
    let random_bytes: SmallVec<[u8; 16]> = (0..16).map(|_| thread_rng().gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(&random_bytes).into()
}
