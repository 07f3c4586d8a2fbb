use envy::Error as EnvyError;
use reqwest::{header::InvalidHeaderValue, Error as ReqwestError};
use serde_json::Error as SerdeJsonError;
use stack_string::StackString;
use std::{
    fmt::{Debug, Error as FmtError},
    num::{ParseFloatError, ParseIntError, TryFromIntError},
};
use thiserror::Error;
use time::error::{
    ComponentRange as TimeComponentRange, Format as TimeFormatError, Parse as TimeParseError,
};
use tokio::{task::JoinError, time::error::Elapsed};
use url::ParseError as UrlParseError;
use yup_oauth2::Error as YupOauth2Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    ConfigError(StackString),
    #[error("Authentication error: {0}")]
    AuthError(StackString),
    #[error("TimeComponentRange {0}")]
    TimeComponentRange(Box<TimeComponentRange>),
    #[error("TimeFormatError {0}")]
    TimeFormatError(#[from] TimeFormatError),
    #[error("TimeParseError {0}")]
    TimeParseError(Box<TimeParseError>),
    #[error("InvalidHeaderValue {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
    #[error("ReqwestError {0}")]
    ReqwestError(#[from] ReqwestError),
    #[error("YupOauth2Error {0}")]
    YupOauth2Error(Box<YupOauth2Error>),
    #[error("SerdeJsonError {0}")]
    SerdeJsonError(#[from] SerdeJsonError),
    #[error("ParseIntError {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("ParseFloatError {0}")]
    ParseFloatError(#[from] ParseFloatError),
    #[error("TryFromIntError {0}")]
    TryFromIntError(#[from] TryFromIntError),
    #[error("EnvyError {0}")]
    EnvyError(#[from] EnvyError),
    #[error("UrlParseError {0}")]
    UrlParseError(#[from] UrlParseError),
    #[error("io Error {0}")]
    IoError(#[from] std::io::Error),
    #[error("tokio join error {0}")]
    JoinError(#[from] JoinError),
    #[error("Timed out {0}")]
    Elapsed(#[from] Elapsed),
    #[error("FmtError {0}")]
    FmtError(#[from] FmtError),
    #[error("{0}")]
    StaticCustomError(&'static str),
    #[error("{0}")]
    CustomError(StackString),
}

impl From<TimeComponentRange> for SyncError {
    fn from(value: TimeComponentRange) -> Self {
        Self::TimeComponentRange(value.into())
    }
}

impl From<TimeParseError> for SyncError {
    fn from(value: TimeParseError) -> Self {
        Self::TimeParseError(value.into())
    }
}

impl From<YupOauth2Error> for SyncError {
    fn from(value: YupOauth2Error) -> Self {
        Self::YupOauth2Error(value.into())
    }
}

#[cfg(test)]
mod test {
    use envy::Error as EnvyError;
    use reqwest::Error as ReqwestError;
    use serde_json::Error as SerdeJsonError;
    use stack_string::StackString;
    use time::error::{ComponentRange as TimeComponentRange, Parse as TimeParseError};
    use tokio::task::JoinError;
    use yup_oauth2::Error as YupOauth2Error;

    use crate::errors::SyncError as Error;

    #[test]
    fn test_error_size() {
        println!("StackString {}", std::mem::size_of::<StackString>());
        println!("io Error {}", std::mem::size_of::<std::io::Error>());
        println!("tokio join error {}", std::mem::size_of::<JoinError>());
        println!("EnvyError {}", std::mem::size_of::<EnvyError>());
        println!("ReqwestError {}", std::mem::size_of::<ReqwestError>());
        println!("SerdeJsonError {}", std::mem::size_of::<SerdeJsonError>());
        println!("YupOauth2Error {}", std::mem::size_of::<YupOauth2Error>());
        println!(
            "TimeComponentRange {}",
            std::mem::size_of::<TimeComponentRange>()
        );
        println!("TimeParseError {}", std::mem::size_of::<TimeParseError>());

        assert!(std::mem::size_of::<Error>() <= 40);
    }

    #[test]
    fn test_config_error_message() {
        let err = Error::ConfigError("PACE_COLUMN is required".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: PACE_COLUMN is required"
        );
    }
}
