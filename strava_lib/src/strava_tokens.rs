use log::debug;
use serde::Deserialize;
use stack_string::{format_sstr, StackString};
use std::path::Path;
use time::OffsetDateTime;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};

use sync_lib::errors::SyncError as Error;

/// Seconds of validity below which the access token is refreshed.
pub const REFRESH_LEEWAY: i64 = 60;

/// Tokens persisted between runs, one `key=value` pair per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StravaTokens {
    pub access_token: StackString,
    pub refresh_token: StackString,
    /// Unix timestamp.
    pub expires_at: i64,
}

/// Body of `POST /oauth/token` for both the code exchange and a refresh.
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl From<TokenResponse> for StravaTokens {
    fn from(item: TokenResponse) -> Self {
        Self {
            access_token: item.access_token.into(),
            refresh_token: item.refresh_token.into(),
            expires_at: item.expires_at,
        }
    }
}

impl StravaTokens {
    /// A missing file reads as empty tokens.
    ///
    /// # Errors
    /// Return error if the file exists but can't be read or holds a bad
    /// `expires_at`
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let mut tokens = Self::default();
        if !path.exists() {
            debug!("no token file at {}", path.display());
            return Ok(tokens);
        }
        let f = File::open(path).await?;
        let mut b = BufReader::new(f);
        let mut line = String::new();
        loop {
            line.clear();
            if b.read_line(&mut line).await? == 0 {
                break;
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "access_token" => tokens.access_token = val.trim().into(),
                "refresh_token" => tokens.refresh_token = val.trim().into(),
                "expires_at" => tokens.expires_at = val.trim().parse()?,
                _ => {}
            }
        }
        Ok(tokens)
    }

    /// Only the owner can read the file back on unix.
    ///
    /// # Errors
    /// Return error if the file can't be written
    pub async fn to_file(&self, path: &Path) -> Result<(), Error> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut f = options.open(path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            f.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        f.write_all(format_sstr!("access_token={}\n", self.access_token).as_bytes())
            .await?;
        f.write_all(format_sstr!("refresh_token={}\n", self.refresh_token).as_bytes())
            .await?;
        f.write_all(format_sstr!("expires_at={}\n", self.expires_at).as_bytes())
            .await?;
        f.flush().await?;
        Ok(())
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    #[must_use]
    pub fn needs_refresh(&self, now: OffsetDateTime) -> bool {
        self.access_token.is_empty() || now.unix_timestamp() >= self.expires_at - REFRESH_LEEWAY
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;
    use time::macros::datetime;

    use sync_lib::errors::SyncError as Error;

    use crate::strava_tokens::{StravaTokens, TokenResponse};

    #[tokio::test]
    async fn test_token_file_round_trip() -> Result<(), Error> {
        let tokenfile = NamedTempFile::new()?;
        let tokens = StravaTokens {
            access_token: "abc123".into(),
            refresh_token: "def456".into(),
            expires_at: 1_709_300_000,
        };
        tokens.to_file(tokenfile.path()).await?;
        let contents = std::fs::read_to_string(tokenfile.path())?;
        assert_eq!(
            contents,
            "access_token=abc123\nrefresh_token=def456\nexpires_at=1709300000\n"
        );
        assert_eq!(StravaTokens::from_file(tokenfile.path()).await?, tokens);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_owner_only() -> Result<(), Error> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("strava_tokens");
        std::fs::write(&path, "")?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))?;

        StravaTokens::default().to_file(&path).await?;
        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = dir.path().join("fresh_tokens");
        StravaTokens::default().to_file(&fresh).await?;
        let mode = std::fs::metadata(&fresh)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_token_file() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let tokens = StravaTokens::from_file(&dir.path().join("missing")).await?;
        assert!(!tokens.has_refresh_token());
        Ok(())
    }

    #[test]
    fn test_needs_refresh() {
        let now = datetime!(2024-03-01 12:00 UTC);
        let mut tokens = StravaTokens {
            access_token: "abc".into(),
            refresh_token: "def".into(),
            expires_at: now.unix_timestamp() + 3_600,
        };
        assert!(!tokens.needs_refresh(now));
        tokens.expires_at = now.unix_timestamp() + 59;
        assert!(tokens.needs_refresh(now));
        tokens.expires_at = now.unix_timestamp() + 3_600;
        tokens.access_token = "".into();
        assert!(tokens.needs_refresh(now));
    }

    #[test]
    fn test_token_response() -> Result<(), serde_json::Error> {
        let body = r#"{
            "token_type": "Bearer",
            "expires_at": 1709321600,
            "expires_in": 21600,
            "refresh_token": "e5n567567",
            "access_token": "a4b945687g"
        }"#;
        let resp: TokenResponse = serde_json::from_str(body)?;
        let tokens: StravaTokens = resp.into();
        assert_eq!(tokens.access_token.as_str(), "a4b945687g");
        assert_eq!(tokens.expires_at, 1_709_321_600);
        Ok(())
    }
}
