use log::{debug, info};
use maplit::hashmap;
use reqwest::{header::HeaderMap, Client, Response, StatusCode};
use serde::Serialize;
use stack_string::{format_sstr, StackString};
use std::time::Duration;
use time::{Date, OffsetDateTime};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    time::timeout,
};
use url::Url;

use sync_lib::{
    errors::SyncError as Error, stdout_channel::StdoutChannel, sync_config::SyncConfig,
    sync_util::{exponential_retry, get_random_string},
};
use sync_models::{strava_activity::StravaActivity, sync_capabilities::ActivitySource};

use crate::strava_tokens::{StravaTokens, TokenResponse};

const AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";
const TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const ACTIVITIES_URL: &str = "https://www.strava.com/api/v3/athlete/activities";

pub const PER_PAGE: usize = 50;
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub struct StravaClient {
    pub config: SyncConfig,
    pub client: Client,
    tokens: Mutex<StravaTokens>,
}

impl StravaClient {
    /// # Errors
    /// Return error if the token file exists but can't be read
    pub async fn from_config(config: SyncConfig) -> Result<Self, Error> {
        let tokens = StravaTokens::from_file(&config.strava_tokenfile).await?;
        Ok(Self {
            config,
            client: Client::new(),
            tokens: Mutex::new(tokens),
        })
    }

    pub async fn has_refresh_token(&self) -> bool {
        self.tokens.lock().await.has_refresh_token()
    }

    #[must_use]
    pub fn redirect_uri(&self) -> StackString {
        format_sstr!(
            "http://localhost:{}/callback",
            self.config.strava_callback_port
        )
    }

    /// # Errors
    /// Return error if the url can't be built
    pub fn get_authorization_url(&self, state: &str) -> Result<Url, Error> {
        let redirect_uri = self.redirect_uri();
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.strava_client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("approval_prompt", "auto"),
                ("scope", "activity:read_all"),
                ("state", state),
            ],
        )?;
        Ok(url)
    }

    async fn post_token_request<T>(&self, data: &T) -> Result<StravaTokens, Error>
    where
        T: Serialize + ?Sized,
    {
        let resp = self.client.post(TOKEN_URL).form(data).send().await?;
        let resp: TokenResponse = check_status(resp)?.json().await?;
        let tokens: StravaTokens = resp.into();
        tokens.to_file(&self.config.strava_tokenfile).await?;
        debug!(
            "saved strava tokens to {}",
            self.config.strava_tokenfile.display()
        );
        Ok(tokens)
    }

    /// Trade the code from the authorization redirect for tokens and save
    /// them.
    ///
    /// # Errors
    /// Return error if the exchange or writing the token file fails
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<(), Error> {
        let data = [
            ("client_id", self.config.strava_client_id.as_str()),
            ("client_secret", self.config.strava_client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        let tokens = self.post_token_request(&data).await?;
        *self.tokens.lock().await = tokens;
        Ok(())
    }

    /// Access token, refreshed first when it has less than a minute left.
    ///
    /// # Errors
    /// Return error if there is no refresh token or the refresh fails
    pub async fn get_access_token(&self) -> Result<StackString, Error> {
        let mut tokens = self.tokens.lock().await;
        if !tokens.has_refresh_token() {
            return Err(Error::AuthError(
                "No Strava tokens found, run `strava-sheets-sync auth` first".into(),
            ));
        }
        if tokens.needs_refresh(OffsetDateTime::now_utc()) {
            info!("refreshing strava access token");
            let refresh_token = tokens.refresh_token.clone();
            let data = hashmap! {
                "client_id" => self.config.strava_client_id.as_str(),
                "client_secret" => self.config.strava_client_secret.as_str(),
                "grant_type" => "refresh_token",
                "refresh_token" => refresh_token.as_str(),
            };
            *tokens = self.post_token_request(&data).await?;
        }
        Ok(tokens.access_token.clone())
    }

    async fn get_auth_headers(&self) -> Result<HeaderMap, Error> {
        let access_token = self.get_access_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            format_sstr!("Bearer {access_token}").parse()?,
        );
        Ok(headers)
    }

    async fn send_get(&self, url: &Url, headers: &HeaderMap) -> Result<Response, Error> {
        let resp = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await?;
        Ok(resp)
    }

    /// # Errors
    /// Return error if the request fails or the token is rejected
    pub async fn get_activities_page(
        &self,
        after: i64,
        page: usize,
    ) -> Result<Vec<StravaActivity>, Error> {
        let headers = self.get_auth_headers().await?;
        let after = format_sstr!("{after}");
        let page = format_sstr!("{page}");
        let per_page = format_sstr!("{PER_PAGE}");
        let url = Url::parse_with_params(
            ACTIVITIES_URL,
            &[
                ("after", after.as_str()),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
            ],
        )?;
        let resp = exponential_retry(|| self.send_get(&url, &headers)).await?;
        let activities = check_status(resp)?.json().await?;
        Ok(activities)
    }

    /// Every activity that started after `after`, following pages until a
    /// short one comes back.
    ///
    /// # Errors
    /// Return error if any page fails
    pub async fn get_activities(
        &self,
        after: OffsetDateTime,
    ) -> Result<Vec<StravaActivity>, Error> {
        let after = after.unix_timestamp();
        let mut activities = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.get_activities_page(after, page).await?;
            let batch_len = batch.len();
            debug!("page {page}: {batch_len} activities");
            activities.extend(batch);
            if batch_len < PER_PAGE {
                break;
            }
            page += 1;
        }
        info!("fetched {} activities from strava", activities.len());
        Ok(activities)
    }

    /// Interactive first-time authorization: print the authorize url, wait
    /// for Strava to redirect back to the local listener, then exchange the
    /// code.
    ///
    /// # Errors
    /// Return error if nothing arrives within two minutes, the state doesn't
    /// match or the exchange fails
    pub async fn authorize(&self, stdout: &StdoutChannel) -> Result<(), Error> {
        let state = get_random_string();
        let url = self.get_authorization_url(&state)?;
        let listener = TcpListener::bind(("127.0.0.1", self.config.strava_callback_port)).await?;

        stdout.send("Visit this url to authorize Strava access:");
        stdout.send(url.as_str());
        stdout.send("Waiting for authorization (timeout: 2 minutes)...");

        let (mut stream, addr) = timeout(CALLBACK_TIMEOUT, listener.accept())
            .await
            .map_err(|_| Error::AuthError("No authorization code received".into()))??;
        debug!("callback connection from {addr}");

        let request = read_request(&mut stream).await?;
        let code = match parse_callback_request(&request, &state) {
            Ok(code) => code,
            Err(e) => {
                respond_with_message(&mut stream, &format_sstr!("Authorization failed: {e}"))
                    .await?;
                return Err(e);
            }
        };
        self.exchange_code_for_token(&code).await?;
        respond_with_message(
            &mut stream,
            "Strava authorization complete, you can close this window.",
        )
        .await?;
        stdout.send(format_sstr!(
            "Strava authorization complete, tokens saved to {}",
            self.config.strava_tokenfile.display()
        ));
        Ok(())
    }
}

impl ActivitySource for StravaClient {
    async fn list_activities(&self, since: Date) -> Result<Vec<StravaActivity>, Error> {
        self.get_activities(since.midnight().assume_utc()).await
    }
}

fn check_status(resp: Response) -> Result<Response, Error> {
    if resp.status() == StatusCode::UNAUTHORIZED {
        return Err(Error::AuthError(
            "Strava rejected the access token, run `strava-sheets-sync auth` again".into(),
        ));
    }
    Ok(resp.error_for_status()?)
}

async fn read_request(stream: &mut TcpStream) -> Result<StackString, Error> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf[..n]).as_ref().into())
}

/// Pull the authorization code out of the raw redirect request.
///
/// # Errors
/// Return error if Strava sent an error, there is no code or the state
/// doesn't match
pub fn parse_callback_request(request: &str, expected_state: &str) -> Result<StackString, Error> {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| Error::AuthError("Malformed callback request".into()))?;
    let url = Url::parse("http://localhost")?.join(path)?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => {
                return Err(Error::AuthError(format_sstr!("Strava returned {value}")));
            }
            "code" => code = Some(StackString::from(value.as_ref())),
            "state" => state = Some(StackString::from(value.as_ref())),
            _ => {}
        }
    }
    if state.as_ref().map(StackString::as_str) != Some(expected_state) {
        return Err(Error::AuthError("Invalid OAuth state".into()));
    }
    code.ok_or_else(|| Error::AuthError("No authorization code received".into()))
}

async fn respond_with_message(stream: &mut TcpStream, message: &str) -> Result<(), Error> {
    let body = format_sstr!("{message}\n");
    let response = format_sstr!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use tempfile::NamedTempFile;
    use time::macros::date;

    use sync_lib::{
        errors::SyncError as Error,
        stdout_channel::StdoutChannel,
        sync_config::{SyncConfig, SyncConfigInner},
    };
    use sync_models::sync_capabilities::ActivitySource;

    use crate::{
        strava_client::{parse_callback_request, StravaClient},
        strava_tokens::StravaTokens,
    };

    fn test_config(tokenfile: PathBuf) -> SyncConfig {
        SyncConfigInner {
            strava_client_id: "12345".into(),
            strava_client_secret: "secret".into(),
            strava_tokenfile: tokenfile,
            ..SyncConfigInner::new()
        }
        .into()
    }

    #[tokio::test]
    async fn test_authorization_url() -> Result<(), Error> {
        let tokenfile = NamedTempFile::new()?;
        let client = StravaClient::from_config(test_config(tokenfile.path().into())).await?;
        let url = client.get_authorization_url("abcdef")?;
        assert_eq!(url.host_str(), Some("www.strava.com"));
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".into(), "12345".into())));
        assert!(query.contains(&(
            "redirect_uri".into(),
            "http://localhost:8089/callback".into()
        )));
        assert!(query.contains(&("scope".into(), "activity:read_all".into())));
        assert!(query.contains(&("state".into(), "abcdef".into())));
        Ok(())
    }

    #[test]
    fn test_parse_callback_request() -> Result<(), Error> {
        let request = "GET /callback?state=xyz&code=4f2a9c&scope=read,activity:read_all HTTP/1.1\r\nHost: localhost:8089\r\n\r\n";
        assert_eq!(parse_callback_request(request, "xyz")?.as_str(), "4f2a9c");

        let err = parse_callback_request(request, "other").unwrap_err();
        assert_eq!(err.to_string(), "Authentication error: Invalid OAuth state");

        let denied = "GET /callback?state=xyz&error=access_denied HTTP/1.1\r\n\r\n";
        assert!(parse_callback_request(denied, "xyz").is_err());

        assert!(parse_callback_request("", "xyz").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_tokens_is_auth_error() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let client = StravaClient::from_config(test_config(dir.path().join("tokens"))).await?;
        assert!(!client.has_refresh_token().await);
        let err = client.list_activities(date!(2024 - 03 - 01)).await.unwrap_err();
        assert!(matches!(err, Error::AuthError(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_token_is_used_without_refresh() -> Result<(), Error> {
        let tokenfile = NamedTempFile::new()?;
        StravaTokens {
            access_token: "still-valid".into(),
            refresh_token: "refresh".into(),
            expires_at: time::OffsetDateTime::now_utc().unix_timestamp() + 3_600,
        }
        .to_file(tokenfile.path())
        .await?;
        let client = StravaClient::from_config(test_config(tokenfile.path().into())).await?;
        assert_eq!(client.get_access_token().await?.as_str(), "still-valid");
        Ok(())
    }

    #[tokio::test]
    #[ignore]
    async fn test_list_activities_live() -> Result<(), Error> {
        let config = SyncConfig::get_config(None)?;
        let client = StravaClient::from_config(config).await?;
        let since = time::OffsetDateTime::now_utc().date() - time::Duration::days(7);
        let activities = client.list_activities(since).await?;
        let stdout = StdoutChannel::new();
        for activity in &activities {
            stdout.send(format!("{} {}", activity.id, activity.name));
        }
        Ok(())
    }
}
