use crate::config::data_dir;
use crate::errors::{AppError, AppResult};
use crate::gmail::TokenSource;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SERVICE_NAME: &str = "triage-google-oauth";
const CLIENT_SECRET_FILE: &str = "client_secret.json";
const EXPIRY_SKEW_SECS: i64 = 60;

pub const GMAIL_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Asks the user for a line of text and waits for the answer. `None` means
/// the user dismissed the prompt.
#[async_trait]
pub trait CodePrompt: Send + Sync {
    async fn prompt(&self, text: &str) -> Option<String>;
}

#[derive(Clone, Debug)]
pub struct TokenBundle {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
}

impl TokenBundle {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => at - Duration::seconds(EXPIRY_SKEW_SECS) > Utc::now(),
            None => true,
        }
    }
}

/// Hands out access tokens for one Google account. The first call runs the
/// consent flow if no refresh token is stored; concurrent callers wait for
/// it instead of starting their own.
pub struct Authorizer {
    token_key: String,
    prompt: Arc<dyn CodePrompt>,
    current: Mutex<Option<TokenBundle>>,
}

impl Authorizer {
    pub fn new(token_key: &str, prompt: Arc<dyn CodePrompt>) -> Self {
        Self {
            token_key: token_key.to_string(),
            prompt,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for Authorizer {
    async fn access_token(&self) -> AppResult<String> {
        let mut current = self.current.lock().await;
        if let Some(bundle) = current.as_ref().filter(|b| b.is_fresh()) {
            return Ok(bundle.access_token.clone());
        }

        let scopes: Vec<Scope> = GMAIL_SCOPES.iter().map(|s| Scope::new(s.to_string())).collect();
        let bundle = authorize_with_scopes(&scopes, &self.token_key, self.prompt.as_ref()).await?;
        let token = bundle.access_token.clone();
        *current = Some(bundle);
        Ok(token)
    }
}

pub async fn authorize_with_scopes(
    scopes: &[Scope],
    token_key: &str,
    prompt: &dyn CodePrompt,
) -> AppResult<TokenBundle> {
    let creds = load_credentials()?;
    let token_store = TokenStore::from_key(token_key);

    if let Some(refresh) = token_store.load()? {
        if let Some(bundle) =
            try_refresh(&build_client(&creds, &pick_redirect_uri()?)?, refresh).await?
        {
            return Ok(bundle);
        }
        warn!(account = %token_key, "Stored refresh token failed; re-authenticating");
        let _ = token_store.delete();
    }

    let base_redirect = pick_redirect_uri()?;
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| AppError::Unexpected(format!("failed to bind loopback port: {e}")))?;
    let local_port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| AppError::Unexpected(format!("failed to read local addr: {e}")))?;

    let redirect = build_redirect_url(&base_redirect, local_port)?;
    let client = build_client(&creds, &redirect)?;

    let (auth_url, verifier, csrf) = build_auth_url(&client, scopes)?;
    info!(account = %token_key, redirect = %redirect, "Opening browser for Google OAuth consent");
    open_in_browser(&auth_url);

    let question = format!("Authorize in your browser, or paste the code here (URL: {auth_url}):");
    let code = tokio::select! {
        received = listen_for_code(listener) => received?,
        answer = prompt.prompt(&question) => {
            let answer = answer.ok_or(AppError::AuthExpired)?;
            parse_pasted_code(&answer)?
        }
    };
    if let Some(state) = &code.state {
        if state != csrf.secret() {
            return Err(AppError::AuthExpired);
        }
    }

    let token_res = client
        .exchange_code(AuthorizationCode::new(code.code))
        .set_pkce_verifier(verifier)
        .request_async(async_http_client)
        .await
        .map_err(|e| AppError::Network(format!("token exchange failed: {e}")))?;

    let refresh = token_res.refresh_token().map(|r| r.secret().to_string());
    if let Some(ref_token) = &refresh {
        token_store.save(ref_token)?;
    }

    Ok(TokenBundle {
        access_token: token_res.access_token().secret().to_string(),
        expires_at: token_res
            .expires_in()
            .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::seconds(0))),
        refresh_token: refresh,
    })
}

#[derive(Debug, Clone)]
struct InstalledCreds {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: InstalledSection,
}

#[derive(Debug, Deserialize)]
struct InstalledSection {
    client_id: String,
    client_secret: String,
}

fn load_credentials() -> AppResult<InstalledCreds> {
    if let (Ok(client_id), Ok(client_secret)) =
        (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET"))
    {
        return Ok(InstalledCreds {
            client_id,
            client_secret,
        });
    }

    let path = env::var("GOOGLE_CLIENT_SECRET_FILE").unwrap_or_else(|_| CLIENT_SECRET_FILE.into());
    load_credentials_file(Path::new(&path))
}

fn load_credentials_file(path: &Path) -> AppResult<InstalledCreds> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET missing and {} unreadable: {e}",
            path.display()
        ))
    })?;
    let parsed: ClientSecretFile = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("invalid {}: {e}", path.display())))?;
    Ok(InstalledCreds {
        client_id: parsed.installed.client_id,
        client_secret: parsed.installed.client_secret,
    })
}

fn pick_redirect_uri() -> AppResult<String> {
    Ok("http://127.0.0.1:8000".to_string())
}

fn build_redirect_url(base: &str, port: u16) -> AppResult<String> {
    let mut url = url::Url::parse(base)
        .map_err(|e| AppError::Config(format!("invalid redirect uri {base}: {e}")))?;
    url.set_port(Some(port))
        .map_err(|_| AppError::Config("failed to set redirect port".into()))?;
    Ok(url.to_string())
}

fn build_client(creds: &InstalledCreds, redirect: &str) -> AppResult<BasicClient> {
    let auth_url = AuthUrl::new(AUTH_URL.to_string())
        .map_err(|e| AppError::Config(format!("invalid auth url: {e}")))?;
    let token_url = TokenUrl::new(TOKEN_URL.to_string())
        .map_err(|e| AppError::Config(format!("invalid token url: {e}")))?;
    let client = BasicClient::new(
        ClientId::new(creds.client_id.clone()),
        Some(ClientSecret::new(creds.client_secret.clone())),
        auth_url,
        Some(token_url),
    )
    .set_redirect_uri(
        RedirectUrl::new(redirect.to_string())
            .map_err(|e| AppError::Config(format!("invalid redirect uri {redirect}: {e}")))?,
    )
    .set_auth_type(oauth2::AuthType::RequestBody);

    Ok(client)
}

fn build_auth_url(
    client: &BasicClient,
    scopes: &[Scope],
) -> AppResult<(String, PkceCodeVerifier, CsrfToken)> {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let mut req = client
        .authorize_url(CsrfToken::new_random)
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(challenge);
    for scope in scopes {
        req = req.add_scope(scope.clone());
    }
    let (url, csrf) = req.url();
    Ok((url.to_string(), verifier, csrf))
}

async fn try_refresh(client: &BasicClient, token: StoredToken) -> AppResult<Option<TokenBundle>> {
    let refresh = RefreshToken::new(token.refresh_token);
    let res = client
        .exchange_refresh_token(&refresh)
        .request_async(async_http_client)
        .await;
    match res {
        Ok(token_res) => Ok(Some(TokenBundle {
            access_token: token_res.access_token().secret().to_string(),
            expires_at: token_res.expires_in().map(|d| {
                Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::seconds(0))
            }),
            refresh_token: None,
        })),
        Err(err) => {
            warn!("Refresh token invalid or expired: {err}");
            Ok(None)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CodeResponse {
    pub code: String,
    /// `None` when the user pasted a bare code.
    pub state: Option<String>,
}

/// Accepts either the bare authorization code or the whole redirected URL.
pub fn parse_pasted_code(input: &str) -> AppResult<CodeResponse> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::Config("no authorization code entered".into()));
    }

    match url::Url::parse(input) {
        Ok(parsed) => {
            let code = parsed
                .query_pairs()
                .find(|(k, _)| k == "code")
                .map(|(_, v)| v.to_string())
                .ok_or_else(|| AppError::Config("pasted url has no code parameter".into()))?;
            let state = parsed
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.to_string());
            Ok(CodeResponse { code, state })
        }
        Err(_) => Ok(CodeResponse {
            code: input.to_string(),
            state: None,
        }),
    }
}

async fn listen_for_code(listener: TcpListener) -> AppResult<CodeResponse> {
    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| AppError::Unexpected(format!("redirect accept failed: {e}")))?;

    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| AppError::Unexpected(format!("reading auth callback failed: {e}")))?;
    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or("");
    let path = first_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AppError::Unexpected("invalid HTTP request".into()))?;

    let mut code = parse_pasted_code(&format!("http://localhost{path}"))?;
    code.state.get_or_insert_with(String::new);

    let response =
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nAuth complete. You can close this tab.";
    let _ = stream.write_all(response.as_bytes()).await;
    Ok(code)
}

fn open_in_browser(url: &str) {
    let command = if cfg!(target_os = "macos") {
        let mut command = std::process::Command::new("open");
        command.arg(url);
        command
    } else if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("rundll32.exe");
        command.args(["url.dll,FileProtocolHandler", url]);
        command
    } else {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(url);
        command
    };
    if let Err(e) = launch_detached(command) {
        warn!("Could not auto-open browser: {e}. Open this URL manually:\n{url}");
    }
}

/// Start `command` with no stdio attached and return without waiting on it.
/// The child is reaped on a plain thread.
pub fn launch_detached(mut command: std::process::Command) -> std::io::Result<()> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    std::thread::spawn(move || {
        if let Err(e) = child.wait() {
            debug!("Browser opener exited abnormally: {e}");
        }
    });
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoredToken {
    refresh_token: String,
}

#[derive(Clone)]
struct TokenStore {
    account_id: String,
}

impl TokenStore {
    fn from_key(key: &str) -> Self {
        Self {
            account_id: key.to_string(),
        }
    }

    fn load(&self) -> AppResult<Option<StoredToken>> {
        match self.load_keyring() {
            Ok(Some(tok)) => return Ok(Some(tok)),
            Ok(None) => {}
            Err(e) => warn!("Keyring unavailable: {e}"),
        }

        Ok(self.load_file())
    }

    fn save(&self, refresh: &str) -> AppResult<()> {
        let token = StoredToken {
            refresh_token: refresh.to_string(),
        };
        let serialized =
            serde_json::to_string(&token).map_err(|e| AppError::Unexpected(format!("{e}")))?;

        if let Err(e) = self.save_keyring(&serialized) {
            warn!("Keyring save failed ({e}); writing token file as fallback");
            self.save_file(&serialized)?;
        }
        Ok(())
    }

    fn delete(&self) -> AppResult<()> {
        if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, &self.account_id) {
            let _ = entry.delete_password();
        }
        let _ = fs::remove_file(self.file_path());
        Ok(())
    }

    fn load_keyring(&self) -> Result<Option<StoredToken>, String> {
        let entry = keyring::Entry::new(SERVICE_NAME, &self.account_id)
            .map_err(|e| format!("keyring entry error: {e}"))?;
        match entry.get_password() {
            Ok(pwd) => serde_json::from_str(&pwd)
                .map(Some)
                .map_err(|e| format!("keyring token decode: {e}")),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("keyring read: {e}")),
        }
    }

    fn save_keyring(&self, serialized: &str) -> Result<(), String> {
        let entry = keyring::Entry::new(SERVICE_NAME, &self.account_id)
            .map_err(|e| format!("keyring entry error: {e}"))?;
        entry
            .set_password(serialized)
            .map_err(|e| format!("keyring write: {e}"))
    }

    fn file_path(&self) -> std::path::PathBuf {
        data_dir().join(format!("token_{}.json", &self.account_id))
    }

    fn load_file(&self) -> Option<StoredToken> {
        let raw = fs::read_to_string(self.file_path()).ok()?;
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                debug!("Ignoring unreadable token file: {e}");
                None
            }
        }
    }

    fn save_file(&self, serialized: &str) -> AppResult<()> {
        let path = self.file_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Unexpected(format!("creating token dir: {e}")))?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| AppError::Unexpected(format!("opening token file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
        }

        file.write_all(serialized.as_bytes())
            .map_err(|e| AppError::Unexpected(format!("writing token file: {e}")))?;
        file.sync_all()
            .map_err(|e| AppError::Unexpected(format!("syncing token file: {e}")))?;
        warn!(path = %path.display(), "Token saved to file because the keyring is unavailable");
        Ok(())
    }
}
