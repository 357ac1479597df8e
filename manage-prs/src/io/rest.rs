//! Plain HTTP calls: the repository existence probe and the registry download.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use tracing::{debug, instrument, warn};

use crate::core::registry::{RegistryEntry, parse_registry};
use crate::core::types::RepoRef;
use crate::io::config::ManageConfig;

/// Environment variable holding the code host token.
pub const TOKEN_ENV: &str = "GH_TOKEN";

const AGENT: &str = "manage-prs-script";
const API_ACCEPT: &str = "application/vnd.github.v3+json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of asking the code host whether a repository exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoProbe {
    Exists,
    Missing,
    /// The host refused to answer (rate limit); callers proceed as if it exists.
    RateLimited,
}

pub trait RepositoryCheck {
    fn probe(&self, repo: &RepoRef) -> Result<RepoProbe>;
}

pub trait RegistrySource {
    fn fetch(&self) -> Result<Vec<RegistryEntry>>;
}

/// Blocking HTTP client for the code host API and the registry.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    api_base: String,
    registry_url: String,
    token: Option<String>,
}

impl RestClient {
    /// Build a client from config, reading the token from `GH_TOKEN`.
    pub fn from_config(cfg: &ManageConfig) -> Result<Self> {
        let token = env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
        Self::new(&cfg.api_base, &cfg.registry_url, token)
    }

    pub fn new(api_base: &str, registry_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            registry_url: registry_url.to_string(),
            token,
        })
    }
}

impl RepositoryCheck for RestClient {
    #[instrument(skip_all, fields(repo = %repo))]
    fn probe(&self, repo: &RepoRef) -> Result<RepoProbe> {
        let url = format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.name);
        let mut req = self
            .client
            .get(&url)
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, API_ACCEPT);
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("token {token}"));
        }
        let resp = req.send().with_context(|| format!("request {url}"))?;
        let status = resp.status();
        debug!(status = status.as_u16(), "repository probe");
        match status {
            StatusCode::OK => Ok(RepoProbe::Exists),
            StatusCode::NOT_FOUND => Ok(RepoProbe::Missing),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                warn!(status = status.as_u16(), "repository probe rate limited, continuing");
                Ok(RepoProbe::RateLimited)
            }
            other => bail!("repository probe for {repo} failed with HTTP {}", other.as_u16()),
        }
    }
}

impl RegistrySource for RestClient {
    #[instrument(skip_all, fields(url = %self.registry_url))]
    fn fetch(&self) -> Result<Vec<RegistryEntry>> {
        let resp = self
            .client
            .get(&self.registry_url)
            .header(USER_AGENT, AGENT)
            .send()
            .with_context(|| format!("request {}", self.registry_url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!(
                "registry download from {} failed with HTTP {}",
                self.registry_url,
                status.as_u16()
            );
        }
        let body = resp.text().context("read registry body")?;
        let entries = parse_registry(&body)?;
        debug!(entries = entries.len(), "registry loaded");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    /// Serve one canned HTTP response and hand back the request head.
    fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).expect("read") == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            reader
                .get_mut()
                .write_all(response.as_bytes())
                .expect("write");
            head
        });
        (base, handle)
    }

    fn repo() -> RepoRef {
        RepoRef::parse("acme/ioBroker.foo").expect("repo")
    }

    #[test]
    fn probe_maps_status_codes() {
        for (status, expected) in [
            ("200 OK", RepoProbe::Exists),
            ("404 Not Found", RepoProbe::Missing),
            ("403 Forbidden", RepoProbe::RateLimited),
        ] {
            let (base, server) = serve_once(status, "{}");
            let client = RestClient::new(&base, "unused", None).expect("client");
            assert_eq!(client.probe(&repo()).expect("probe"), expected);
            server.join().expect("server");
        }
    }

    #[test]
    fn probe_fails_on_server_error() {
        let (base, server) = serve_once("500 Internal Server Error", "{}");
        let client = RestClient::new(&base, "unused", None).expect("client");
        let err = client.probe(&repo()).expect_err("error");
        assert!(err.to_string().contains("HTTP 500"));
        server.join().expect("server");
    }

    #[test]
    fn probe_sends_token_and_agent() {
        let (base, server) = serve_once("200 OK", "{}");
        let client =
            RestClient::new(&base, "unused", Some("secret".to_string())).expect("client");
        client.probe(&repo()).expect("probe");
        let head = server.join().expect("server").to_ascii_lowercase();
        assert!(head.starts_with("get /repos/acme/iobroker.foo "));
        assert!(head.contains("authorization: token secret"));
        assert!(head.contains("user-agent: manage-prs-script"));
    }

    #[test]
    fn fetch_parses_registry() {
        let body = r#"{"_repoInfo": {}, "foo": {"meta": "https://raw.githubusercontent.com/acme/ioBroker.foo/master/io-package.json"}}"#;
        let (base, server) = serve_once("200 OK", body);
        let client = RestClient::new("unused", &format!("{base}/sources.json"), None)
            .expect("client");
        let entries = client.fetch().expect("fetch");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].owner(), Some("acme"));
        server.join().expect("server");
    }
}
