//! Server specification consumed by every target.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StitchError;

/// How a client talks to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Http,
    Sse,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
            Transport::Sse => "sse",
        }
    }

    /// Remote transports address an endpoint instead of spawning a process.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Transport::Stdio)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = StitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "streamable-http" => Ok(Transport::Http),
            "sse" => Ok(Transport::Sse),
            other => Err(StitchError::InvalidSpec(format!(
                "unknown transport '{}' (expected stdio, http or sse)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    None,
    Bearer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub strategy: AuthStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl Authentication {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            strategy: AuthStrategy::Bearer,
            credential: Some(token.into()),
        }
    }
}

/// A server entry to add to or remove from a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    pub id: String,
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
}

impl ServerSpec {
    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            transport: Transport::Stdio,
            endpoint: None,
            command: Some(command.into()),
            args,
            env: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_ms: None,
            authentication: None,
        }
    }

    pub fn remote(id: impl Into<String>, transport: Transport, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transport,
            endpoint: Some(endpoint.into()),
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_ms: None,
            authentication: None,
        }
    }

    /// A spec carrying only an id, enough to address an entry for removal.
    pub fn reference(id: impl Into<String>) -> Self {
        Self::stdio(id, String::new(), Vec::new())
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.authentication = Some(Authentication::bearer(token));
        self
    }

    pub fn is_remote(&self) -> bool {
        self.transport.is_remote()
    }

    pub fn validate_id(&self) -> Result<(), StitchError> {
        if self.id.trim().is_empty() {
            return Err(StitchError::InvalidSpec("server id cannot be empty".to_string()));
        }
        if self.id.chars().any(char::is_control) {
            return Err(StitchError::InvalidSpec(format!(
                "server id '{}' contains control characters",
                self.id.escape_debug()
            )));
        }
        Ok(())
    }

    /// Structural validation, run before any file is touched.
    ///
    /// `command` is required iff the transport is stdio; `endpoint` is required, and
    /// must be an http(s) URL, iff the transport is remote.
    pub fn validate(&self) -> Result<(), StitchError> {
        self.validate_id()?;
        match self.transport {
            Transport::Stdio => {
                match self.command.as_deref() {
                    Some(command) if !command.trim().is_empty() => {}
                    _ => {
                        return Err(StitchError::InvalidSpec(format!(
                            "server '{}' uses stdio but has no command",
                            self.id
                        )));
                    }
                }
                if self.endpoint.is_some() {
                    return Err(StitchError::InvalidSpec(format!(
                        "server '{}' uses stdio but also sets an endpoint",
                        self.id
                    )));
                }
            }
            Transport::Http | Transport::Sse => {
                let endpoint = self.endpoint.as_deref().ok_or_else(|| {
                    StitchError::InvalidSpec(format!(
                        "server '{}' uses {} but has no endpoint",
                        self.id, self.transport
                    ))
                })?;
                let url = url::Url::parse(endpoint).map_err(|e| {
                    StitchError::InvalidSpec(format!(
                        "server '{}' has a malformed endpoint '{}': {}",
                        self.id, endpoint, e
                    ))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(StitchError::InvalidSpec(format!(
                        "server '{}' endpoint must use http or https, got '{}'",
                        self.id,
                        url.scheme()
                    )));
                }
                if self.command.is_some() {
                    return Err(StitchError::InvalidSpec(format!(
                        "server '{}' uses {} but also sets a command",
                        self.id, self.transport
                    )));
                }
            }
        }
        Ok(())
    }

    /// Explicit bearer credential from `authentication`, if any.
    pub fn explicit_bearer(&self) -> Option<&str> {
        self.authentication
            .as_ref()
            .filter(|auth| auth.strategy == AuthStrategy::Bearer)
            .and_then(|auth| auth.credential.as_deref())
    }

    /// Separate the bearer credential from the forwarded headers.
    ///
    /// The explicit credential wins over one parsed from an `Authorization` header.
    /// A bearer-valued `Authorization` header is always stripped from the returned
    /// set; any other `Authorization` value is forwarded untouched.
    pub fn split_bearer(&self) -> (Option<String>, BTreeMap<String, String>) {
        let mut headers = self.headers.clone();
        let mut token = self.explicit_bearer().map(str::to_string);

        let bearer_header = headers
            .iter()
            .find(|(name, value)| is_authorization_header(name) && parse_bearer(value).is_some())
            .map(|(name, value)| (name.clone(), value.clone()));

        if let Some((name, value)) = bearer_header {
            if token.is_none() {
                token = parse_bearer(&value).map(str::to_string);
            }
            headers.remove(&name);
        }

        (token, headers)
    }

    /// Headers with an explicit bearer credential folded back into `Authorization`.
    pub fn headers_with_bearer(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        if let Some(token) = self.explicit_bearer() {
            let has_authorization = headers.keys().any(|name| is_authorization_header(name));
            if !has_authorization {
                headers.insert("Authorization".to_string(), format!("Bearer {}", token));
            }
        }
        headers
    }
}

pub fn is_authorization_header(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("authorization")
}

/// Extract `<token>` from a `Bearer <token>` header value, case-insensitively.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let value = value.trim();
    let (scheme, rest) = value.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_requires_command() {
        let mut spec = ServerSpec::stdio("local", "npx", vec![]);
        assert!(spec.validate().is_ok());

        spec.command = None;
        assert!(spec.validate().is_err());

        spec.command = Some("   ".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn stdio_rejects_endpoint() {
        let mut spec = ServerSpec::stdio("local", "npx", vec![]);
        spec.endpoint = Some("https://example.com/mcp".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn remote_requires_well_formed_endpoint() {
        let ok = ServerSpec::remote("remote", Transport::Http, "https://api.example.com/mcp");
        assert!(ok.validate().is_ok());

        let malformed = ServerSpec::remote("remote", Transport::Sse, "not a url");
        assert!(malformed.validate().is_err());

        let wrong_scheme = ServerSpec::remote("remote", Transport::Http, "ftp://example.com");
        assert!(wrong_scheme.validate().is_err());

        let mut missing = ServerSpec::remote("remote", Transport::Http, "https://x");
        missing.endpoint = None;
        assert!(missing.validate().is_err());
    }

    #[test]
    fn remote_rejects_command() {
        let mut spec = ServerSpec::remote("remote", Transport::Http, "https://x/y");
        spec.command = Some("npx".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn empty_id_is_invalid() {
        let spec = ServerSpec::stdio("  ", "npx", vec![]);
        assert!(matches!(spec.validate(), Err(StitchError::InvalidSpec(_))));
    }

    #[test]
    fn parse_bearer_is_case_insensitive() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer   abc  "), Some("abc"));
        assert_eq!(parse_bearer("BEARER abc"), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer a b"), None);
    }

    #[test]
    fn split_bearer_strips_authorization_header() {
        let spec = ServerSpec::remote("remote", Transport::Http, "http://x/y")
            .with_header("authorization", "Bearer abc")
            .with_header("X-Region", "eu");

        let (token, headers) = spec.split_bearer();
        assert_eq!(token.as_deref(), Some("abc"));
        assert!(!headers.contains_key("authorization"));
        assert_eq!(headers.get("X-Region").map(String::as_str), Some("eu"));
    }

    #[test]
    fn split_bearer_prefers_explicit_credential() {
        let spec = ServerSpec::remote("remote", Transport::Http, "http://x/y")
            .with_header("Authorization", "Bearer from-header")
            .with_bearer("explicit");

        let (token, headers) = spec.split_bearer();
        assert_eq!(token.as_deref(), Some("explicit"));
        assert!(headers.is_empty());
    }

    #[test]
    fn split_bearer_forwards_non_bearer_authorization() {
        let spec = ServerSpec::remote("remote", Transport::Http, "http://x/y")
            .with_header("Authorization", "Basic dXNlcjpwdw==");

        let (token, headers) = spec.split_bearer();
        assert!(token.is_none());
        assert!(headers.contains_key("Authorization"));
    }

    #[test]
    fn headers_with_bearer_reassembles_authorization() {
        let spec = ServerSpec::remote("remote", Transport::Http, "http://x/y").with_bearer("abc");
        let headers = spec.headers_with_bearer();
        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }

    #[test]
    fn transport_from_str() {
        assert_eq!("SSE".parse::<Transport>().expect("parse"), Transport::Sse);
        assert_eq!(
            "streamable-http".parse::<Transport>().expect("parse"),
            Transport::Http
        );
        assert!("websocket".parse::<Transport>().is_err());
    }

    #[test]
    fn spec_serializes_camel_case() {
        let spec = ServerSpec::remote("remote", Transport::Sse, "https://x/y").with_timeout_ms(5000);
        let json = serde_json::to_value(&spec).expect("serialize spec");
        assert_eq!(json["timeoutMs"], 5000);
        assert_eq!(json["transport"], "sse");
        assert!(json.get("command").is_none());
    }
}
