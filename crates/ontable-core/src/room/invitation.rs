//! Invitation links embedded in QR codes and shared as text.
//!
//! Format: `ontable://join?code=<code>&host=<percent-encoded display name>`

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::code::{CodeError, JoinCode};

/// URL scheme of invitation links
pub const INVITE_SCHEME: &str = "ontable";
const INVITE_ACTION: &str = "join";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvitationError {
    #[error("not an {INVITE_SCHEME}:// link")]
    WrongScheme,
    #[error("unsupported invitation action '{0}'")]
    WrongAction(String),
    #[error("invitation has no join code")]
    MissingCode,
    #[error("invitation parameter '{0}' is not valid percent-encoded UTF-8")]
    BadEncoding(String),
    #[error(transparent)]
    InvalidCode(#[from] CodeError),
}

/// Everything a guest needs to find a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub code: JoinCode,
    /// Display name of the hosting device, informational only
    pub host_name: Option<String>,
}

impl Invitation {
    #[must_use]
    pub fn new(code: JoinCode, host_name: impl Into<String>) -> Self {
        Self {
            code,
            host_name: Some(host_name.into()),
        }
    }

    /// Render as a link suitable for a QR code
    #[must_use]
    pub fn encode(&self) -> String {
        let mut link = format!("{INVITE_SCHEME}://{INVITE_ACTION}?code={}", self.code);
        if let Some(host) = &self.host_name {
            link.push_str("&host=");
            link.push_str(&urlencoding::encode(host));
        }
        link
    }

    /// Parse an invitation link.
    pub fn decode(link: &str) -> Result<Self, InvitationError> {
        let link = link.trim();
        let (scheme, rest) = link
            .split_once("://")
            .ok_or(InvitationError::WrongScheme)?;
        if !scheme.eq_ignore_ascii_case(INVITE_SCHEME) {
            return Err(InvitationError::WrongScheme);
        }

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (action, query) = rest.split_once('?').unwrap_or((rest, ""));
        let action = action.trim_end_matches('/');
        if action != INVITE_ACTION {
            return Err(InvitationError::WrongAction(action.to_string()));
        }

        let mut code = None;
        let mut host_name = None;
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(value)
                .map_err(|_| InvitationError::BadEncoding(key.to_string()))?;
            match key {
                "code" => code = Some(value.into_owned()),
                "host" => host_name = Some(value.into_owned()),
                _ => {}
            }
        }

        let code = code
            .filter(|code| !code.trim().is_empty())
            .ok_or(InvitationError::MissingCode)?;
        Ok(Self {
            code: JoinCode::parse(&code)?,
            host_name: host_name.filter(|name| !name.is_empty()),
        })
    }

    /// Accept either a full invitation link or a bare, typed join code
    pub fn code_from_input(input: &str) -> Result<JoinCode, InvitationError> {
        if input.contains("://") {
            return Self::decode(input).map(|invitation| invitation.code);
        }
        Ok(JoinCode::parse(input)?)
    }
}

impl fmt::Display for Invitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Invitation {
    type Err = InvitationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
