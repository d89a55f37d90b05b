//! Addresses of the notification server's WebSocket routes.
//!
//! The server exposes one route per audience:
//!
//! - `/ws/admin` for the staff dashboard
//! - `/ws/patient/{code}` for a single patient, keyed by their check-in code

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::Result;
use crate::error::Error;

/// Endpoint used by the staff dashboard in a local deployment.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws/admin";

/// Environment variable the demos read the endpoint from.
pub const ENDPOINT_VAR: &str = "WAITLIST_WS_ENDPOINT";

/// Length of the check-in code handed to patients.
pub const PATIENT_CODE_LEN: usize = 3;

const ADMIN_PATH: &str = "ws/admin";
const PATIENT_PATH: &str = "ws/patient/";

/// A validated `ws://` or `wss://` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parse and validate an arbitrary WebSocket address.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        Self::try_from(url)
    }

    /// The dashboard route on the server at `base` (for example `ws://localhost:8080`).
    pub fn admin(base: &str) -> Result<Self> {
        Self::parse(base)?.join(ADMIN_PATH)
    }

    /// The route for the patient holding check-in `code` on the server at `base`.
    ///
    /// Codes are [`PATIENT_CODE_LEN`] uppercase ASCII letters or digits.
    pub fn patient(base: &str, code: &str) -> Result<Self> {
        validate_patient_code(code)?;
        Self::parse(base)?.join(&format!("{PATIENT_PATH}{code}"))
    }

    /// Borrow the address as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }

    fn join(&self, path: &str) -> Result<Self> {
        let mut base = self.0.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Self::try_from(base.join(path)?)
    }
}

impl TryFrom<Url> for Endpoint {
    type Error = Error;

    fn try_from(url: Url) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => {}
            scheme => {
                return Err(Error::validation(format!(
                    "unsupported scheme `{scheme}`, expected `ws` or `wss`"
                )));
            }
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::validation(format!("missing host in `{url}`")));
        }

        Ok(Self(url))
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

fn validate_patient_code(code: &str) -> Result<()> {
    let well_formed = code.len() == PATIENT_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());

    if well_formed {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "patient code must be {PATIENT_CODE_LEN} uppercase letters or digits, got `{code}`"
        )))
    }
}
