//! Registry credentials.

use std::fmt;

use http::HeaderValue;
use zeroize::Zeroize;

/// A password or token which never appears in debug output.
///
/// Use [Secret::revealed] to get the underlying value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Expose the underlying value.
    pub fn revealed(&self) -> &str {
        &self.0
    }

    /// A sensitive `Bearer` header value for this token.
    pub fn bearer(&self) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        let mut header = HeaderValue::try_from(format!("Bearer {}", self.0))?;
        header.set_sensitive(true);
        Ok(header)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_owned())
    }
}

/// Create a basic authentication header value, with the password being optional.
///
/// ```rust
/// use oci_artifact::basic_auth;
///
/// let header = basic_auth("admin", Some("bitnami"));
/// assert_eq!(header.to_str().unwrap(), "Basic YWRtaW46Yml0bmFtaQ==");
/// ```
pub fn basic_auth(username: &str, password: Option<&str>) -> HeaderValue {
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{username}:");
        if let Some(password) = password {
            let _ = write!(encoder, "{password}");
        }
    }

    // Base64 output and the "Basic " prefix are always visible ASCII.
    let mut header = HeaderValue::from_bytes(&buf).unwrap_or_else(|_| HeaderValue::from_static(""));
    header.set_sensitive(true);
    header
}

/// Username and optional password for a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: Option<Secret>,
}

impl Credential {
    /// Create a credential from a username and optional password.
    pub fn new<U, P>(username: U, password: Option<P>) -> Self
    where
        U: Into<String>,
        P: Into<Secret>,
    {
        Credential {
            username: username.into(),
            password: password.map(Into::into),
        }
    }

    /// The username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password, if any.
    pub fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    /// The `Authorization: Basic ...` header for this credential.
    pub fn basic_header(&self) -> HeaderValue {
        basic_auth(&self.username, self.password.as_ref().map(Secret::revealed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_hidden_in_debug() {
        let credential = Credential::new("admin", Some("bitnami"));
        let debug = format!("{credential:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("bitnami"));
    }

    #[test]
    fn basic_header_without_password() {
        let credential = Credential::new("admin", None::<Secret>);
        let header = credential.basic_header();
        assert_eq!(header.to_str().unwrap(), "Basic YWRtaW46");
        assert!(header.is_sensitive());
    }

    #[test]
    fn bearer_header() {
        let token = Secret::from("abc123");
        assert_eq!(token.bearer().unwrap().to_str().unwrap(), "Bearer abc123");
    }
}
