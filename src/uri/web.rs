//! `WebUrl`: a validated, normalized `http(s)` URL wrapper.

use crate::errors::GatewayError;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WebUrl(Url);

impl WebUrl {
    pub fn try_decode(input: &str) -> Result<Self, GatewayError> {
        let url = Url::parse(input).map_err(|_| invalid(input))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(input));
        }
        Ok(WebUrl(url))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn get_query(&self, key: &str) -> Option<String> {
        self.0
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Resolve `href` against this URL, as a browser would an anchor tag.
    pub fn try_join_href(&self, href: &str) -> Result<Self, GatewayError> {
        let joined = self.0.join(href).map_err(|_| invalid(href))?;
        if !matches!(joined.scheme(), "http" | "https") {
            return Err(invalid(href));
        }
        Ok(WebUrl(joined))
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }
}

impl fmt::Display for WebUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for WebUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for WebUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        WebUrl::try_decode(&s).map_err(serde::de::Error::custom)
    }
}

fn invalid(input: &str) -> GatewayError {
    GatewayError::Validation {
        type_name: "WebUrl",
        input: input.to_string(),
        regex: "http(s)://...",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        assert!(WebUrl::try_decode("ftp://example.com").is_err());
    }

    #[test]
    fn join_href_resolves_relative_paths() {
        let base = WebUrl::try_decode("https://example.com/a/b").unwrap();
        let joined = base.try_join_href("../c").unwrap();
        assert_eq!(joined.to_string(), "https://example.com/c");
    }

    #[test]
    fn get_query_reads_param() {
        let url = WebUrl::try_decode("https://example.com?v=abc123").unwrap();
        assert_eq!(url.get_query("v"), Some("abc123".to_string()));
    }
}
