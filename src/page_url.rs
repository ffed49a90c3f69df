//! URL normalization and entity (registrable domain) extraction.
//!
//! Everything that reaches the ledger or the visit cache goes through
//! [`PageUrl::parse`]; raw browser URLs are untrusted.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("invalid protocol '{0}'")]
    InvalidProtocol(String),
    #[error("invalid domain '{0}'")]
    InvalidDomain(String),
}

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

const RESERVED_SUFFIXES: &[&str] = &["local", "localhost", "test", "example", "invalid", "onion"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageUrl {
    url: String,
    host: String,
    path: String,
    entity: String,
}

impl PageUrl {
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let mut parsed = Url::parse(raw.trim()).map_err(|_| UrlError::InvalidUrl(raw.to_string()))?;

        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(UrlError::InvalidProtocol(parsed.scheme().to_string()));
        }

        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) | None => {
                return Err(UrlError::InvalidDomain(raw.to_string()))
            }
        };
        let entity = entity_of(&host)?;

        parsed.set_fragment(None);
        // Credentials never identify a page.
        let _ = parsed.set_username("");
        let _ = parsed.set_password(None);

        Ok(Self {
            url: parsed.to_string(),
            path: parsed.path().to_string(),
            host,
            entity,
        })
    }

    /// Canonical url used to attribute a whole entity (history visits).
    pub fn for_entity(entity: &str) -> Result<Self, UrlError> {
        Self::parse(&format!("http://{entity}/"))
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

impl std::fmt::Display for PageUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Registrable domain (eTLD+1) of a host name.
pub fn entity_of(host: &str) -> Result<String, UrlError> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();

    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(UrlError::InvalidDomain(host));
    }

    let tld = labels[labels.len() - 1];
    if RESERVED_SUFFIXES.contains(&tld) {
        return Err(UrlError::InvalidDomain(host));
    }

    // Public suffix list lookup; a bare suffix has no registrable domain.
    let entity = psl::domain_str(&host).map(str::to_string);
    entity.ok_or(UrlError::InvalidDomain(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_credentials() {
        let page = PageUrl::parse("https://user:pw@Blog.Example.COM/post?id=3#comments").unwrap();
        assert_eq!(page.as_str(), "https://blog.example.com/post?id=3");
        assert_eq!(page.host(), "blog.example.com");
        assert_eq!(page.path(), "/post");
        assert_eq!(page.entity(), "example.com");
    }

    #[test]
    fn rejects_non_web_schemes() {
        assert_eq!(
            PageUrl::parse("chrome://extensions/"),
            Err(UrlError::InvalidProtocol("chrome".into()))
        );
        assert!(matches!(
            PageUrl::parse("file:///etc/hosts"),
            Err(UrlError::InvalidProtocol(_))
        ));
    }

    #[test]
    fn rejects_addresses_and_reserved_hosts() {
        assert!(matches!(PageUrl::parse("http://127.0.0.1/"), Err(UrlError::InvalidDomain(_))));
        assert!(matches!(PageUrl::parse("http://localhost:8080/"), Err(UrlError::InvalidDomain(_))));
        assert!(matches!(PageUrl::parse("http://printer.local/"), Err(UrlError::InvalidDomain(_))));
        assert!(matches!(PageUrl::parse("not a url"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn multi_label_suffixes() {
        assert_eq!(entity_of("news.bbc.co.uk").unwrap(), "bbc.co.uk");
        assert_eq!(entity_of("someone.github.io").unwrap(), "someone.github.io");
        assert!(entity_of("co.uk").is_err());
        assert_eq!(entity_of("www.youtube.com").unwrap(), "youtube.com");
    }

    #[test]
    fn country_second_levels_keep_sites_apart() {
        assert_eq!(entity_of("www.example.co.il").unwrap(), "example.co.il");
        assert_eq!(entity_of("shop.example.com.pl").unwrap(), "example.com.pl");
        assert_eq!(entity_of("a.example.gv.at").unwrap(), "example.gv.at");
        assert_ne!(entity_of("one.co.il").unwrap(), entity_of("two.co.il").unwrap());
        assert!(entity_of("com.pl").is_err());
    }

    #[test]
    fn entity_url_is_canonical() {
        let page = PageUrl::for_entity("example.org").unwrap();
        assert_eq!(page.as_str(), "http://example.org/");
        assert_eq!(page.entity(), "example.org");
    }
}
