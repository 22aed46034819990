//! Culture (locale) selection stage
//!
//! Resolves a culture from the message headers, falling back to a configured
//! default, and makes it the current culture of the task for the inner call.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use conduit_domain::constants::DEFAULT_CULTURE_HEADER;
use conduit_domain::{ConduitError, Headers};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{trace, warn};

use super::stage::{Next, Stage};
use crate::error::ConsumerResult;

static CULTURE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").ok());

tokio::task_local! {
    static CURRENT_CULTURE: Culture;
}

/// A language tag such as `en`, `fr-FR` or `zh-Hant-TW`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Culture(String);

impl Culture {
    pub fn parse(code: &str) -> Result<Self, ConduitError> {
        let code = code.trim();
        let valid = CULTURE_PATTERN.as_ref().is_some_and(|pattern| pattern.is_match(code));
        if valid {
            Ok(Self(code.to_string()))
        } else {
            Err(ConduitError::InvalidInput(format!("Invalid culture code: '{code}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag (`fr` for `fr-CA`)
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl FromStr for Culture {
    type Err = ConduitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Culture of the message being processed on this task
pub fn current() -> Option<Culture> {
    CURRENT_CULTURE.try_with(Culture::clone).ok()
}

/// Run `fut` with `culture` as the current culture
pub async fn with_culture<F: std::future::Future>(culture: Culture, fut: F) -> F::Output {
    CURRENT_CULTURE.scope(culture, fut).await
}

#[derive(Debug, Clone)]
pub struct CultureStage {
    header: String,
    default: Option<Culture>,
}

impl Default for CultureStage {
    fn default() -> Self {
        Self { header: DEFAULT_CULTURE_HEADER.to_string(), default: None }
    }
}

impl CultureStage {
    pub fn new(header: impl Into<String>, default: Option<Culture>) -> Self {
        Self { header: header.into(), default }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn default_culture(&self) -> Option<&Culture> {
        self.default.as_ref()
    }

    /// Header value if valid, else the default
    pub fn resolve(&self, headers: &Headers) -> Option<Culture> {
        match headers.get(&self.header).map(Culture::parse) {
            Some(Ok(culture)) => Some(culture),
            Some(Err(err)) => {
                warn!(header = %self.header, error = %err, "Ignoring invalid culture header");
                self.default.clone()
            }
            None => self.default.clone(),
        }
    }
}

#[async_trait]
impl Stage for CultureStage {
    fn name(&self) -> &'static str {
        "culture"
    }

    async fn process(&self, mut headers: Headers, next: Next<'_>) -> ConsumerResult {
        let Some(culture) = self.resolve(&headers) else {
            return next.run(headers).await;
        };

        // Inner stages and the handler read the resolved value from headers too.
        headers.insert(self.header.clone(), culture.to_string());
        trace!(culture = %culture, "Culture selected");
        with_culture(culture, next.run(headers)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_codes() {
        for code in ["en", "fr-FR", "zh-Hant-TW", "es-419", "haw"] {
            assert_eq!(Culture::parse(code).unwrap().as_str(), code);
        }
        assert_eq!(Culture::parse("pt-BR").unwrap().language(), "pt");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for code in ["", "e", "english", "en_US", "en-", "12-AB"] {
            assert!(Culture::parse(code).is_err(), "{code} should be rejected");
        }
    }

    #[test]
    fn test_resolve_prefers_valid_header() {
        let stage = CultureStage::new("culture", Some(Culture::parse("en-GB").unwrap()));

        let headers = Headers::new().with("culture", "de-DE");
        assert_eq!(stage.resolve(&headers).unwrap().as_str(), "de-DE");

        let headers = Headers::new().with("culture", "not a culture");
        assert_eq!(stage.resolve(&headers).unwrap().as_str(), "en-GB");

        assert_eq!(stage.resolve(&Headers::new()).unwrap().as_str(), "en-GB");
        assert!(CultureStage::default().resolve(&Headers::new()).is_none());
    }

    #[tokio::test]
    async fn test_current_is_scoped() {
        assert!(current().is_none());
        let inside = with_culture(Culture::parse("it").unwrap(), async { current() }).await;
        assert_eq!(inside.unwrap().as_str(), "it");
        assert!(current().is_none());
    }
}
