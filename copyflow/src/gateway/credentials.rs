//! API key resolution.

use std::fmt;
use std::sync::Arc;

/// Environment variables consulted, in order, when no key is supplied.
pub const ENV_API_KEYS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// An API key. Its `Debug` output never shows the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key, returning `None` for a blank one.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    /// Returns the secret for use in a request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Keys supplied by the caller of one generation.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Key passed with this specific request.
    pub explicit: Option<ApiKey>,
    /// Key stored in the session settings.
    pub session: Option<ApiKey>,
}

impl Credentials {
    /// Credentials with no keys; only the environment can supply one.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the per-request key. Blank keys are ignored.
    #[must_use]
    pub fn with_explicit(mut self, key: impl Into<String>) -> Self {
        self.explicit = ApiKey::new(key);
        self
    }

    /// Sets the session key. Blank keys are ignored.
    #[must_use]
    pub fn with_session(mut self, key: impl Into<String>) -> Self {
        self.session = ApiKey::new(key);
        self
    }
}

/// Where the key of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Passed with the request.
    Explicit,
    /// Stored in the session.
    Session,
    /// Read from the named environment variable.
    Environment(&'static str),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Session => write!(f, "session"),
            Self::Environment(var) => write!(f, "env:{var}"),
        }
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves the key of a request: explicit, then session, then environment.
#[derive(Clone)]
pub struct CredentialResolver {
    lookup: EnvLookup,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    /// Resolver reading the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Resolver with a custom environment lookup.
    #[must_use]
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// Resolver that never finds an environment key.
    #[must_use]
    pub fn without_env() -> Self {
        Self::with_lookup(|_| None)
    }

    /// Returns the effective key and where it came from.
    #[must_use]
    pub fn resolve(&self, credentials: &Credentials) -> Option<(ApiKey, CredentialSource)> {
        if let Some(key) = &credentials.explicit {
            return Some((key.clone(), CredentialSource::Explicit));
        }
        if let Some(key) = &credentials.session {
            return Some((key.clone(), CredentialSource::Session));
        }
        ENV_API_KEYS.into_iter().find_map(|var| {
            (self.lookup)(var)
                .and_then(ApiKey::new)
                .map(|key| (key, CredentialSource::Environment(var)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> CredentialResolver {
        CredentialResolver::with_lookup(move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v).to_string())
        })
    }

    #[test]
    fn test_resolution_order() {
        let resolver = env(&[("GOOGLE_API_KEY", "g"), ("GEMINI_API_KEY", "m")]);

        let creds = Credentials::none().with_explicit("e").with_session("s");
        let (key, source) = resolver.resolve(&creds).unwrap();
        assert_eq!((key.expose(), source), ("e", CredentialSource::Explicit));

        let creds = Credentials::none().with_session("s");
        let (key, source) = resolver.resolve(&creds).unwrap();
        assert_eq!((key.expose(), source), ("s", CredentialSource::Session));

        let (key, source) = resolver.resolve(&Credentials::none()).unwrap();
        assert_eq!(key.expose(), "g");
        assert_eq!(source, CredentialSource::Environment("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_gemini_env_fallback() {
        let resolver = env(&[("GOOGLE_API_KEY", "  "), ("GEMINI_API_KEY", "m")]);
        let (key, source) = resolver.resolve(&Credentials::none()).unwrap();
        assert_eq!(key.expose(), "m");
        assert_eq!(source.to_string(), "env:GEMINI_API_KEY");
    }

    #[test]
    fn test_blank_keys_are_absent() {
        let resolver = CredentialResolver::without_env();
        let creds = Credentials::none().with_explicit("").with_session("   ");
        assert!(resolver.resolve(&creds).is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = ApiKey::new("AIza-secret").unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        let creds = Credentials::none().with_session("AIza-secret");
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
