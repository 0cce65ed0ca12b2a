// Enrichment provider credentials
//
// One credential slot per provider. Lookup order is the OS keychain (when
// built with `keychain`), then APPCAT_<PROVIDER>_KEY. Keys never reach
// appcat.toml and never appear in status output.

use std::env;

use appcat_catalog::CatalogError;
use serde::Serialize;

const KEYCHAIN_SERVICE: &str = "appcat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Credential slot for one enrichment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderKey {
    provider: String,
}

impl ProviderKey {
    /// Provider names are ASCII letters, digits, `-` and `_`, compared
    /// case-insensitively.
    pub fn new(provider: &str) -> Result<Self, CatalogError> {
        let provider_key = provider.trim().to_ascii_lowercase();
        let valid = !provider_key.is_empty()
            && provider_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CatalogError::Configuration(format!(
                "invalid provider name '{provider}': use letters, digits, '-' or '_'"
            )));
        }
        Ok(Self { provider: provider_key })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// e.g. `azure-openai` -> `APPCAT_AZURE_OPENAI_KEY`.
    pub fn env_var(&self) -> String {
        format!("APPCAT_{}_KEY", self.provider.to_ascii_uppercase().replace('-', "_"))
    }

    fn account(&self) -> String {
        format!("enrich/{}", self.provider)
    }

    pub fn lookup(&self) -> KeyLookup {
        let (key, source) = match self.from_keychain() {
            Some(key) => (Some(key), KeySource::Keychain),
            None => match self.from_env() {
                Some(key) => (Some(key), KeySource::Environment),
                None => (None, KeySource::None),
            },
        };
        KeyLookup {
            provider: self.provider.clone(),
            env_var: self.env_var(),
            present: key.is_some(),
            source,
            key,
        }
    }

    fn from_env(&self) -> Option<String> {
        env::var(self.env_var())
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    #[cfg(feature = "keychain")]
    fn from_keychain(&self) -> Option<String> {
        self.keychain_entry()
            .ok()?
            .get_password()
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    #[cfg(not(feature = "keychain"))]
    fn from_keychain(&self) -> Option<String> {
        None
    }

    #[cfg(feature = "keychain")]
    fn keychain_entry(&self) -> Result<keyring::Entry, String> {
        keyring::Entry::new(KEYCHAIN_SERVICE, &self.account())
            .map_err(|e| format!("keychain entry for {}: {e}", self.provider))
    }

    /// Save a key in the keychain.
    #[cfg(feature = "keychain")]
    pub fn store(&self, key: &str) -> Result<(), String> {
        self.keychain_entry()?
            .set_password(key.trim())
            .map_err(|e| format!("failed to store key for {}: {e}", self.provider))
    }

    #[cfg(not(feature = "keychain"))]
    pub fn store(&self, _key: &str) -> Result<(), String> {
        Err(format!(
            "built without keychain support; set {} instead",
            self.env_var()
        ))
    }

    /// Remove the keychain entry. A missing entry is not an error.
    #[cfg(feature = "keychain")]
    pub fn delete(&self) -> Result<(), String> {
        match self.keychain_entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("failed to delete key for {}: {e}", self.provider)),
        }
    }

    #[cfg(not(feature = "keychain"))]
    pub fn delete(&self) -> Result<(), String> {
        Err(format!(
            "built without keychain support; unset {} instead",
            self.env_var()
        ))
    }
}

/// Result of resolving a provider's key. Serializes without the key itself.
#[derive(Debug, Clone, Serialize)]
pub struct KeyLookup {
    pub provider: String,
    #[serde(rename = "env")]
    pub env_var: String,
    pub present: bool,
    pub source: KeySource,
    #[serde(skip)]
    pub key: Option<String>,
}

impl KeyLookup {
    pub fn describe(&self) -> String {
        if self.present {
            format!("{}: present (source: {})", self.provider, self.source.as_str())
        } else {
            format!(
                "{}: missing (set {} or run `appcat key set {}`)",
                self.provider, self.env_var, self.provider
            )
        }
    }
}

/// Shorthand for `ProviderKey::new(provider)?.lookup()`.
pub fn get_api_key(provider: &str) -> Result<KeyLookup, CatalogError> {
    Ok(ProviderKey::new(provider)?.lookup())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_names_are_shell_safe() {
        let key = ProviderKey::new(" Azure-OpenAI ").unwrap();
        assert_eq!(key.provider(), "azure-openai");
        assert_eq!(key.env_var(), "APPCAT_AZURE_OPENAI_KEY");
        assert_eq!(key.account(), "enrich/azure-openai");
    }

    #[test]
    fn test_invalid_provider_names_are_config_errors() {
        for bad in ["", "  ", "open ai", "openai/v1", "ключ"] {
            assert!(
                matches!(ProviderKey::new(bad), Err(CatalogError::Configuration(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_key_lookup_from_env() {
        env::set_var("APPCAT_LOOKUP_TEST_KEY", " test-key-123 ");
        let lookup = get_api_key("lookup_test").unwrap();
        env::remove_var("APPCAT_LOOKUP_TEST_KEY");

        // A developer keychain could hold this slot; only the env path is asserted.
        if lookup.source == KeySource::Environment {
            assert_eq!(lookup.key.as_deref(), Some("test-key-123"));
        }
        assert!(lookup.present);
    }

    #[test]
    fn test_blank_env_key_counts_as_missing() {
        env::set_var("APPCAT_BLANK_TEST_KEY", "   ");
        let key = ProviderKey::new("blank_test").unwrap();
        assert_eq!(key.from_env(), None);
        env::remove_var("APPCAT_BLANK_TEST_KEY");
    }

    #[test]
    fn test_status_never_contains_the_key() {
        let lookup = KeyLookup {
            provider: "openai".into(),
            env_var: "APPCAT_OPENAI_KEY".into(),
            present: true,
            source: KeySource::Environment,
            key: Some("sk-secret".into()),
        };
        assert_eq!(lookup.describe(), "openai: present (source: environment)");
        let json = serde_json::to_string(&lookup).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("\"source\":\"environment\""));
        assert!(json.contains("\"env\":\"APPCAT_OPENAI_KEY\""));
    }

    #[test]
    fn test_missing_key_explains_how_to_set_it() {
        let lookup = KeyLookup {
            provider: "openai".into(),
            env_var: "APPCAT_OPENAI_KEY".into(),
            present: false,
            source: KeySource::None,
            key: None,
        };
        assert_eq!(
            lookup.describe(),
            "openai: missing (set APPCAT_OPENAI_KEY or run `appcat key set openai`)"
        );
    }
}
