//! Configuration types for the webhook adapter
//!
//! Built once at process start and handed to the [`Reconciler`](crate::Reconciler)
//! constructor; nothing in the core reads configuration from the environment.

use serde::{Deserialize, Serialize};

use crate::domain_filter::DomainFilter;

/// Vendor account and scoping configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// NextDNS API key
    /// ⚠️ NEVER log this value
    pub api_key: String,

    /// NextDNS profile whose rewrites are managed
    pub profile_id: String,

    /// Names this adapter may read or write
    #[serde(default)]
    pub domain_filter: DomainFilter,

    /// Plan and report changes without calling the vendor
    #[serde(default)]
    pub dry_run: bool,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<REDACTED>")
            .field("profile_id", &self.profile_id)
            .field("domain_filter", &self.domain_filter)
            .field("dry_run", &self.dry_run)
            .field("engine", &self.engine)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new configuration with default engine settings
    pub fn new(api_key: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            profile_id: profile_id.into(),
            domain_filter: DomainFilter::default(),
            dry_run: false,
            engine: EngineConfig::default(),
        }
    }

    /// Set the domain filter
    pub fn with_domain_filter(mut self, domain_filter: DomainFilter) -> Self {
        self.domain_filter = domain_filter;
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the engine settings
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_key.trim().is_empty() {
            return Err(crate::Error::config("NextDNS API key cannot be empty"));
        }

        if self.profile_id.trim().is_empty() {
            return Err(crate::Error::config("NextDNS profile id cannot be empty"));
        }

        if self.profile_id.contains('/') {
            return Err(crate::Error::config(format!(
                "NextDNS profile id contains invalid characters: {}",
                self.profile_id
            )));
        }

        self.engine.validate()
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of hostnames whose vendor calls run concurrently
    ///
    /// Calls for the same hostname are always serialized.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(1..=64).contains(&self.max_concurrency) {
            return Err(crate::Error::config(format!(
                "max_concurrency must be between 1 and 64, got {}",
                self.max_concurrency
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}
