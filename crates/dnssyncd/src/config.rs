//! Daemon configuration
//!
//! Every flag can also be set from the environment: `--profile-id abc123`
//! is equivalent to `NEXTDNS_WEBHOOK_PROFILE_ID=abc123`.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use dnssync_core::{DomainFilter, EngineConfig, ProviderConfig};
use dnssync_provider_nextdns::NEXTDNS_API_BASE;
use std::net::SocketAddr;
use std::time::Duration;

macro_rules! env_prefix {
    () => {
        "NEXTDNS_WEBHOOK_"
    };
}

/// Output format of the log lines
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Maximum log level
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[value(alias = "warning")]
    Warn,
    #[value(aliases = ["fatal", "panic"])]
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Application configuration
#[derive(Clone, Parser)]
#[command(
    name = "dnssyncd",
    version,
    about = "A webhook for ExternalDNS to sync records with NextDNS rewrites",
    long_about = None
)]
pub struct Config {
    /// Limit possible target zones by a domain suffix; specify multiple times or comma-separate
    #[arg(
        long,
        value_name = "DOMAIN",
        value_delimiter = ',',
        env = concat!(env_prefix!(), "DOMAIN_FILTER")
    )]
    pub domain_filter: Vec<String>,

    /// Exclude subdomains of the domain filter; specify multiple times or comma-separate
    #[arg(
        long,
        value_name = "DOMAIN",
        value_delimiter = ',',
        env = concat!(env_prefix!(), "EXCLUDE_DOMAINS")
    )]
    pub exclude_domains: Vec<String>,

    /// NextDNS API key
    #[arg(
        long,
        value_name = "API_KEY",
        hide_env_values = true,
        env = concat!(env_prefix!(), "API_KEY")
    )]
    pub api_key: String,

    /// NextDNS profile id whose rewrites are managed
    #[arg(
        long,
        value_name = "PROFILE_ID",
        env = concat!(env_prefix!(), "PROFILE_ID")
    )]
    pub profile_id: String,

    /// Base URL of the NextDNS API
    #[arg(
        long,
        value_name = "URL",
        default_value = NEXTDNS_API_BASE,
        env = concat!(env_prefix!(), "API_URL")
    )]
    pub api_url: String,

    /// Run without making any changes to the rewrites
    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::BoolishValueParser::new(),
        env = concat!(env_prefix!(), "DRY_RUN")
    )]
    pub dry_run: bool,

    /// The format in which log messages are printed
    #[arg(
        value_enum,
        long,
        default_value_t = LogFormat::Text,
        env = concat!(env_prefix!(), "LOG_FORMAT")
    )]
    pub log_format: LogFormat,

    /// Set the level of logging
    #[arg(
        value_enum,
        long,
        default_value_t = LogLevel::Info,
        value_name = "LEVEL",
        env = concat!(env_prefix!(), "LOG_LEVEL")
    )]
    pub log_level: LogLevel,

    /// Maximum time to read a webhook request body (e.g. 5s, 500ms)
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "5s",
        value_parser = parse_duration,
        env = concat!(env_prefix!(), "READ_TIMEOUT")
    )]
    pub read_timeout: Duration,

    /// Maximum time to handle a webhook request
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "10s",
        value_parser = parse_duration,
        env = concat!(env_prefix!(), "WRITE_TIMEOUT")
    )]
    pub write_timeout: Duration,

    /// Timeout of each NextDNS API request
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "10s",
        value_parser = parse_duration,
        env = concat!(env_prefix!(), "REQUEST_TIMEOUT")
    )]
    pub request_timeout: Duration,

    /// Maximum number of hostnames changed concurrently
    #[arg(
        long,
        value_name = "N",
        default_value_t = 4,
        env = concat!(env_prefix!(), "MAX_CONCURRENCY")
    )]
    pub max_concurrency: usize,

    /// Address the webhook listens on
    #[arg(
        long,
        value_name = "ADDR",
        default_value = "127.0.0.1:8888",
        env = concat!(env_prefix!(), "LISTEN_ADDRESS")
    )]
    pub listen_address: SocketAddr,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("domain_filter", &self.domain_filter)
            .field("exclude_domains", &self.exclude_domains)
            .field("api_key", &"<REDACTED>")
            .field("profile_id", &self.profile_id)
            .field("api_url", &self.api_url)
            .field("dry_run", &self.dry_run)
            .field("log_format", &self.log_format)
            .field("log_level", &self.log_level)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .field("listen_address", &self.listen_address)
            .finish()
    }
}

impl Config {
    /// Validate the configuration
    ///
    /// Catches the mistakes clap cannot: placeholder keys, malformed domain
    /// names, zero timeouts and out-of-range concurrency.
    pub fn validate(&self) -> Result<()> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            bail!(
                "NEXTDNS_WEBHOOK_API_KEY is required. \
                Set it via: export NEXTDNS_WEBHOOK_API_KEY=your_key"
            );
        }

        // Check for obvious placeholder keys (common mistake)
        let key_lower = api_key.to_lowercase();
        if key_lower.contains("your_key")
            || key_lower.contains("your-api-key")
            || key_lower.contains("replace_me")
            || key_lower.contains("changeme")
            || key_lower == "key"
        {
            bail!(
                "NEXTDNS_WEBHOOK_API_KEY appears to be a placeholder. \
                Use the API key from https://my.nextdns.io/account."
            );
        }

        let profile_id = self.profile_id.trim();
        if profile_id.is_empty() {
            bail!("NEXTDNS_WEBHOOK_PROFILE_ID is required");
        }
        if !profile_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!(
                "NEXTDNS_WEBHOOK_PROFILE_ID must be alphanumeric. Got: '{}'",
                profile_id
            );
        }

        if !self.api_url.starts_with("https://") && !self.api_url.starts_with("http://") {
            bail!(
                "NEXTDNS_WEBHOOK_API_URL must use HTTP or HTTPS scheme. Got: {}",
                self.api_url
            );
        }

        for domain in self.domain_filter.iter().chain(&self.exclude_domains) {
            validate_domain_name(domain)
                .with_context(|| format!("Invalid domain filter entry '{}'", domain))?;
        }

        for (name, timeout) in [
            ("read-timeout", self.read_timeout),
            ("write-timeout", self.write_timeout),
            ("request-timeout", self.request_timeout),
        ] {
            if timeout.is_zero() {
                bail!("--{} must be greater than zero", name);
            }
        }

        self.engine_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(())
    }

    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(&self.domain_filter).with_exclusions(&self.exclude_domains)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
        }
    }

    /// Core configuration handed to the Reconciler
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(self.api_key.trim(), self.profile_id.trim())
            .with_domain_filter(self.domain_filter())
            .with_dry_run(self.dry_run)
            .with_engine(self.engine_config())
    }
}

/// Validate a domain filter entry
///
/// A leading dot (subdomains only) and a trailing dot are accepted.
fn validate_domain_name(domain: &str) -> Result<()> {
    let name = domain.trim().trim_start_matches('.').trim_end_matches('.');

    if name.is_empty() {
        bail!("Domain name cannot be empty");
    }

    if name.len() > 253 {
        bail!("Domain name too long: {} chars (max 253)", name.len());
    }

    for label in name.split('.') {
        if label.is_empty() {
            bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            bail!("Domain label cannot start or end with hyphen. Label: '{}'", label);
        }
    }

    Ok(())
}

/// Parse a Go-style duration such as `500ms`, `5s`, `1m30s` or `1.5h`
///
/// Accepts the units `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
/// is the only unitless value.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let mut rest = duration_str.trim();
    if rest.is_empty() {
        bail!("Duration string cannot be empty");
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .context("Duration must end with a unit (ns, us, ms, s, m or h)")?;
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            _ => bail!("Unsupported duration unit '{unit}'. Use 'ns', 'us', 'ms', 's', 'm' or 'h'"),
        };

        total_nanos = total_nanos
            .checked_add(segment_nanos(number, unit_nanos)?)
            .context("Duration value too large (overflow)")?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / NANOS_PER_SEC).context("Duration value too large (overflow)")?;
    // Remainder of a division by 10^9 always fits
    let nanos = (total_nanos % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}

/// Nanoseconds of one `<number><unit>` segment; the number may carry a fraction
fn segment_nanos(number: &str, unit_nanos: u128) -> Result<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        bail!("Duration value must be a positive number");
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .with_context(|| format!("Invalid duration value '{number}'"))?
    };
    let mut nanos = whole
        .checked_mul(unit_nanos)
        .context("Duration value too large (overflow)")?;

    if !fraction.is_empty() {
        let digits: u128 = fraction
            .parse()
            .with_context(|| format!("Invalid duration value '{number}'"))?;
        let scale = u32::try_from(fraction.len())
            .ok()
            .and_then(|len| 10u128.checked_pow(len))
            .context("Duration fraction has too many digits")?;
        let scaled = digits
            .checked_mul(unit_nanos)
            .context("Duration fraction has too many digits")?;
        nanos = nanos
            .checked_add(scaled / scale)
            .context("Duration value too large (overflow)")?;
    }

    Ok(nanos)
}
