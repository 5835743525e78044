use std::str::FromStr;
use tracing::{info, warn};

/// Per-region behaviour shared by every access strategy bound to the region
#[derive(Clone, Debug)]
pub struct RegionSettings {
    pub minimal_puts: bool,
    pub lock_timeout_ms: u64,
    pub key_prefix: String,
    pub clear_supported: bool,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            minimal_puts: false,
            lock_timeout_ms: Config::DEFAULT_LOCK_TIMEOUT_MS,
            key_prefix: String::new(),
            clear_supported: true,
        }
    }
}

/// Sizing hints for the local store adapters
#[derive(Clone, Debug)]
pub struct StoreSettings {
    pub max_entries: Option<u64>,
    pub ttl_ms: Option<u64>,
    pub mem_bytes: usize,
    pub data_dir: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_entries: None,
            ttl_ms: None,
            mem_bytes: Config::DEFAULT_MEM_BYTES,
            data_dir: Config::DEFAULT_DATA_DIR.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub region: RegionSettings,
    pub store: StoreSettings,
    /// External name of the access type used when a mapping does not pick one
    pub default_access_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: RegionSettings::default(),
            store: StoreSettings::default(),
            default_access_type: Self::DEFAULT_ACCESS_TYPE.to_string(),
        }
    }
}

impl Config {
    const DEFAULT_LOCK_TIMEOUT_MS: u64 = 60_000;
    /// Timestamps keep 12 low bits for a counter, so longer timeouts cannot be represented
    pub const MAX_LOCK_TIMEOUT_MS: u64 = u64::MAX >> 12;
    const DEFAULT_MEM_BYTES: usize = 64 * 1024 * 1024;
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_ACCESS_TYPE: &str = "read-write";

    /// Load a `.env` file if there is one, then read the environment
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment variables from {}", path.display()),
            Err(_) => info!("No .env file found, using system environment variables"),
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self {
            region: RegionSettings {
                minimal_puts: parse_var("CARBON_L2_MINIMAL_PUTS", false),
                lock_timeout_ms: clamp_lock_timeout(parse_var(
                    "CARBON_L2_LOCK_TIMEOUT_MS",
                    Self::DEFAULT_LOCK_TIMEOUT_MS,
                )),
                key_prefix: std::env::var("CARBON_L2_KEY_PREFIX").unwrap_or_default(),
                clear_supported: parse_var("CARBON_L2_CLEAR_SUPPORTED", true),
            },
            store: StoreSettings {
                max_entries: parse_optional_var("CARBON_L2_STORE_MAX_ENTRIES"),
                ttl_ms: parse_optional_var("CARBON_L2_STORE_TTL_MS"),
                mem_bytes: parse_var("CARBON_L2_STORE_MEM_BYTES", Self::DEFAULT_MEM_BYTES),
                data_dir: std::env::var("CARBON_L2_DATA_DIR")
                    .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            },
            default_access_type: std::env::var("CARBON_L2_DEFAULT_ACCESS_TYPE")
                .unwrap_or_else(|_| Self::DEFAULT_ACCESS_TYPE.to_string()),
        }
    }
}

fn clamp_lock_timeout(ms: u64) -> u64 {
    if ms > Config::MAX_LOCK_TIMEOUT_MS {
        warn!(
            "CARBON_L2_LOCK_TIMEOUT_MS of {} is too large, using {}",
            ms,
            Config::MAX_LOCK_TIMEOUT_MS
        );
        return Config::MAX_LOCK_TIMEOUT_MS;
    }
    ms
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    parse_optional_var(name).unwrap_or(default)
}

fn parse_optional_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} has an unparseable value '{}', using the default", name, raw);
            None
        }
    }
}
