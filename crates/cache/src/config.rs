//! Cache configuration for user-configurable memory budgets.
//!
//! Capacities are supplied as byte counts at cache-construction time.
//! Configuration can be loaded from a file, environment variables, or created
//! programmatically; the registry consults it when lazily constructing a
//! named cache.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Registry name of the texture tile cache
pub const TEXTURE_TILE_CACHE: &str = "Texture Tiles";

/// Registry name of the GPU resource cache
pub const GPU_RESOURCE_CACHE: &str = "GPU Resources";

/// Configuration for the cache system.
///
/// Provides user-configurable budgets for the texture tile cache and the GPU
/// resource cache, plus a shared low-water fraction (the trim target after an
/// eviction pass, as a fraction of capacity). Additional named caches fall
/// back to `default_cache_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Texture tile cache capacity in bytes
    pub texture_tile_cache_size: usize,
    /// GPU resource cache capacity in bytes
    pub gpu_resource_cache_size: usize,
    /// Capacity for caches not otherwise named, in bytes
    pub default_cache_size: usize,
    /// Trim target after eviction, as a fraction of capacity (0.0 to 1.0)
    pub low_water_fraction: f64,
    /// Explicit capacities for additional named caches
    pub named_sizes: HashMap<String, usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            texture_tile_cache_size: 64 * 1024 * 1024,  // 64 MB
            gpu_resource_cache_size: 256 * 1024 * 1024, // 256 MB
            default_cache_size: 32 * 1024 * 1024,       // 32 MB
            low_water_fraction: 0.8,
            named_sizes: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with custom budgets in megabytes.
    pub fn new(tile_mb: usize, gpu_mb: usize) -> Self {
        Self {
            texture_tile_cache_size: tile_mb * 1024 * 1024,
            gpu_resource_cache_size: gpu_mb * 1024 * 1024,
            ..Default::default()
        }
    }

    /// Sets the texture tile cache budget in megabytes.
    pub fn with_tile_cache_mb(mut self, mb: usize) -> Self {
        self.texture_tile_cache_size = mb * 1024 * 1024;
        self
    }

    /// Sets the GPU resource cache budget in megabytes.
    pub fn with_gpu_cache_mb(mut self, mb: usize) -> Self {
        self.gpu_resource_cache_size = mb * 1024 * 1024;
        self
    }

    /// Sets the low-water fraction, clamped to (0.0, 1.0].
    pub fn with_low_water_fraction(mut self, fraction: f64) -> Self {
        self.low_water_fraction = fraction.clamp(0.01, 1.0);
        self
    }

    /// Sets an explicit capacity for an additional named cache.
    pub fn with_named_cache(mut self, name: &str, size_bytes: usize) -> Self {
        self.named_sizes.insert(name.to_string(), size_bytes);
        self
    }

    /// Returns the (capacity, low-water) byte pair for a named cache.
    pub fn size_for(&self, name: &str) -> (usize, usize) {
        let capacity = match name {
            TEXTURE_TILE_CACHE => self.texture_tile_cache_size,
            GPU_RESOURCE_CACHE => self.gpu_resource_cache_size,
            other => self
                .named_sizes
                .get(other)
                .copied()
                .unwrap_or(self.default_cache_size),
        };
        let low_water = (capacity as f64 * self.low_water_fraction) as usize;
        (capacity, low_water)
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GLOBESTREAM_TILE_CACHE_MB`: texture tile cache budget in MB
    /// - `GLOBESTREAM_GPU_CACHE_MB`: GPU resource cache budget in MB
    /// - `GLOBESTREAM_LOW_WATER_PCT`: low-water trim target in percent
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GLOBESTREAM_TILE_CACHE_MB") {
            config.texture_tile_cache_size = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("GLOBESTREAM_TILE_CACHE_MB".to_string()))?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("GLOBESTREAM_GPU_CACHE_MB") {
            config.gpu_resource_cache_size = val
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("GLOBESTREAM_GPU_CACHE_MB".to_string()))?
                * 1024
                * 1024;
        }

        if let Ok(val) = std::env::var("GLOBESTREAM_LOW_WATER_PCT") {
            let pct = val
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidValue("GLOBESTREAM_LOW_WATER_PCT".to_string()))?;
            if pct == 0 || pct > 100 {
                return Err(ConfigError::InvalidValue(
                    "GLOBESTREAM_LOW_WATER_PCT".to_string(),
                ));
            }
            config.low_water_fraction = pct as f64 / 100.0;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// tile_cache_mb = 64
    /// gpu_cache_mb = 256
    /// low_water_pct = 80
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "tile_cache_mb" => {
                        config.texture_tile_cache_size = value
                            .parse::<usize>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?
                            * 1024
                            * 1024;
                    }
                    "gpu_cache_mb" => {
                        config.gpu_resource_cache_size = value
                            .parse::<usize>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?
                            * 1024
                            * 1024;
                    }
                    "low_water_pct" => {
                        let pct = value
                            .parse::<u32>()
                            .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
                        if pct == 0 || pct > 100 {
                            return Err(ConfigError::InvalidValue(key.to_string()));
                        }
                        config.low_water_fraction = pct as f64 / 100.0;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml = self.to_toml();
        fs::write(path.as_ref(), toml)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    fn to_toml(&self) -> String {
        format!(
            "# GlobeStream cache configuration\n\
             tile_cache_mb = {}\n\
             gpu_cache_mb = {}\n\
             low_water_pct = {}\n",
            self.texture_tile_cache_size / (1024 * 1024),
            self.gpu_resource_cache_size / (1024 * 1024),
            (self.low_water_fraction * 100.0).round() as u32,
        )
    }

    /// Returns the texture tile cache budget in megabytes.
    pub fn tile_cache_mb(&self) -> usize {
        self.texture_tile_cache_size / (1024 * 1024)
    }

    /// Returns the GPU resource cache budget in megabytes.
    pub fn gpu_cache_mb(&self) -> usize {
        self.gpu_resource_cache_size / (1024 * 1024)
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing a configuration file
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.texture_tile_cache_size, 64 * 1024 * 1024);
        assert_eq!(config.gpu_resource_cache_size, 256 * 1024 * 1024);
        assert!((config.low_water_fraction - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_tile_cache_mb(128)
            .with_gpu_cache_mb(512)
            .with_low_water_fraction(0.75);

        assert_eq!(config.tile_cache_mb(), 128);
        assert_eq!(config.gpu_cache_mb(), 512);
        assert!((config.low_water_fraction - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_size_for_named_caches() {
        let config = CacheConfig::new(100, 200).with_named_cache("Elevations", 10 * 1024 * 1024);

        let (capacity, low_water) = config.size_for(TEXTURE_TILE_CACHE);
        assert_eq!(capacity, 100 * 1024 * 1024);
        assert_eq!(low_water, 80 * 1024 * 1024);

        let (capacity, _) = config.size_for(GPU_RESOURCE_CACHE);
        assert_eq!(capacity, 200 * 1024 * 1024);

        let (capacity, _) = config.size_for("Elevations");
        assert_eq!(capacity, 10 * 1024 * 1024);

        // Unknown names fall back to the default budget
        let (capacity, _) = config.size_for("Placemarks");
        assert_eq!(capacity, config.default_cache_size);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&[
            "GLOBESTREAM_TILE_CACHE_MB",
            "GLOBESTREAM_GPU_CACHE_MB",
            "GLOBESTREAM_LOW_WATER_PCT",
        ]);

        env::set_var("GLOBESTREAM_TILE_CACHE_MB", "48");
        env::set_var("GLOBESTREAM_GPU_CACHE_MB", "96");
        env::set_var("GLOBESTREAM_LOW_WATER_PCT", "70");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.texture_tile_cache_size, 48 * 1024 * 1024);
        assert_eq!(config.gpu_resource_cache_size, 96 * 1024 * 1024);
        assert!((config.low_water_fraction - 0.7).abs() < 1e-9);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&[
            "GLOBESTREAM_TILE_CACHE_MB",
            "GLOBESTREAM_GPU_CACHE_MB",
            "GLOBESTREAM_LOW_WATER_PCT",
        ]);

        env::remove_var("GLOBESTREAM_GPU_CACHE_MB");
        env::remove_var("GLOBESTREAM_LOW_WATER_PCT");
        env::set_var("GLOBESTREAM_TILE_CACHE_MB", "48");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.texture_tile_cache_size, 48 * 1024 * 1024);
        assert_eq!(config.gpu_resource_cache_size, 256 * 1024 * 1024); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&["GLOBESTREAM_TILE_CACHE_MB", "GLOBESTREAM_LOW_WATER_PCT"]);

        env::remove_var("GLOBESTREAM_LOW_WATER_PCT");
        env::set_var("GLOBESTREAM_TILE_CACHE_MB", "not_a_number");
        assert!(CacheConfig::from_env().is_err());

        env::remove_var("GLOBESTREAM_TILE_CACHE_MB");
        env::set_var("GLOBESTREAM_LOW_WATER_PCT", "150");
        assert!(CacheConfig::from_env().is_err());
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CacheConfig::new(48, 96).with_low_water_fraction(0.7);
        let toml = config.to_toml();
        let parsed = CacheConfig::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            # Test configuration
            tile_cache_mb = 48
            gpu_cache_mb = 96
            low_water_pct = 75
        "#;

        let config = CacheConfig::from_toml(toml).unwrap();
        assert_eq!(config.texture_tile_cache_size, 48 * 1024 * 1024);
        assert_eq!(config.gpu_resource_cache_size, 96 * 1024 * 1024);
        assert!((config.low_water_fraction - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = "tile_cache_mb = 48\n";

        let config = CacheConfig::from_toml(toml).unwrap();
        assert_eq!(config.texture_tile_cache_size, 48 * 1024 * 1024);
        assert_eq!(config.gpu_resource_cache_size, 256 * 1024 * 1024); // default
    }

    #[test]
    fn test_file_save_and_load() {
        let temp_dir = std::env::temp_dir();
        let config_path = temp_dir.join("globestream_test_cache_config.toml");

        let config = CacheConfig::new(48, 96);
        config.save_to_file(&config_path).unwrap();

        let loaded = CacheConfig::from_file(&config_path).unwrap();
        assert_eq!(config, loaded);

        let _ = fs::remove_file(config_path);
    }
}
