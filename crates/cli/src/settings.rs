//! Configuration loading.
//!
//! Layers, lowest precedence first: built-in defaults, the optional TOML
//! file, then `ECHOBENCH_*` environment variables (`__` separates nested
//! keys, e.g. `ECHOBENCH_TRIAL__PORT=9000`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use echobench_benchmarks::BenchConfig;
use std::path::Path;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ECHOBENCH";

/// Load the harness configuration.
pub fn load(path: Option<&Path>) -> Result<BenchConfig> {
    let defaults = serde_json::to_string(&BenchConfig::default())
        .context("failed to serialize default configuration")?;

    let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .context("failed to load configuration")?
        .try_deserialize::<BenchConfig>()
        .context("invalid configuration")?;
    Ok(config)
}
