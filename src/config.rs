use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::UploadPolicy;

/// Maximum uncompressed size of a single member (1GB) to prevent zip bombs
pub const DEFAULT_MAX_MEMBER_SIZE: u64 = 1024 * 1024 * 1024;

/// Configuration for creating an S3 client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Optional custom endpoint URL
    pub endpoint_url: Option<String>,
    /// Whether to use path-style addressing (required for some S3-compatible services)
    pub force_path_style: bool,
    /// Whether to skip credentials (for anonymous/public access)
    pub anonymous: bool,
    /// Optional region override
    pub region: Option<String>,
}

/// Settings that shape a single pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory that holds scratch blobs while a run is in flight
    pub scratch_dir: PathBuf,
    pub upload_policy: UploadPolicy,
    /// Largest uncompressed member accepted from an archive
    pub max_member_size: u64,
    /// Abort runs that take longer than this
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: env::temp_dir(),
            upload_policy: UploadPolicy::default(),
            max_member_size: DEFAULT_MAX_MEMBER_SIZE,
            deadline: None,
        }
    }
}

/// Overrides supplied on the command line. `None`/`false` defers to the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub force_path_style: bool,
    pub anonymous: bool,
    pub scratch_dir: Option<PathBuf>,
    pub continue_on_upload_error: bool,
    pub timeout_secs: Option<u64>,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Read the process environment and merge the CLI overrides on top
    pub fn from_env(overrides: Overrides) -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok(), overrides)
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F, overrides: Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Environment fallback ---
        let env_endpoint = lookup("S3UNZIP_ENDPOINT_URL").or_else(|| lookup("AWS_ENDPOINT_URL"));
        let env_region = lookup("S3UNZIP_REGION");
        let env_path_style = parse_bool(&lookup, "S3UNZIP_FORCE_PATH_STYLE")?;
        let env_anonymous = parse_bool(&lookup, "S3UNZIP_ANONYMOUS")?;
        let env_continue = parse_bool(&lookup, "S3UNZIP_CONTINUE_ON_UPLOAD_ERROR")?;
        let env_scratch = lookup("S3UNZIP_SCRATCH_DIR").map(PathBuf::from);
        let max_member_size = match lookup("S3UNZIP_MAX_MEMBER_SIZE") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("parsing S3UNZIP_MAX_MEMBER_SIZE value `{}`", value))?,
            None => DEFAULT_MAX_MEMBER_SIZE,
        };
        let env_timeout = match lookup("S3UNZIP_TIMEOUT_SECS") {
            Some(value) => Some(
                value
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("parsing S3UNZIP_TIMEOUT_SECS value `{}`", value))?,
            ),
            None => None,
        };

        // --- Merge ---
        let store = StoreConfig {
            endpoint_url: overrides.endpoint_url.or(env_endpoint),
            force_path_style: overrides.force_path_style || env_path_style,
            anonymous: overrides.anonymous || env_anonymous,
            region: overrides.region.or(env_region),
        };

        let upload_policy = if overrides.continue_on_upload_error || env_continue {
            UploadPolicy::ContinueAll
        } else {
            UploadPolicy::StopOnFirstFailure
        };

        let pipeline = PipelineConfig {
            scratch_dir: overrides
                .scratch_dir
                .or(env_scratch)
                .unwrap_or_else(env::temp_dir),
            upload_policy,
            max_member_size,
            deadline: overrides
                .timeout_secs
                .or(env_timeout)
                .map(Duration::from_secs),
        };

        Ok(Self { store, pipeline })
    }
}

fn parse_bool<F>(lookup: &F, name: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(anyhow::anyhow!("parsing {} value `{}`: expected a boolean", name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let cfg = AppConfig::from_lookup(lookup_from(&[]), Overrides::default()).unwrap();

        assert_eq!(cfg.store, StoreConfig::default());
        assert_eq!(cfg.pipeline.upload_policy, UploadPolicy::StopOnFirstFailure);
        assert_eq!(cfg.pipeline.max_member_size, DEFAULT_MAX_MEMBER_SIZE);
        assert_eq!(cfg.pipeline.scratch_dir, env::temp_dir());
        assert_eq!(cfg.pipeline.deadline, None);
    }

    #[test]
    fn test_environment_values() {
        let cfg = AppConfig::from_lookup(
            lookup_from(&[
                ("AWS_ENDPOINT_URL", "http://localhost:4566"),
                ("S3UNZIP_REGION", "eu-west-1"),
                ("S3UNZIP_FORCE_PATH_STYLE", "true"),
                ("S3UNZIP_SCRATCH_DIR", "/var/scratch"),
                ("S3UNZIP_MAX_MEMBER_SIZE", "2048"),
                ("S3UNZIP_CONTINUE_ON_UPLOAD_ERROR", "1"),
                ("S3UNZIP_TIMEOUT_SECS", "30"),
            ]),
            Overrides::default(),
        )
        .unwrap();

        assert_eq!(cfg.store.endpoint_url.as_deref(), Some("http://localhost:4566"));
        assert_eq!(cfg.store.region.as_deref(), Some("eu-west-1"));
        assert!(cfg.store.force_path_style);
        assert!(!cfg.store.anonymous);
        assert_eq!(cfg.pipeline.scratch_dir, PathBuf::from("/var/scratch"));
        assert_eq!(cfg.pipeline.max_member_size, 2048);
        assert_eq!(cfg.pipeline.upload_policy, UploadPolicy::ContinueAll);
        assert_eq!(cfg.pipeline.deadline, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_overrides_win_over_environment() {
        let overrides = Overrides {
            endpoint_url: Some("http://minio:9000".to_string()),
            scratch_dir: Some(PathBuf::from("/tmp/run")),
            timeout_secs: Some(5),
            ..Overrides::default()
        };
        let cfg = AppConfig::from_lookup(
            lookup_from(&[
                ("S3UNZIP_ENDPOINT_URL", "http://localhost:4566"),
                ("S3UNZIP_SCRATCH_DIR", "/var/scratch"),
                ("S3UNZIP_TIMEOUT_SECS", "30"),
            ]),
            overrides,
        )
        .unwrap();

        assert_eq!(cfg.store.endpoint_url.as_deref(), Some("http://minio:9000"));
        assert_eq!(cfg.pipeline.scratch_dir, PathBuf::from("/tmp/run"));
        assert_eq!(cfg.pipeline.deadline, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_size = AppConfig::from_lookup(
            lookup_from(&[("S3UNZIP_MAX_MEMBER_SIZE", "lots")]),
            Overrides::default(),
        );
        assert!(bad_size.unwrap_err().to_string().contains("S3UNZIP_MAX_MEMBER_SIZE"));

        let bad_bool = AppConfig::from_lookup(
            lookup_from(&[("S3UNZIP_ANONYMOUS", "maybe")]),
            Overrides::default(),
        );
        assert!(bad_bool.unwrap_err().to_string().contains("S3UNZIP_ANONYMOUS"));
    }
}
