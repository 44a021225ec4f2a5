use anyhow::{ensure, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::PathBuf};

use crate::mixed::{KeyNumbering, MixedSettings};

/// Access credentials for the storage backend
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Workload configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Path of the workload document (mixed ratios or replay trace)
    pub workload_file: Option<PathBuf>,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Storage endpoints, the first one receives the workload
    pub endpoints: Vec<String>,

    /// Region of the storage service
    pub region: String,

    /// Bucket mixed workloads write to
    pub bucket: String,

    /// Prefix of generated object keys
    pub object_prefix: String,

    /// Size of generated objects in bytes
    pub object_size: u64,

    /// Number of operations a mixed workload generates
    pub requests: u64,

    /// How generated object keys are numbered
    pub key_numbering: KeyNumbering,

    /// Backend credentials
    pub credentials: Credentials,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            workload_file: None,
            concurrency: 1,
            endpoints: vec!["http://127.0.0.1:9000".to_string()],
            region: "us-east-1".to_string(),
            bucket: "loadgen".to_string(),
            object_prefix: "object".to_string(),
            object_size: 1024,
            requests: 1000,
            key_numbering: KeyNumbering::Continuous,
            credentials: Credentials::default(),
        }
    }
}

impl WorkloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder to construct a WorkloadConfig with custom values
    pub fn builder() -> WorkloadConfigBuilder {
        WorkloadConfigBuilder::default()
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml_str).context("Failed to parse YAML configuration")?;
        config.validate()
    }

    /// Build the configuration from command line arguments, starting from the
    /// YAML file they name if any
    pub fn from_args(args: &LoadgenArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_yaml_file(path)
                .with_context(|| format!("Failed to load config from {}", path))?,
            None => Self::default(),
        };
        config.override_from_args(args);
        config.validate()
    }

    /// Validate the configuration
    pub fn validate(self) -> Result<Self> {
        ensure!(self.concurrency > 0, "concurrency must be greater than 0");

        ensure!(!self.endpoints.is_empty(), "at least one endpoint is required");

        ensure!(
            self.endpoints.iter().all(|e| !e.trim().is_empty()),
            "endpoints must not be empty"
        );

        ensure!(!self.region.is_empty(), "region must not be empty");

        ensure!(!self.bucket.is_empty(), "bucket must not be empty");

        Ok(self)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let yaml =
            serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")?;
        fs::write(&path, yaml)
            .with_context(|| format!("Failed to write config to file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Override configuration values from command line arguments
    pub fn override_from_args(&mut self, args: &LoadgenArgs) {
        if let Some(path) = &args.workload_file {
            self.workload_file = Some(path.clone());
        }

        if let Some(concurrency) = args.concurrency {
            self.concurrency = concurrency;
        }

        if let Some(endpoints) = &args.endpoints {
            self.endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(region) = &args.region {
            self.region = region.clone();
        }

        if let Some(bucket) = &args.bucket {
            self.bucket = bucket.clone();
        }

        if let Some(prefix) = &args.object_prefix {
            self.object_prefix = prefix.clone();
        }

        if let Some(size) = args.object_size {
            self.object_size = size;
        }

        if let Some(requests) = args.requests {
            self.requests = requests;
        }

        if let Some(numbering) = args.key_numbering {
            self.key_numbering = numbering;
        }

        if let Some(access_key) = &args.access_key {
            self.credentials.access_key = access_key.clone();
        }

        if let Some(secret_key) = &args.secret_key {
            self.credentials.secret_key = secret_key.clone();
        }
    }

    /// Endpoint the workload is sent to
    pub fn primary_endpoint(&self) -> &str {
        self.endpoints.first().map(String::as_str).unwrap_or_default()
    }

    /// Parameters of operations synthesized by a mixed workload
    pub fn mixed_settings(&self) -> MixedSettings {
        MixedSettings {
            total_requests: self.requests,
            object_size: self.object_size,
            bucket: self.bucket.clone(),
            key_prefix: self.object_prefix.clone(),
            key_numbering: self.key_numbering,
        }
    }
}

#[derive(Default)]
pub struct WorkloadConfigBuilder {
    config: WorkloadConfig,
}

impl WorkloadConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workload document path
    pub fn workload_file(mut self, path: impl Into<Option<PathBuf>>) -> Self {
        self.config.workload_file = path.into();
        self
    }

    /// Set the number of workers
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the storage endpoints
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Set the region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    /// Set the bucket
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    /// Set the object key prefix
    pub fn object_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.object_prefix = prefix.into();
        self
    }

    /// Set the object size in bytes
    pub fn object_size(mut self, size: u64) -> Self {
        self.config.object_size = size;
        self
    }

    /// Set the number of generated requests
    pub fn requests(mut self, requests: u64) -> Self {
        self.config.requests = requests;
        self
    }

    /// Set the key numbering mode
    pub fn key_numbering(mut self, numbering: KeyNumbering) -> Self {
        self.config.key_numbering = numbering;
        self
    }

    /// Set the backend credentials
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn build(self) -> WorkloadConfig {
        self.config
    }
}

// Command line arguments using clap
#[derive(Parser, Debug, Default)]
#[command(version, about = "Object storage workload generator", long_about = None)]
pub struct LoadgenArgs {
    /// Path to the YAML config file
    #[arg(long, short, help = "Config yaml path")]
    pub config: Option<String>,

    #[arg(long, short, help = "Workload document (mixedWorkload ratios or replay trace)")]
    pub workload_file: Option<PathBuf>,

    #[arg(long, help = "Number of concurrent workers")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Comma separated storage endpoints, the first one is used")]
    pub endpoints: Option<String>,

    #[arg(long, help = "Region of the storage service")]
    pub region: Option<String>,

    #[arg(long, help = "Bucket used by mixed workloads")]
    pub bucket: Option<String>,

    #[arg(long, help = "Prefix of generated object keys")]
    pub object_prefix: Option<String>,

    #[arg(long, help = "Size of generated objects in bytes")]
    pub object_size: Option<u64>,

    #[arg(long, help = "Number of requests a mixed workload generates")]
    pub requests: Option<u64>,

    #[arg(long, value_enum, help = "Numbering of generated object keys")]
    pub key_numbering: Option<KeyNumbering>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,
}
