/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::config::{Builder, StorageConfig};
use crate::error::{self, Error};

/// Environment variable holding the endpoint address
pub const ENV_ENDPOINT: &str = "MODEL_STORE_ENDPOINT";
/// Environment variable holding the static access key id
pub const ENV_ACCESS_KEY_ID: &str = "MODEL_STORE_ACCESS_KEY_ID";
/// Environment variable holding the static secret access key
pub const ENV_SECRET_ACCESS_KEY: &str = "MODEL_STORE_SECRET_ACCESS_KEY";
/// Environment variable toggling TLS (`true`/`false`, `1`/`0`, `yes`/`no`)
pub const ENV_USE_SSL: &str = "MODEL_STORE_USE_SSL";
/// Environment variable holding the bucket name
pub const ENV_BUCKET: &str = "MODEL_STORE_BUCKET";
/// Environment variable holding the signing region
pub const ENV_REGION: &str = "MODEL_STORE_REGION";

/// Load [`StorageConfig`] from the environment.
///
/// Values set explicitly on the loader take precedence over environment variables, which take
/// precedence over the built-in defaults.
#[derive(Default, Debug)]
pub struct ConfigLoader {
    builder: Builder,
}

impl ConfigLoader {
    /// Endpoint address, with or without a scheme.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.builder = self.builder.endpoint(endpoint);
        self
    }

    /// Static access key id.
    pub fn access_key_id(mut self, access_key_id: impl Into<String>) -> Self {
        self.builder = self.builder.access_key_id(access_key_id);
        self
    }

    /// Static secret access key.
    pub fn secret_access_key(mut self, secret_access_key: impl Into<String>) -> Self {
        self.builder = self.builder.secret_access_key(secret_access_key);
        self
    }

    /// Connect over TLS.
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.builder = self.builder.use_ssl(use_ssl);
        self
    }

    /// Bucket holding all model artifacts.
    pub fn bucket_name(mut self, bucket_name: impl Into<String>) -> Self {
        self.builder = self.builder.bucket_name(bucket_name);
        self
    }

    /// Signing region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.builder = self.builder.region(region);
        self
    }

    /// Load the configuration
    ///
    /// If fields have been overridden on the loader, the override values will be used.
    /// Otherwise the environment is consulted, then the default values for each field.
    pub fn load(self) -> Result<StorageConfig, Error> {
        self.load_with(|name| std::env::var(name).ok())
    }

    fn load_with<F>(self, lookup: F) -> Result<StorageConfig, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let use_ssl = lookup(ENV_USE_SSL)
            .map(|v| parse_bool(ENV_USE_SSL, &v))
            .transpose()?;

        let from_env = Builder::default()
            .set_endpoint(lookup(ENV_ENDPOINT))
            .set_access_key_id(lookup(ENV_ACCESS_KEY_ID))
            .set_secret_access_key(lookup(ENV_SECRET_ACCESS_KEY))
            .set_use_ssl(use_ssl)
            .set_bucket_name(lookup(ENV_BUCKET))
            .set_region(lookup(ENV_REGION));

        let config = self.builder.or(from_env).build();
        tracing::debug!(?config, "loaded storage config");
        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(error::invalid_input(format!(
            "{name} must be a boolean, got `{other}`"
        ))),
    }
}
