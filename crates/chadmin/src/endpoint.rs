//! Descriptors for external endpoints used by bulk transfers.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::executor::quote_string;

pub const DEFAULT_S3_FORMAT: &str = "CSVWithNames";

/// Location and credentials of one object in S3 compatible storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    /// Object URL, may contain globs when reading.
    pub url: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    /// Column structure, e.g. `a UInt64, b String`. Inferred when omitted.
    #[serde(default)]
    pub structure: Option<String>,
    #[serde(default)]
    pub compression_method: Option<String>,
}

fn default_format() -> String {
    DEFAULT_S3_FORMAT.to_string()
}

impl S3Settings {
    pub fn new(url: impl Into<String>) -> Self {
        S3Settings {
            url: url.into(),
            access_key_id: None,
            secret_access_key: None,
            format: default_format(),
            structure: None,
            compression_method: None,
        }
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_structure(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    pub fn with_compression_method(mut self, method: impl Into<String>) -> Self {
        self.compression_method = Some(method.into());
        self
    }

    fn credentials(&self) -> Result<Option<(&str, &str)>, ConfigurationError> {
        let missing = |field| ConfigurationError::MissingField {
            descriptor: "S3 settings",
            field,
        };
        match (self.access_key_id.as_deref(), self.secret_access_key.as_deref()) {
            (None, None) => Ok(None),
            (Some(""), _) | (None, Some(_)) => Err(missing("access_key_id")),
            (Some(_), None) => Err(missing("secret_access_key")),
            (Some(id), Some(secret)) => Ok(Some((id, secret))),
        }
    }

    /// Render the argument list of the `s3` table function.
    ///
    /// `s3(url [, key, secret] [, format [, structure] [, compression]])`
    pub(crate) fn function_args(&self) -> Result<String, ConfigurationError> {
        if self.url.is_empty() {
            return Err(ConfigurationError::MissingField {
                descriptor: "S3 settings",
                field: "url",
            });
        }
        if self.format.is_empty() {
            return Err(ConfigurationError::MissingField {
                descriptor: "S3 settings",
                field: "format",
            });
        }

        let mut args = quote_string(&self.url);
        if let Some((id, secret)) = self.credentials()? {
            // Infallible for strings.
            let _ = write!(args, ", {}, {}", quote_string(id), quote_string(secret));
        }
        let _ = write!(args, ", {}", quote_string(&self.format));

        // Compression is positional after the structure, so an explicit
        // structure is required to reach it.
        match (&self.structure, &self.compression_method) {
            (Some(structure), Some(method)) => {
                let _ = write!(
                    args,
                    ", {}, {}",
                    quote_string(structure),
                    quote_string(method)
                );
            }
            (Some(structure), None) => {
                let _ = write!(args, ", {}", quote_string(structure));
            }
            (None, Some(method)) => {
                let _ = write!(args, ", 'auto', {}", quote_string(method));
            }
            (None, None) => (),
        }

        Ok(args)
    }
}

/// Location and credentials of a table on another ClickHouse instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Address expression, `host:port` or a `remote` shard pattern.
    pub addresses: String,
    pub database: String,
    pub table: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl RemoteSettings {
    pub fn new(
        addresses: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        RemoteSettings {
            addresses: addresses.into(),
            database: database.into(),
            table: table.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let missing = |field| ConfigurationError::MissingField {
            descriptor: "remote settings",
            field,
        };
        if self.addresses.is_empty() {
            return Err(missing("addresses"));
        }
        if self.database.is_empty() {
            return Err(missing("database"));
        }
        if self.table.is_empty() {
            return Err(missing("table"));
        }
        if self.user.is_empty() && !self.password.is_empty() {
            return Err(missing("user"));
        }
        Ok(())
    }

    fn credentials_args(&self) -> String {
        if self.user.is_empty() {
            String::new()
        } else {
            format!(
                ", {}, {}",
                quote_string(&self.user),
                quote_string(&self.password)
            )
        }
    }

    /// Render `remote(addr, db, table [, user, password])`.
    pub(crate) fn table_function(&self) -> Result<String, ConfigurationError> {
        self.validate()?;
        Ok(format!(
            "remote({}, {}, {}{})",
            quote_string(&self.addresses),
            quote_string(&self.database),
            quote_string(&self.table),
            self.credentials_args(),
        ))
    }

    /// Render `remote(addr, 'system', <table> [, user, password])` for reading
    /// the remote instance's system tables.
    pub(crate) fn system_table_function(&self, system_table: &str) -> Result<String, ConfigurationError> {
        self.validate()?;
        Ok(format!(
            "remote({}, 'system', {}{})",
            quote_string(&self.addresses),
            quote_string(system_table),
            self.credentials_args(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_args_without_credentials() {
        let settings = S3Settings::new("http://localhost:9001/bucket/file.csv");
        assert_eq!(
            "'http://localhost:9001/bucket/file.csv', 'CSVWithNames'",
            settings.function_args().unwrap()
        );
    }

    #[test]
    fn s3_args_full() {
        let settings = S3Settings::new("http://localhost:9001/bucket/file.csv.gz")
            .with_credentials("key", "secret")
            .with_format("CSV")
            .with_compression_method("gzip");
        assert_eq!(
            "'http://localhost:9001/bucket/file.csv.gz', 'key', 'secret', 'CSV', 'auto', 'gzip'",
            settings.function_args().unwrap()
        );
    }

    #[test]
    fn s3_half_credentials() {
        let mut settings = S3Settings::new("http://localhost:9001/bucket/file.csv");
        settings.access_key_id = Some("key".to_string());
        let err = settings.function_args().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingField {
                field: "secret_access_key",
                ..
            }
        ));
    }

    #[test]
    fn s3_missing_url() {
        let err = S3Settings::new("").function_args().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingField { field: "url", .. }));
    }

    #[test]
    fn s3_settings_from_json() {
        let settings: S3Settings =
            serde_json::from_str(r#"{"url": "http://localhost:9001/b/f"}"#).unwrap();
        assert_eq!(DEFAULT_S3_FORMAT, settings.format);
        assert_eq!(None, settings.access_key_id);
    }

    #[test]
    fn remote_function() {
        let remote = RemoteSettings::new("localhost:9000", "remote_db", "events", "default", "");
        assert_eq!(
            "remote('localhost:9000', 'remote_db', 'events', 'default', '')",
            remote.table_function().unwrap()
        );
        assert_eq!(
            "remote('localhost:9000', 'system', 'tables', 'default', '')",
            remote.system_table_function("tables").unwrap()
        );

        let anonymous = RemoteSettings::new("localhost:9000", "remote_db", "events", "", "");
        assert_eq!(
            "remote('localhost:9000', 'remote_db', 'events')",
            anonymous.table_function().unwrap()
        );
    }

    #[test]
    fn remote_missing_table() {
        let remote = RemoteSettings::new("localhost:9000", "remote_db", "", "default", "");
        let err = remote.table_function().unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingField { field: "table", .. }));
    }
}
