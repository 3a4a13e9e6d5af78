//! Database credential source.

use crate::config::DatabaseConfig;

#[derive(Clone)]
pub struct DbCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    fn database_credentials(&self) -> anyhow::Result<DbCredentials>;
}

/// Credentials taken from the loaded configuration (file or `DB_*` environment).
pub struct ConfigCredentials {
    database: DatabaseConfig,
}

impl ConfigCredentials {
    pub fn new(database: DatabaseConfig) -> Self {
        Self { database }
    }
}

impl CredentialProvider for ConfigCredentials {
    fn database_credentials(&self) -> anyhow::Result<DbCredentials> {
        if self.database.user.is_empty() {
            anyhow::bail!("Database user is not configured");
        }
        Ok(DbCredentials {
            host: self.database.host.clone(),
            user: self.database.user.clone(),
            password: self.database.password.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = DbCredentials {
            host: "localhost".into(),
            user: "ceymail".into(),
            password: "pa55".into(),
        };
        assert!(!format!("{creds:?}").contains("pa55"));
    }

    #[test]
    fn test_missing_user_is_error() {
        let provider = ConfigCredentials::new(DatabaseConfig {
            user: String::new(),
            ..Default::default()
        });
        assert!(provider.database_credentials().is_err());
    }
}
