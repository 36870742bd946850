use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub approval: ApprovalConfig,

    pub smtp: SmtpConfig,

    pub bootstrap: BootstrapConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/site-admin.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    /// HMAC secret for session tokens. Left empty, a random secret is
    /// generated at startup and every token dies with the process.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jwt_secret: String,

    pub token_expiry_hours: i64,

    pub lockout: LockoutConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            jwt_secret: String::new(),
            token_expiry_hours: 24,
            lockout: LockoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins that trigger a lock.
    pub max_attempts: u32,

    pub lockout_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 30,
        }
    }
}

/// Out-of-band approval of privileged account changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Operator mailbox that receives every one-time code, whichever
    /// account the change targets.
    pub approver_email: String,

    pub code_ttl_minutes: i64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            approver_email: "admin@localhost".to_string(),
            code_ttl_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// With SMTP disabled, codes are only recorded in the ledger and the
    /// delivery attempt is logged.
    pub enabled: bool,

    pub host: String,

    pub port: u16,

    /// Implicit TLS (port 465 style). When false, STARTTLS is used.
    pub secure: bool,

    pub username: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,

    pub from_email: String,

    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "smtp.gmail.com".to_string(),
            port: 465,
            secure: true,
            username: String::new(),
            password: String::new(),
            from_email: "no-reply@localhost".to_string(),
            from_name: "Universal Technology".to_string(),
        }
    }
}

/// First-run administrator, created only when no admin row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_username: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub admin_password: String,

    pub admin_email: String,

    pub first_name: String,

    pub last_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_password: "Admin12345".to_string(),
            admin_email: "admin@localhost".to_string(),
            first_name: "System".to_string(),
            last_name: "Administrator".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    /// Applies the deployment environment on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.general.database_path = url;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.security.jwt_secret = secret;
        }
        if let Some(hours) = get("JWT_EXPIRES_IN_HOURS").and_then(|h| h.parse().ok()) {
            self.security.token_expiry_hours = hours;
        }
        if let Some(username) = get("ADMIN_USERNAME") {
            self.bootstrap.admin_username = username;
        }
        if let Some(password) = get("ADMIN_PASSWORD") {
            self.bootstrap.admin_password = password;
        }
        if let Some(email) = get("ADMIN_EMAIL") {
            self.bootstrap.admin_email.clone_from(&email);
            self.approval.approver_email = email;
        }
        if let Some(host) = get("SMTP_HOST") {
            self.smtp.host = host;
            self.smtp.enabled = true;
        }
        if let Some(port) = get("SMTP_PORT").and_then(|p| p.parse().ok()) {
            self.smtp.port = port;
        }
        if let Some(secure) = get("SMTP_SECURE") {
            self.smtp.secure = secure.eq_ignore_ascii_case("true");
        }
        if let Some(user) = get("SMTP_USER") {
            self.smtp.username = user;
        }
        if let Some(pass) = get("SMTP_PASS") {
            self.smtp.password = pass;
        }
        if let Some(from) = get("FROM_EMAIL") {
            self.smtp.from_email = from;
        }
        if let Some(name) = get("FROM_NAME") {
            self.smtp.from_name = name;
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("site-admin").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".site-admin").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.lockout.max_attempts == 0 {
            anyhow::bail!("security.lockout.max_attempts must be at least 1");
        }

        if self.security.lockout.lockout_minutes <= 0 {
            anyhow::bail!("security.lockout.lockout_minutes must be positive");
        }

        if self.security.token_expiry_hours <= 0 {
            anyhow::bail!("security.token_expiry_hours must be positive");
        }

        if self.approval.approver_email.trim().is_empty() {
            anyhow::bail!("approval.approver_email cannot be empty");
        }

        if self.approval.code_ttl_minutes <= 0 {
            anyhow::bail!("approval.code_ttl_minutes must be positive");
        }

        if self.smtp.enabled && self.smtp.host.is_empty() {
            anyhow::bail!("SMTP host cannot be empty when SMTP is enabled");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.security.token_expiry_hours, 24);
        assert_eq!(config.security.lockout.max_attempts, 5);
        assert_eq!(config.security.lockout.lockout_minutes, 30);
        assert_eq!(config.approval.code_ttl_minutes, 10);
        assert!(!config.smtp.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_hides_empty_secrets() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[security.lockout]"));
        assert!(toml_str.contains("[approval]"));
        assert!(!toml_str.contains("jwt_secret"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [security.lockout]
            max_attempts = 3

            [approval]
            approver_email = "ops@example.com"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.security.lockout.max_attempts, 3);
        assert_eq!(config.security.lockout.lockout_minutes, 30);
        assert_eq!(config.approval.approver_email, "ops@example.com");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8080"),
            ("JWT_SECRET", "s3cret"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("SMTP_HOST", "mail.example.com"),
            ("SMTP_SECURE", "false"),
            ("FROM_NAME", ""),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.jwt_secret, "s3cret");
        assert_eq!(config.bootstrap.admin_email, "root@example.com");
        assert_eq!(config.approval.approver_email, "root@example.com");
        assert!(config.smtp.enabled);
        assert!(!config.smtp.secure);
        assert_eq!(config.smtp.from_name, "Universal Technology");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.security.lockout.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.approval.approver_email = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.smtp.enabled = true;
        config.smtp.host.clear();
        assert!(config.validate().is_err());
    }
}
