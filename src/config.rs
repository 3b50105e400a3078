//! Configuration loading.
//!
//! Settings come from a YAML file. Empty or missing values fall back to
//! defaults after credentials have been overridden from the environment, so
//! `email.from` follows whichever user is finally in effect.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::delivery::{OutgoingMail, SmtpConfig};
use crate::error::ConfigError;
use crate::mailbox::{FilterRule, ImapConfig, Recency};
use crate::naming::NamingStrategy;
use crate::pipeline::RunSettings;
use crate::render::RenderSettings;
use crate::transform::VendorProfile;

/// Config file used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "INVOICE_MAILER_CONFIG";

/// Environment variable overriding `user`.
pub const USER_VAR: &str = "INVOICE_MAILER_USER";

/// Environment variable overriding `pass`.
pub const PASS_VAR: &str = "INVOICE_MAILER_PASS";

const DEFAULT_IMAP_PORT: u16 = 993;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_MAILBOX: &str = "INBOX";
const DEFAULT_IMAP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 15;
const DEFAULT_FILTER_SUBJECT: &str = "Deine Rechnung von Apple";
const DEFAULT_FILTER_SENDER: &str = "apple.com";
const DEFAULT_EMAIL_SUBJECT: &str = "Deine PDF-Rechnungen von Apple";
const DEFAULT_EMAIL_BODY: &str = "Dokumente anbei.\n";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImapSection {
    pub host: String,
    pub port: u16,
    pub mailbox: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SmtpSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailSection {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    /// Most recent messages to scan; 0 scans everything.
    pub count: usize,
    pub subject: String,
    /// Sender domain substring.
    pub from: String,
    pub recency: Recency,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImageSection {
    pub timeout_secs: u64,
}

/// Full application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub imap: ImapSection,
    pub smtp: SmtpSection,
    pub user: String,
    #[serde(deserialize_with = "secret")]
    pub pass: Option<SecretString>,
    pub email: EmailSection,
    pub filter: FilterSection,
    pub vendor: VendorProfile,
    pub naming: NamingStrategy,
    pub render: RenderSettings,
    pub images: ImageSection,
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Config {
    /// Load from `path`, applying environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, resolving overrides through `lookup`.
    pub fn load_with(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml, lookup)
    }

    /// Parse YAML, apply overrides and defaults, then validate.
    pub fn from_yaml(
        yaml: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?
        };
        config.apply_overrides(&lookup);
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Config file path: first CLI argument, else `INVOICE_MAILER_CONFIG`,
    /// else `config.yaml`.
    pub fn resolve_path(
        arg: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PathBuf {
        arg.or_else(|| lookup(CONFIG_PATH_VAR))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
            .into()
    }

    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(user) = lookup(USER_VAR).filter(|v| !v.is_empty()) {
            self.user = user;
        }
        if let Some(pass) = lookup(PASS_VAR).filter(|v| !v.is_empty()) {
            self.pass = Some(SecretString::from(pass));
        }
    }

    fn apply_defaults(&mut self) {
        fill(&mut self.imap.mailbox, DEFAULT_MAILBOX);
        if self.imap.port == 0 {
            self.imap.port = DEFAULT_IMAP_PORT;
        }
        if self.imap.timeout_secs == 0 {
            self.imap.timeout_secs = DEFAULT_IMAP_TIMEOUT_SECS;
        }
        if self.smtp.host.is_empty() {
            self.smtp.host = self.imap.host.replace("imap", "smtp");
        }
        if self.smtp.port == 0 {
            self.smtp.port = DEFAULT_SMTP_PORT;
        }
        if self.email.from.is_empty() {
            self.email.from = self.user.clone();
        }
        fill(&mut self.email.subject, DEFAULT_EMAIL_SUBJECT);
        fill(&mut self.email.body, DEFAULT_EMAIL_BODY);
        fill(&mut self.filter.subject, DEFAULT_FILTER_SUBJECT);
        fill(&mut self.filter.from, DEFAULT_FILTER_SENDER);
        if self.images.timeout_secs == 0 {
            self.images.timeout_secs = DEFAULT_IMAGE_TIMEOUT_SECS;
        }

        let naming = NamingStrategy::default();
        fill(&mut self.naming.default_name, &naming.default_name);
        fill(&mut self.naming.extension, &naming.extension);
        if self.render.timeout_secs == 0 {
            self.render.timeout_secs = RenderSettings::default().timeout_secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require("imap.host", &self.imap.host, "Set imap.host in the config file")?;
        require(
            "user",
            &self.user,
            &format!("Set user in the config file or {USER_VAR}"),
        )?;
        if self.pass.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "pass".into(),
                hint: format!("Set pass in the config file or {PASS_VAR}"),
            });
        }
        require("email.to", &self.email.to, "Set the recipient address")?;
        if self.render.paper_width_in <= 0.0 || self.render.paper_height_in <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "render".into(),
                message: "paper size must be positive".into(),
            });
        }
        self.vendor.validate()
    }

    pub fn filter_rule(&self) -> FilterRule {
        FilterRule {
            subject: self.filter.subject.clone(),
            sender_domain: self.filter.from.clone(),
            recency: self.filter.recency,
            window: self.filter.count,
        }
    }

    pub fn outgoing(&self) -> OutgoingMail {
        OutgoingMail {
            from: self.email.from.clone(),
            to: self.email.to.clone(),
            subject: self.email.subject.clone(),
            body: self.email.body.clone(),
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            filter: self.filter_rule(),
            naming: self.naming.clone(),
            mail: self.outgoing(),
        }
    }

    pub fn imap_config(&self) -> ImapConfig {
        ImapConfig {
            host: self.imap.host.clone(),
            port: self.imap.port,
            username: self.user.clone(),
            password: self.password(),
            mailbox: self.imap.mailbox.clone(),
            timeout: Duration::from_secs(self.imap.timeout_secs),
        }
    }

    /// SMTP settings. Uses the mailbox credentials.
    pub fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp.host.clone(),
            port: self.smtp.port,
            username: self.user.clone(),
            password: self.password(),
        }
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.images.timeout_secs)
    }

    fn password(&self) -> SecretString {
        let pass = self.pass.as_ref().map(|p| p.expose_secret()).unwrap_or_default();
        SecretString::from(pass)
    }
}

fn fill(value: &mut String, default: &str) {
    if value.trim().is_empty() {
        *value = default.to_string();
    }
}

fn require(key: &str, value: &str, hint: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: key.into(),
            hint: hint.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
imap:
  host: imap.mail.me.com
user: me@icloud.com
pass: app-password
email:
  to: accounting@example.com
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_yaml(MINIMAL, no_env).unwrap();
        assert_eq!(config.imap.port, 993);
        assert_eq!(config.imap.mailbox, "INBOX");
        assert_eq!(config.smtp.host, "smtp.mail.me.com");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.email.from, "me@icloud.com");
        assert_eq!(config.email.subject, "Deine PDF-Rechnungen von Apple");
        assert_eq!(config.email.body, "Dokumente anbei.\n");
        assert_eq!(config.filter.subject, "Deine Rechnung von Apple");
        assert_eq!(config.filter.from, "apple.com");
        assert_eq!(config.filter.count, 0);
        assert_eq!(config.filter.recency, Recency::CurrentMonth);
        assert_eq!(config.image_timeout(), Duration::from_secs(15));
        assert_eq!(config.render.timeout(), Duration::from_secs(60));
        assert_eq!(config.naming, NamingStrategy::default());
        assert_eq!(config.vendor, VendorProfile::default());
    }

    #[test]
    fn explicit_values_win() {
        let yaml = r#"
imap: { host: imap.example.com, port: 143, mailbox: Invoices }
smtp: { host: mail.example.com, port: 465 }
user: me@example.com
pass: secret
email: { from: bills@example.com, to: me@example.com, subject: PDFs }
filter: { count: 50, subject: Your receipt, from: example.org, recency: unbounded }
naming: { token: _Receipt_ }
vendor: { order_marker: "Order ID:" }
images: { timeout_secs: 3 }
"#;
        let config = Config::from_yaml(yaml, no_env).unwrap();
        let rule = config.filter_rule();
        assert_eq!(rule.window, 50);
        assert_eq!(rule.subject, "Your receipt");
        assert_eq!(rule.sender_domain, "example.org");
        assert_eq!(rule.recency, Recency::Unbounded);

        let smtp = config.smtp_config();
        assert_eq!(smtp.host, "mail.example.com");
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.password.expose_secret(), "secret");

        let imap = config.imap_config();
        assert_eq!(imap.port, 143);
        assert_eq!(imap.mailbox, "Invoices");

        assert_eq!(config.outgoing().from, "bills@example.com");
        assert_eq!(config.naming.token, "_Receipt_");
        assert_eq!(config.naming.extension, "pdf");
        assert_eq!(config.vendor.order_marker, "Order ID:");
        assert_eq!(config.vendor.tax_label, "UID-Nr");
        assert_eq!(config.image_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn environment_overrides_credentials() {
        let lookup = |key: &str| match key {
            USER_VAR => Some("other@icloud.com".to_string()),
            PASS_VAR => Some("from-env".to_string()),
            _ => None,
        };
        let config = Config::from_yaml(MINIMAL, lookup).unwrap();
        assert_eq!(config.user, "other@icloud.com");
        assert_eq!(config.email.from, "other@icloud.com");
        assert_eq!(config.imap_config().password.expose_secret(), "from-env");
    }

    #[test]
    fn missing_required_fields() {
        let err = Config::from_yaml("user: me@example.com", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "imap.host"));

        let no_to = "imap: { host: imap.example.com }\nuser: me@example.com\npass: x";
        let err = Config::from_yaml(no_to, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "email.to"));

        let no_pass = "imap: { host: imap.example.com }\nuser: me@example.com\nemail: { to: a@b.c }";
        let err = Config::from_yaml(no_pass, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "pass"));
    }

    #[test]
    fn bad_selector_rejected() {
        let yaml = format!("{MINIMAL}vendor:\n  action_button: \"[[\"\n");
        let err = Config::from_yaml(&yaml, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "vendor.action_button"));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = Config::from_yaml("imap: [unclosed", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load_with(file.path(), no_env).unwrap();
        assert_eq!(config.imap.host, "imap.mail.me.com");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_with(&dir.path().join("absent.yaml"), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn config_path_resolution() {
        assert_eq!(
            Config::resolve_path(Some("custom.yaml".into()), no_env),
            PathBuf::from("custom.yaml")
        );
        let env = |key: &str| (key == CONFIG_PATH_VAR).then(|| "/etc/invoices.yaml".to_string());
        assert_eq!(
            Config::resolve_path(None, env),
            PathBuf::from("/etc/invoices.yaml")
        );
        assert_eq!(Config::resolve_path(None, no_env), PathBuf::from("config.yaml"));
    }
}
