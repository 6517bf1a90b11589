//! Deployment parameters.
//!
//! Everything the stack composer needs is read once at startup into an
//! [`AppConfig`] and passed by value from there on. Values come from, in order
//! of precedence:
//! - the process environment
//! - a `.env` file (a missing file is not an error)
//!
//! or from a sites file that maps a site id to its parameters.
//!
//! Missing values become empty strings. Nothing here checks that a domain or
//! certificate ARN is well formed; bad values only surface when CloudFormation
//! tries to create the resources.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const ENV_SSL_CERTIFICATION_ARN: &str = "STACK_SSL_CERTIFICATION_ARN";
pub const ENV_SUB_DOMAIN_NAME: &str = "SUB_DOMAIN_NAME";
pub const ENV_DOMAIN_NAME: &str = "DOMAIN_NAME";
pub const ENV_DEPLOY_ACCOUNT: &str = "CDK_DEPLOY_ACCOUNT";
pub const ENV_DEFAULT_ACCOUNT: &str = "CDK_DEFAULT_ACCOUNT";
pub const ENV_ASSETS_BUCKET: &str = "STACK_ASSETS_BUCKET";

pub const DEFAULT_STACK_ID: &str = "dev";
pub const DEFAULT_STACK_NAME: &str = "static-site-test";

/// The three values a site is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteParameters {
    #[serde(default)]
    pub sub_domain_name: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub ssl_certificate_arn: String,
}

impl SiteParameters {
    pub fn new<S: Into<String>>(sub_domain_name: S, domain_name: S, ssl_certificate_arn: S) -> Self {
        Self {
            sub_domain_name: sub_domain_name.into(),
            domain_name: domain_name.into(),
            ssl_certificate_arn: ssl_certificate_arn.into(),
        }
    }

    /// `sub-domain.domain`, without any label validation.
    pub fn hostname(&self) -> String {
        format!("{}.{}", self.sub_domain_name, self.domain_name)
    }
}

/// One entry of a sites file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    #[serde(flatten)]
    pub parameters: SiteParameters,
    /// defaults to `static-site-<site id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,
}

pub type SitesFile = BTreeMap<String, SiteEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub stack_id: String,
    pub stack_name: String,
    pub site: SiteParameters,
    /// target account, `None` means whatever the credentials resolve to.
    pub account: Option<String>,
    /// staging bucket for the edge function bundle and the website content.
    pub assets_bucket: Option<String>,
}

impl AppConfig {
    /// The single `dev` site described by environment variables.
    pub fn from_env(vars: &EnvVars) -> Self {
        let site = SiteParameters {
            sub_domain_name: vars.get_or_empty(ENV_SUB_DOMAIN_NAME),
            domain_name: vars.get_or_empty(ENV_DOMAIN_NAME),
            ssl_certificate_arn: vars.get_or_empty(ENV_SSL_CERTIFICATION_ARN),
        };
        Self {
            stack_id: DEFAULT_STACK_ID.to_string(),
            stack_name: DEFAULT_STACK_NAME.to_string(),
            site,
            account: vars.account(),
            assets_bucket: vars.non_empty(ENV_ASSETS_BUCKET),
        }
    }

    /// A named site from a sites file. Account and staging bucket still come
    /// from the environment.
    pub fn from_sites(sites: &SitesFile, site_id: &str, vars: &EnvVars) -> Result<Self> {
        let entry = match sites.get(site_id) {
            Some(entry) => entry,
            None => return Err(Error::SiteNotFound(site_id.to_string())),
        };
        let stack_name = match &entry.stack_name {
            Some(name) => name.clone(),
            None => format!("static-site-{site_id}"),
        };
        Ok(Self {
            stack_id: site_id.to_string(),
            stack_name,
            site: entry.parameters.clone(),
            account: vars.account(),
            assets_bucket: vars.non_empty(ENV_ASSETS_BUCKET),
        })
    }
}

/// Variable lookup with `.env` values underneath the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Reads `dot_env_path` (if it exists) and overlays the process environment.
    pub fn load(dot_env_path: &Path) -> Result<Self> {
        let mut vars = match std::fs::read_to_string(dot_env_path) {
            Ok(contents) => {
                debug!(path = %dot_env_path.display(), "loaded .env file");
                parse_dot_env(&contents)
            }
            Err(error) => match error.kind() {
                io::ErrorKind::NotFound => HashMap::new(),
                _ => {
                    return Err(Error::Io(format!(
                        "Failed to load .env file {}: {}",
                        dot_env_path.display(),
                        error
                    )))
                }
            },
        };
        vars.extend(std::env::vars());
        Ok(Self { vars })
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let vars = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    pub fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).map(str::to_string)
    }

    /// `CDK_DEPLOY_ACCOUNT`, falling back to `CDK_DEFAULT_ACCOUNT`.
    pub fn account(&self) -> Option<String> {
        self.non_empty(ENV_DEPLOY_ACCOUNT)
            .or_else(|| self.non_empty(ENV_DEFAULT_ACCOUNT))
    }
}

pub fn parse_dot_env(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            map.insert(key.trim().to_string(), unquote(val.trim()).to_string());
        }
    }
    map
}

fn unquote(val: &str) -> &str {
    for quote in ['"', '\''] {
        if val.len() >= 2 && val.starts_with(quote) && val.ends_with(quote) {
            return &val[1..val.len() - 1];
        }
    }
    val
}

pub fn load_sites(path: &Path) -> Result<SitesFile> {
    let contents = match std::fs::read_to_string(path) {
        Ok(raw_contents) => raw_contents,
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => {
                return Err(Error::Io(format!("File {} not found", path.display())))
            }
            _ => return Err(Error::Io(error.to_string())),
        },
    };
    serde_yaml::from_str(&contents).map_err(|e| Error::Parsing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn hostname_joins_with_a_single_dot() {
        let pairs = [("www", "example.com"), ("a.b", "c.d"), ("", "example.com"), ("", "")];
        for (sub, domain) in pairs {
            let params = SiteParameters::new(sub, domain, "");
            assert_eq!(params.hostname(), format!("{sub}.{domain}"));
        }
    }

    #[test]
    fn dot_env_skips_comments_and_strips_quotes() {
        let map = parse_dot_env("# comment\n\nDOMAIN_NAME=example.com\nSUB_DOMAIN_NAME = \"www\"\nBROKEN LINE\nSTACK_SSL_CERTIFICATION_ARN='arn:aws:acm:us-east-1:1:certificate/abc'\n");
        assert_eq!(map.len(), 3);
        assert_eq!(map["DOMAIN_NAME"], "example.com");
        assert_eq!(map["SUB_DOMAIN_NAME"], "www");
        assert_eq!(map["STACK_SSL_CERTIFICATION_ARN"], "arn:aws:acm:us-east-1:1:certificate/abc");
    }

    #[test]
    fn missing_values_become_empty_strings() {
        let config = AppConfig::from_env(&EnvVars::default());
        assert_eq!(config.stack_id, "dev");
        assert_eq!(config.stack_name, "static-site-test");
        assert_eq!(config.site, SiteParameters::default());
        assert_eq!(config.site.hostname(), ".");
        assert_eq!(config.account, None);
        assert_eq!(config.assets_bucket, None);
    }

    #[test]
    fn deploy_account_wins_over_default_account() {
        let vars = EnvVars::from_pairs([
            (ENV_DEPLOY_ACCOUNT, "111111111111"),
            (ENV_DEFAULT_ACCOUNT, "222222222222"),
        ]);
        assert_eq!(vars.account().as_deref(), Some("111111111111"));

        let vars = EnvVars::from_pairs([
            (ENV_DEPLOY_ACCOUNT, ""),
            (ENV_DEFAULT_ACCOUNT, "222222222222"),
        ]);
        assert_eq!(vars.account().as_deref(), Some("222222222222"));
    }

    #[test]
    fn process_environment_overrides_dot_env() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(".env");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "STATIC_SITE_TEST_OVERRIDE=from-file").unwrap();
        writeln!(file, "STATIC_SITE_TEST_FILE_ONLY=file-only").unwrap();
        std::env::set_var("STATIC_SITE_TEST_OVERRIDE", "from-process");

        let vars = EnvVars::load(&file_path).unwrap();
        assert_eq!(vars.get("STATIC_SITE_TEST_OVERRIDE"), Some("from-process"));
        assert_eq!(vars.get("STATIC_SITE_TEST_FILE_ONLY"), Some("file-only"));
    }

    #[test]
    fn missing_dot_env_is_not_an_error() {
        let dir = tempdir().unwrap();
        let result = EnvVars::load(&dir.path().join(".env"));
        assert!(result.is_ok());
    }

    #[test]
    fn sites_file_selects_a_site() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sites.yaml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "blog:\n  sub_domain_name: blog\n  domain_name: example.com\n  ssl_certificate_arn: arn:aws:acm:us-east-1:1:certificate/abc").unwrap();
        writeln!(file, "docs:\n  sub_domain_name: docs\n  domain_name: example.org\n  stack_name: docs-site").unwrap();

        let sites = load_sites(&file_path).unwrap();
        let vars = EnvVars::from_pairs([(ENV_ASSETS_BUCKET, "my-assets")]);

        let blog = AppConfig::from_sites(&sites, "blog", &vars).unwrap();
        assert_eq!(blog.stack_id, "blog");
        assert_eq!(blog.stack_name, "static-site-blog");
        assert_eq!(blog.site.hostname(), "blog.example.com");
        assert_eq!(blog.assets_bucket.as_deref(), Some("my-assets"));

        let docs = AppConfig::from_sites(&sites, "docs", &vars).unwrap();
        assert_eq!(docs.stack_name, "docs-site");
        assert_eq!(docs.site.ssl_certificate_arn, "");

        let missing = AppConfig::from_sites(&sites, "shop", &vars);
        assert_eq!(missing, Err(Error::SiteNotFound("shop".to_string())));
    }

    #[test]
    fn sites_file_not_found() {
        let dir = tempdir().unwrap();
        match load_sites(&dir.path().join("sites.yaml")) {
            Err(Error::Io(_)) => {}
            _ => panic!("Expected `Io` error"),
        }
    }
}
