//! Configuration file support for prowatch.
//!
//! Settings live in `~/.config/prowatch/config.toml` (or the platform
//! equivalent). The file is loaded once at startup and is immutable for the
//! session; a missing or unparsable file is fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WatchError};

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_REFRESH_SECS: u64 = 60;

/// Which pull request authors the watch list skips.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IgnoreBots {
    /// `true` skips any login carrying GitHub's `[bot]` suffix.
    Flag(bool),
    /// Explicit logins to skip, matched exactly.
    Logins(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// `owner/name`.
    pub full_name: String,
    pub default_branch: Option<String>,
    pub refresh_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Falls back to the `GITHUB_TOKEN` environment variable when absent.
    pub token: Option<String>,
    pub repos: Vec<RepoConfig>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    pub ignore_bots: Option<IgnoreBots>,
    /// Base URL for ticket links derived from PR titles.
    pub tickets_url: Option<String>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}

impl Config {
    pub fn refresh_time(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    /// Effective default branch for a repository, honoring its override.
    pub fn branch_for(&self, repo: &RepoConfig) -> String {
        repo.default_branch
            .clone()
            .unwrap_or_else(|| self.default_branch.clone())
    }

    /// Effective refresh cadence for a repository, honoring its override.
    pub fn refresh_for(&self, repo: &RepoConfig) -> Duration {
        match repo.refresh_secs {
            Some(secs) => Duration::from_secs(secs.max(1)),
            None => self.refresh_time(),
        }
    }

    pub fn token(&self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        std::env::var("GITHUB_TOKEN").map_err(|_| {
            WatchError::Config("no `token` in config and GITHUB_TOKEN is not set".to_string())
        })
    }

    pub fn is_ignored_author(&self, login: &str) -> bool {
        match &self.ignore_bots {
            None | Some(IgnoreBots::Flag(false)) => false,
            Some(IgnoreBots::Flag(true)) => login.ends_with("[bot]"),
            Some(IgnoreBots::Logins(logins)) => logins.iter().any(|l| l == login),
        }
    }

    fn validate(self) -> Result<Self> {
        if self.repos.is_empty() {
            return Err(WatchError::Config(
                "`repos` is empty; nothing to watch".to_string(),
            ));
        }
        for repo in &self.repos {
            if !repo.full_name.contains('/') {
                return Err(WatchError::Config(format!(
                    "repo `{}` is not an owner/name pair",
                    repo.full_name
                )));
            }
        }
        Ok(self)
    }
}

/// Default config file location, e.g. `~/.config/prowatch/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("prowatch").join("config.toml"))
}

/// Loads and validates the configuration. `path` overrides the default
/// location. Any failure here is `WatchError::Config` and fatal.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()
            .ok_or_else(|| WatchError::Config("cannot resolve a config directory".to_string()))?,
    };

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| WatchError::Config(format!("cannot read {}: {e}", path.display())))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| WatchError::Config(format!("cannot parse {}: {e}", path.display())))?;
    config.validate()
}

/// Printed when startup fails on configuration, so the user knows where to go.
pub fn sample() -> String {
    let path = config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "config.toml".to_string());
    format!(
        r#"Expected a config file at {path}, for example:

token = "ghp_..."          # or export GITHUB_TOKEN
default_branch = "main"
refresh_secs = 60
ignore_bots = true
tickets_url = "https://tickets.example.com/browse"

[[repos]]
full_name = "acme/widgets"

[[repos]]
full_name = "acme/gadgets"
default_branch = "develop"
refresh_secs = 30
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn full_config_parses_with_overrides() {
        let config = parse(
            r#"
token = "ghp_secret"
default_branch = "master"
refresh_secs = 120
ignore_bots = true
tickets_url = "https://tickets.example.com/browse"

[[repos]]
full_name = "acme/widgets"

[[repos]]
full_name = "acme/gadgets"
default_branch = "develop"
refresh_secs = 15
"#,
        );
        assert_eq!(config.token.as_deref(), Some("ghp_secret"));
        assert_eq!(config.refresh_time(), Duration::from_secs(120));
        assert_eq!(config.branch_for(&config.repos[0]), "master");
        assert_eq!(config.branch_for(&config.repos[1]), "develop");
        assert_eq!(config.refresh_for(&config.repos[0]), Duration::from_secs(120));
        assert_eq!(config.refresh_for(&config.repos[1]), Duration::from_secs(15));
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let config = parse(
            r#"
[[repos]]
full_name = "acme/widgets"
"#,
        );
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.refresh_time(), Duration::from_secs(60));
        assert!(config.ignore_bots.is_none());
    }

    #[test]
    fn ignore_bots_accepts_flag_and_list() {
        let flagged = parse("ignore_bots = true\n[[repos]]\nfull_name = \"a/b\"\n");
        assert!(flagged.is_ignored_author("dependabot[bot]"));
        assert!(!flagged.is_ignored_author("abbott"));

        let listed = parse("ignore_bots = [\"renovate\"]\n[[repos]]\nfull_name = \"a/b\"\n");
        assert!(listed.is_ignored_author("renovate"));
        assert!(!listed.is_ignored_author("dependabot[bot]"));

        let off = parse("ignore_bots = false\n[[repos]]\nfull_name = \"a/b\"\n");
        assert!(!off.is_ignored_author("dependabot[bot]"));
    }

    #[test]
    fn empty_repo_list_is_a_config_error() {
        let config: Config = toml::from_str("repos = []\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_repo_name_is_a_config_error() {
        let config: Config = toml::from_str("[[repos]]\nfull_name = \"widgets\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load(Some(&missing)).unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
    }

    #[test]
    fn load_reads_a_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "[[repos]]\nfull_name = \"acme/widgets\"\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.repos[0].full_name, "acme/widgets");
    }

    #[test]
    fn load_reports_bad_toml_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "repos = not-toml").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
    }
}
