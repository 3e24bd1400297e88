use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.chitai-gorod.ru";
pub const DEFAULT_SEARCH_QUERY: &str = "книга";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StorecheckConfig {
    pub target: TargetSection,
    pub browser: BrowserSection,
    pub selectors: SelectorSection,
    pub auth: AuthSection,
    pub reporting: ReportingSection,
    pub runner: RunnerSection,
}

impl StorecheckConfig {
    /// Checks the values serde cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.target.base_url).map_err(|err| ConfigError::Invalid {
            field: "target.base_url",
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "target.base_url",
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.target.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "target.timeout_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        if self.browser.wait_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "browser.wait_timeout_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        let path = Path::new(&self.reporting.screenshots_dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.reporting.results_dir).join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub search_query: String,
}

impl TargetSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "ru-RU,ru;q=0.9,en;q=0.8".to_string(),
            search_query: DEFAULT_SEARCH_QUERY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window: [u32; 2],
    pub request_timeout_seconds: Option<u64>,
    pub wait_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub settle_ms: u64,
}

impl BrowserSection {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: true,
            window: [1920, 1080],
            request_timeout_seconds: Some(30),
            wait_timeout_seconds: 15,
            poll_interval_ms: 500,
            settle_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub cookie_accept: String,
    pub search_inputs: Vec<String>,
    pub search_button: String,
    pub product_cards: Vec<String>,
    pub landmarks: Vec<String>,
    pub navigation_links: String,
}

impl Default for SelectorSection {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            cookie_accept:
                "//button[contains(text(), 'Принять') or contains(text(), 'Согласен')]".to_string(),
            search_inputs: owned(&[
                "input[type='search']",
                "input[placeholder*='поиск']",
                "input[placeholder*='search']",
                ".search-input",
                "#search-input",
                "input[name='q']",
                "input[name='query']",
                ".header-search__input",
                "[data-testid='search-input']",
            ]),
            search_button: "button[type='submit'], .search-btn".to_string(),
            product_cards: owned(&[
                ".product-card",
                ".book-item",
                ".item-card",
                ".catalog-item",
                ".product-item",
                "[data-product]",
                ".product",
                ".book",
            ]),
            landmarks: owned(&["header", "footer", "main", "nav"]),
            navigation_links: "nav a, .menu-item, .header__menu-item".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub token: Option<String>,
    pub cookie_domain: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token: None,
            cookie_domain: "chitai-gorod.ru".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingSection {
    pub results_dir: String,
    pub screenshots_dir: String,
    pub enabled: bool,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            results_dir: "allure-results".to_string(),
            screenshots_dir: "screenshots".to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub api_pause_ms: u64,
    pub ui_pause_ms: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            api_pause_ms: 1000,
            ui_pause_ms: 2000,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StorecheckConfig> {
    let config: StorecheckConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
