use crate::http_client::HttpClient;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::gemini::GeminiProvider;
use crate::providers::mock::MockProvider;
use crate::providers::openai::OpenAiProvider;
use crate::providers::{Provider, ProviderChain, ProviderKind};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SHELL_CANDIDATES: &[&str] = &["/opt/homebrew/bin/bash", "/usr/local/bin/bash", "/bin/bash"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider_order: Vec<ProviderKind>,
    pub openai_key: Option<String>,
    pub anthropic_key: Option<String>,
    pub gemini_key: Option<String>,
    pub openai_model: Option<String>,
    pub anthropic_model: Option<String>,
    pub gemini_model: Option<String>,
    pub timeout_secs: u64,
    pub max_plan_steps: usize,
    pub context_window: usize,
    pub trigger_prefix: String,
    pub semantic_safety: bool,
    pub use_mock: bool,
    pub shell: Option<PathBuf>,
    #[serde(skip)]
    env: EnvLayer,
}

/// Settings taken from environment variables. They win over the file
/// values at runtime and are never written back to the file.
#[derive(Debug, Clone, Default, PartialEq)]
struct EnvLayer {
    keys: HashMap<ProviderKind, String>,
    use_mock: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_order: ProviderKind::ALL.to_vec(),
            openai_key: None,
            anthropic_key: None,
            gemini_key: None,
            openai_model: None,
            anthropic_model: None,
            gemini_model: None,
            timeout_secs: 20,
            max_plan_steps: 8,
            context_window: 10,
            trigger_prefix: ",".to_string(),
            semantic_safety: true,
            use_mock: false,
            shell: None,
            env: EnvLayer::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location) with
    /// environment variables layered on top. A missing or unreadable file
    /// falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::get_config_path()?,
        };
        let mut config = Self::load_from_file(&path);
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                info!("No config file at {}, using defaults", path.display());
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => {
                info!("Loaded config from: {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Layers environment variables over the file values. The file fields
    /// themselves are left as loaded, so `save` never persists them.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in ProviderKind::ALL {
            if let Some(key) = var(kind.env_key()).filter(|k| !k.trim().is_empty()) {
                self.env.keys.insert(kind, key);
            }
        }
        if let Some(mock) = var("THINKSHELL_USE_MOCK") {
            self.env.use_mock = Some(!matches!(mock.trim(), "" | "0" | "false"));
        }
    }

    /// Writes the config atomically with owner-only permissions.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::get_config_path()?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// `$THINKSHELL_CONFIG`, else `<config dir>/thinkshell/config.toml`.
    pub fn get_config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os("THINKSHELL_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(dir.join("thinkshell").join("config.toml"))
    }

    fn key_slot(&mut self, kind: ProviderKind) -> &mut Option<String> {
        match kind {
            ProviderKind::OpenAi => &mut self.openai_key,
            ProviderKind::Anthropic => &mut self.anthropic_key,
            ProviderKind::Gemini => &mut self.gemini_key,
        }
    }

    /// The environment key for `kind`, else the one from the file.
    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        if let Some(key) = self.env.keys.get(&kind) {
            return Some(key.as_str());
        }
        let key = match kind {
            ProviderKind::OpenAi => &self.openai_key,
            ProviderKind::Anthropic => &self.anthropic_key,
            ProviderKind::Gemini => &self.gemini_key,
        };
        key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn mock_mode(&self) -> bool {
        self.env.use_mock.unwrap_or(self.use_mock)
    }

    fn model(&self, kind: ProviderKind) -> Option<String> {
        match kind {
            ProviderKind::OpenAi => self.openai_model.clone(),
            ProviderKind::Anthropic => self.anthropic_model.clone(),
            ProviderKind::Gemini => self.gemini_model.clone(),
        }
    }

    pub fn set_api_key(&mut self, kind: ProviderKind, key: String) {
        *self.key_slot(kind) = Some(key);
    }

    /// Moves `kind` to the front of the provider order.
    pub fn prefer_provider(&mut self, kind: ProviderKind) {
        self.provider_order.retain(|k| *k != kind);
        self.provider_order.insert(0, kind);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// The configured shell, else the first bash found on this machine.
    pub fn shell_path(&self) -> PathBuf {
        if let Some(shell) = &self.shell {
            return shell.clone();
        }
        SHELL_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .or_else(|| which::which("bash").ok())
            .unwrap_or_else(|| PathBuf::from("/bin/bash"))
    }

    /// Providers with a key, in configured order; only the mock in mock mode.
    pub fn provider_chain(&self, http: Arc<dyn HttpClient>) -> ProviderChain {
        if self.mock_mode() {
            info!("Using mock provider (THINKSHELL_USE_MOCK)");
            return ProviderChain::new(vec![Box::new(MockProvider::new())]).with_timeout(self.timeout());
        }

        let mut providers: Vec<Box<dyn Provider>> = Vec::new();
        for &kind in &self.provider_order {
            let Some(key) = self.api_key(kind) else {
                continue;
            };
            let key = key.to_string();
            let model = self.model(kind);
            providers.push(match kind {
                ProviderKind::OpenAi => Box::new(OpenAiProvider::new(http.clone(), key, model)),
                ProviderKind::Anthropic => Box::new(AnthropicProvider::new(http.clone(), key, model)),
                ProviderKind::Gemini => Box::new(GeminiProvider::new(http.clone(), key, model)),
            });
        }
        ProviderChain::new(providers).with_timeout(self.timeout())
    }

    pub fn show_config_info_with_io<W: Write>(&self, path: &Path, output: &mut W) -> Result<()> {
        writeln!(output, "Configuration file: {}", path.display())?;
        writeln!(
            output,
            "Status: {}",
            if path.exists() { "Found" } else { "Not found (using defaults)" }
        )?;
        writeln!(output)?;
        writeln!(output, "Provider order:")?;
        for kind in &self.provider_order {
            let key = if self.api_key(*kind).is_some() { "key set" } else { "no key" };
            writeln!(output, "  {} ({})", kind.label(), key)?;
        }
        writeln!(output, "Mock mode: {}", self.mock_mode())?;
        writeln!(output, "Semantic safety check: {}", self.semantic_safety)?;
        writeln!(output, "Timeout: {}s", self.timeout_secs)?;
        writeln!(output, "Max plan steps: {}", self.max_plan_steps)?;
        writeln!(output, "Recent-step window: {}", self.context_window)?;
        writeln!(output, "Trigger prefix: {:?}", self.trigger_prefix)?;
        writeln!(output, "Shell: {}", self.shell_path().display())?;
        writeln!(output)?;
        writeln!(output, "To set API keys:")?;
        writeln!(output, "  thinkshell --openai-key <key>")?;
        writeln!(output, "Or set environment variables:")?;
        for kind in ProviderKind::ALL {
            writeln!(output, "  export {}=<key>", kind.env_key())?;
        }
        Ok(())
    }
}
