//! Configuration storage

use anyhow::{bail, Context as _, Result};
use base64::Engine;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::media::srtp::{Context, ContextOptions, KeyingMaterial, Profile, ReplayProtection};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Protection profile name as used in SDP (e.g. AES_CM_128_HMAC_SHA1_80)
    pub profile: String,
    /// Base64 of master key || master salt, the SDES `inline:` value
    pub key: Option<String>,
    /// Base64 MKI sent with every packet; absent disables MKI mode
    pub mki: Option<String>,
    /// SRTP replay window size, 0 disables replay protection
    pub srtp_replay_window: usize,
    /// SRTCP replay window size, 0 disables replay protection
    pub srtcp_replay_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: Profile::default().to_string(),
            key: None,
            mki: None,
            srtp_replay_window: crate::media::srtp::DEFAULT_WINDOW_SIZE,
            srtcp_replay_window: crate::media::srtp::DEFAULT_WINDOW_SIZE,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "srtp-session", "srtp-session")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains keys)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn profile(&self) -> Result<Profile> {
        self.profile.parse()
    }

    pub fn keying_material(&self) -> Result<KeyingMaterial> {
        match &self.key {
            Some(key) => KeyingMaterial::from_base64(key),
            None => bail!("No SRTP key configured (run `srtp-session keygen --save`)"),
        }
    }

    pub fn mki_bytes(&self) -> Result<Option<Vec<u8>>> {
        let Some(mki) = &self.mki else {
            return Ok(None);
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(mki.trim())
            .context("failed to base64 decode MKI")?;
        if bytes.is_empty() {
            bail!("MKI must not be empty");
        }
        Ok(Some(bytes))
    }

    pub fn context_options(&self) -> Result<ContextOptions> {
        let mut options = ContextOptions::new()
            .srtp_replay_protection(ReplayProtection::Window(self.srtp_replay_window))
            .srtcp_replay_protection(ReplayProtection::Window(self.srtcp_replay_window));
        if let Some(mki) = self.mki_bytes()? {
            options = options.mki(mki);
        }
        Ok(options)
    }

    /// Build a protection context from the configured key, with `material`
    /// overriding it when given (e.g. from an SDP crypto line).
    pub fn build_context(&self, material: Option<&KeyingMaterial>) -> Result<Context> {
        let options = self.context_options()?;
        let built = match material {
            Some(material) => Context::new(self.profile()?, material, options),
            None => Context::new(self.profile()?, &self.keying_material()?, options),
        };
        built.context("Failed to create SRTP context")
    }
}
