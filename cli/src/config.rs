//! Persistent CLI configuration, loaded and saved through `confy` (a small
//! TOML-backed settings file under the user's config directory).

use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_NAME: &str = "txdb";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLoad {
    /// Where the on-disk engine file lives. Defaults next to the config
    /// file itself so a first run works without any setup.
    pub data_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for ConfigLoad {
    fn default() -> Self {
        ConfigLoad { data_dir: None, verbose: false }
    }
}

impl ConfigLoad {
    pub fn load() -> anyhow::Result<Self> {
        Ok(confy::load(APP_NAME, None)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        Ok(confy::store(APP_NAME, None, self)?)
    }

    /// Resolves the effective data directory, falling back to the OS's
    /// standard data directory for this app if nothing was configured.
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs_fallback().join(APP_NAME)
        })
    }

    /// Applies command-line overrides on top of whatever was loaded from
    /// disk, without persisting them.
    pub fn inject_cmd(&mut self, data_dir: Option<PathBuf>, verbose: bool) {
        if let Some(dir) = data_dir {
            self.data_dir = Some(dir);
        }
        self.verbose = self.verbose || verbose;
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_cmd_overrides_data_dir_but_keeps_existing_verbose() {
        let mut cfg = ConfigLoad { data_dir: None, verbose: true };
        cfg.inject_cmd(Some(PathBuf::from("/tmp/x")), false);
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(cfg.verbose);
    }

    #[test]
    fn resolve_data_dir_falls_back_when_unset() {
        let cfg = ConfigLoad::default();
        assert!(cfg.resolve_data_dir().ends_with(APP_NAME));
    }
}
