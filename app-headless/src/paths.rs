use std::path::PathBuf;

use shopbell_core::platform::AppPaths;

#[derive(Default)]
pub struct HeadlessPaths {
    config_override: Option<PathBuf>,
}

impl HeadlessPaths {
    pub fn with_config(config_override: Option<PathBuf>) -> Self {
        Self { config_override }
    }
}

impl AppPaths for HeadlessPaths {
    fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config_override {
            return path.clone();
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shopbell")
            .join("config.toml")
    }
}
