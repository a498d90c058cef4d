//! 配置管理模块
//!
//! 提供TOML配置文件的读取、写入、自动发现以及环境变量覆盖功能。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranslationError};
use crate::types::{CacheConfig, TranslationConfig};

/// 默认查找的配置文件位置
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "blog-translator.toml",
    "config.toml",
    ".blog-translator.toml",
];

/// 翻译库配置结构
///
/// 包含所有翻译和缓存相关的配置选项，支持从TOML文件加载和保存。
///
/// # 示例
///
/// ```rust,no_run
/// use blog_translator::TranslatorLibConfig;
///
/// // 从默认位置加载配置
/// let config = TranslatorLibConfig::load_from_default_locations();
///
/// // 从指定文件加载配置
/// let config = TranslatorLibConfig::from_file("config.toml").unwrap();
///
/// // 保存配置到文件
/// config.save_to_file("output.toml").unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslatorLibConfig {
    /// 翻译配置
    #[serde(default)]
    pub translation: TranslationConfig,
    /// 缓存配置
    #[serde(default)]
    pub cache: CacheConfig,
}

impl TranslatorLibConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| TranslationError::filesystem(path, e))?;
        let config: TranslatorLibConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| TranslationError::filesystem(path, e))?;
        Ok(())
    }

    /// Load configuration from multiple possible locations
    pub fn load_from_default_locations() -> Self {
        for path in &DEFAULT_CONFIG_PATHS {
            if Path::new(path).exists() {
                match Self::from_file(path) {
                    Ok(mut config) => {
                        tracing::info!("Loaded configuration from: {}", path);
                        config.apply_env_overrides();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("No configuration file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Generate example configuration file
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().save_to_file(path)
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_url) = lookup("BLOG_TRANSLATOR_API_URL") {
            tracing::info!("环境变量覆盖 API URL: {}", api_url);
            self.translation.api_url = api_url;
        }
        if let Some(model) = lookup("BLOG_TRANSLATOR_MODEL") {
            self.translation.model = model;
        }
        if let Some(api_key) = lookup("BLOG_TRANSLATOR_API_KEY") {
            self.translation.api_key = Some(api_key);
        }
        if let Some(target_lang) = lookup("BLOG_TRANSLATOR_TARGET_LANG") {
            self.translation.target_lang = target_lang;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.translation.api_url.trim().is_empty() {
            return Err(TranslationError::Config("api_url 不能为空".to_string()));
        }
        if self.translation.target_lang.trim().is_empty() {
            return Err(TranslationError::Config("target_lang 不能为空".to_string()));
        }
        if self.translation.max_text_length == 0 {
            return Err(TranslationError::Config("max_text_length 不能为0".to_string()));
        }
        if self.cache.expiry_days <= 0 {
            return Err(TranslationError::Config("expiry_days 必须大于0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog-translator.toml");

        let mut config = TranslatorLibConfig::default();
        config.translation.target_lang = "ja".to_string();
        config.cache.expiry_days = 7;
        config.save_to_file(&path).unwrap();

        let loaded = TranslatorLibConfig::from_file(&path).unwrap();
        assert_eq!(loaded.translation.target_lang, "ja");
        assert_eq!(loaded.cache.expiry_days, 7);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[translation]\nmodel = \"llama3\"\n").unwrap();

        let loaded = TranslatorLibConfig::from_file(&path).unwrap();
        assert_eq!(loaded.translation.model, "llama3");
        assert_eq!(loaded.translation.target_lang, "en");
        assert_eq!(loaded.cache.expiry_days, 30);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[translation\nmodel = ").unwrap();

        let err = TranslatorLibConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, TranslationError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_expiry() {
        let mut config = TranslatorLibConfig::default();
        config.cache.expiry_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BLOG_TRANSLATOR_API_URL", "http://10.0.0.2:1234/v1/chat/completions"),
            ("BLOG_TRANSLATOR_TARGET_LANG", "fr"),
        ]
        .into_iter()
        .collect();

        let mut config = TranslatorLibConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(
            config.translation.api_url,
            "http://10.0.0.2:1234/v1/chat/completions"
        );
        assert_eq!(config.translation.target_lang, "fr");
        assert!(config.translation.api_key.is_none());
    }
}
