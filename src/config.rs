use crate::language::LanguageDefinition;
use crate::parser;
use crate::registry::Registry;
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "tmpl.toml";

/// tmpl.toml，可选；不存在时全部使用默认值
#[derive(Debug, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub syntaxes: SyntaxesConfig,
    #[serde(default)]
    pub languages: Vec<CustomLanguage>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyntaxesConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default = "default_injection_scopes")]
    pub injection_scopes: Vec<String>,
}

/// [[languages]] 自定义语言
#[derive(Debug, Deserialize)]
pub struct CustomLanguage {
    #[serde(flatten)]
    pub definition: LanguageDefinition,
    #[serde(default)]
    pub parser: Option<String>,
}

impl ProjectConfig {
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("读取 {CONFIG_FILE} 失败：{}", e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("解析 {CONFIG_FILE} 失败：{}", e))
    }

    /// 将自定义语言追加到注册表
    pub fn register_languages(&self, registry: &mut Registry) -> Result<()> {
        for custom in &self.languages {
            let definition = custom.definition.clone();
            let extension = definition.extension.clone();
            match custom.parser.as_deref() {
                Some(name) => {
                    let parser = parser::by_name(name).ok_or_else(|| {
                        anyhow::anyhow!("语言 {extension} 的解析器 `{name}` 不存在")
                    })?;
                    registry.register_with_parser(definition, parser)?;
                }
                None => {
                    registry.register(definition)?;
                }
            }
            tracing::debug!("已注册自定义语言: {extension}");
        }
        Ok(())
    }
}

// 默认值函数
fn default_log_level() -> String { "info".into() }
fn default_out_dir() -> String { "syntaxes".into() }
fn default_manifest() -> String { "package.json".into() }
fn default_injection_scopes() -> Vec<String> { vec!["source.lua".into()] }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SyntaxesConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            manifest: default_manifest(),
            injection_scopes: default_injection_scopes(),
        }
    }
}
