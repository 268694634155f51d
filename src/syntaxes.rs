use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

use crate::config::SyntaxesConfig;
use crate::language::LanguageDefinition;
use crate::registry::Registry;

const DEFAULT_SCOPE: &str = "source.plaintext";

// 标签调用前不能紧跟标识符字符或 `.`/`:`，`tmpl.` 前缀单独匹配
const CALL_GUARD: &str = r"(?<![\w.:])";

/// 扩展名 -> 编辑器中的语言 scope
const LANGUAGE_SCOPES: &[(&str, &str)] = &[
    // Web
    ("html", "text.html.basic"),
    ("css", "source.css"),
    ("js", "source.js"),
    ("ts", "source.ts"),
    ("jsx", "source.js.jsx"),
    ("tsx", "source.tsx"),
    // 数据格式
    ("json", "source.json"),
    ("xml", "text.xml"),
    ("yaml", "source.yaml"),
    ("toml", "source.toml"),
    ("ini", "source.ini"),
    ("csv", "text.csv"),
    // 标记语言
    ("md", "text.html.markdown"),
    ("tex", "text.tex.latex"),
    ("rst", "text.restructuredtext"),
    // 查询
    ("sql", "source.sql"),
    ("graphql", "source.graphql"),
    // Shell
    ("sh", "source.shell"),
    ("ps1", "source.powershell"),
    ("bat", "source.batchfile"),
    // 编程语言
    ("py", "source.python"),
    ("rb", "source.ruby"),
    ("go", "source.go"),
    ("rs", "source.rust"),
    ("c", "source.c"),
    ("cpp", "source.cpp"),
    ("cs", "source.cs"),
    ("java", "source.java"),
    ("php", "source.php"),
    ("swift", "source.swift"),
    ("kt", "source.kotlin"),
    ("scala", "source.scala"),
    ("dart", "source.dart"),
    ("lua", "source.lua"),
    ("pl", "source.perl"),
    ("r", "source.r"),
    ("elm", "source.elm"),
    ("fs", "source.fsharp"),
    ("clj", "source.clojure"),
    ("hs", "source.haskell"),
    // 构建配置
    ("dockerfile", "source.dockerfile"),
    ("makefile", "source.makefile"),
    ("mk", "source.makefile"),
    // 其他
    ("svg", "text.xml.svg"),
    ("diff", "source.diff"),
    ("proto", "source.proto"),
    ("sol", "source.solidity"),
];

pub fn language_scope(extension: &str) -> &'static str {
    LANGUAGE_SCOPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, scope)| *scope)
        .unwrap_or(DEFAULT_SCOPE)
}

/// 编辑器语言 id，用于 embeddedLanguages
fn language_id(extension: &str) -> &str {
    match extension {
        "ini" => "properties",
        other => other,
    }
}

pub fn scope_name(extension: &str) -> String {
    format!("inline.{extension}.template")
}

fn content_name(extension: &str) -> String {
    format!("meta.embedded.block.{extension}")
}

/// 匹配 `key [[`、`tmpl.key [==[`、`ext("ext") [[` 的起始正则
pub fn begin_pattern(def: &LanguageDefinition) -> String {
    let mut keys: Vec<&str> = def.keys().collect();
    // 长的 key 优先，避免 `htm` 抢先匹配 `html`
    keys.sort_by(|a, b| b.len().cmp(&a.len()));
    let keys = keys
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    let ext = regex::escape(&def.extension);
    format!(
        r#"{CALL_GUARD}(?:(tmpl\.)?({keys})|ext\(\s*["']{ext}["']\s*\))\s*\(?\s*(\[(=*)\[)"#
    )
}

// 与起始长括号同级的结束括号
const END_PATTERN: &str = r"\]\4\]";

fn embedded_patterns(extension: &str) -> Vec<Value> {
    let scope = language_scope(extension);
    match extension {
        "php" => vec![
            json!({
                "begin": r"<\?(?:php|=)?",
                "end": r"\?>",
                "beginCaptures": { "0": { "name": "punctuation.section.embedded.begin.php" } },
                "endCaptures": { "0": { "name": "punctuation.section.embedded.end.php" } },
                "contentName": "source.php",
                "patterns": [{ "include": "source.php" }]
            }),
            json!({ "include": "text.html.basic" }),
        ],
        "md" => vec![
            json!({
                "begin": r"^\s*(`{3,}|~{3,})\s*([\w+-]*)\s*$",
                "end": r"^\s*\1\s*$",
                "beginCaptures": {
                    "2": { "name": "fenced_code.block.language.markdown" }
                },
                "name": "markup.fenced_code.block.markdown"
            }),
            json!({ "include": scope }),
        ],
        _ => vec![json!({ "include": scope })],
    }
}

/// 单个语言的 TextMate 注入语法
pub fn build_grammar(def: &LanguageDefinition, injection_scopes: &[String]) -> Value {
    let ext = def.extension.as_str();
    let rule = format!("{ext}-template");
    let selector = injection_scopes
        .iter()
        .map(|s| format!("L:{s}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut repository = Map::new();
    repository.insert(
        rule.clone(),
        json!({
            "begin": begin_pattern(def),
            "beginCaptures": {
                "1": { "name": "support.function.lua" },
                "2": { "name": "entity.name.function.lua" },
                "3": { "name": "punctuation.definition.string.begin.lua" }
            },
            "end": END_PATTERN,
            "endCaptures": {
                "0": { "name": "punctuation.definition.string.end.lua" }
            },
            "contentName": content_name(ext),
            "patterns": embedded_patterns(ext)
        }),
    );

    json!({
        "fileTypes": [],
        "injectionSelector": selector,
        "patterns": [{ "include": format!("#{rule}") }],
        "repository": repository,
        "scopeName": scope_name(ext)
    })
}

/// manifest 中 contributes.grammars 的条目
pub fn manifest_entries(registry: &Registry, config: &SyntaxesConfig) -> Vec<Value> {
    registry
        .languages()
        .iter()
        .map(|def| {
            let ext = def.extension.as_str();
            let mut embedded = Map::new();
            embedded.insert(content_name(ext), json!(language_id(ext)));
            json!({
                "injectTo": config.injection_scopes,
                "scopeName": scope_name(ext),
                "path": format!("./{}/{ext}.json", config.out_dir.trim_end_matches('/')),
                "embeddedLanguages": embedded
            })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    /// manifest 更新失败时的原因；已写出的语法文件不会回滚
    pub manifest_error: Option<String>,
}

/// 为注册表中每个语言写出语法文件，并更新 manifest
pub fn export(registry: &Registry, config: &SyntaxesConfig, root: &Path) -> Result<ExportReport> {
    let out_dir = root.join(&config.out_dir);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("创建目录 {} 失败", out_dir.display()))?;

    let mut report = ExportReport::default();
    for def in registry.languages() {
        let grammar = build_grammar(def, &config.injection_scopes);
        let path = out_dir.join(format!("{}.json", def.extension));
        let content = serde_json::to_string_pretty(&grammar)?;
        std::fs::write(&path, content)
            .with_context(|| format!("写入 {} 失败", path.display()))?;
        tracing::info!("已生成语法: {} ({})", def.extension, path.display());
        report.written.push(path);
    }

    let manifest = root.join(&config.manifest);
    match patch_manifest(&manifest, manifest_entries(registry, config)) {
        Ok(()) => tracing::info!("已更新 {} 的 grammars", manifest.display()),
        Err(e) => {
            tracing::error!("更新 {} 失败: {e:#}", manifest.display());
            report.manifest_error = Some(format!("{e:#}"));
        }
    }
    Ok(report)
}

fn patch_manifest(path: &Path, grammars: Vec<Value>) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取 {} 失败", path.display()))?;
    let mut manifest: Value = serde_json::from_str(&content)
        .with_context(|| format!("解析 {} 失败", path.display()))?;

    let root = manifest
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("{} 不是 JSON 对象", path.display()))?;
    let contributes = root
        .entry("contributes")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("contributes 不是 JSON 对象"))?;
    contributes.insert("grammars".to_string(), Value::Array(grammars));

    std::fs::write(path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("写入 {} 失败", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    // regex crate 不支持后行断言，去掉前缀后验证其余部分
    fn begin_regex(def: &LanguageDefinition) -> Regex {
        let pattern = begin_pattern(def);
        Regex::new(pattern.strip_prefix(CALL_GUARD).unwrap()).unwrap()
    }

    #[test]
    fn test_begin_matches_call_forms() {
        let registry = Registry::builtin();
        let re = begin_regex(registry.language("html").unwrap());

        let caps = re.captures("return html [[").unwrap();
        assert_eq!(&caps[2], "html");
        assert_eq!(&caps[4], "");

        let caps = re.captures("tmpl.htm [==[").unwrap();
        assert_eq!(caps.get(1).map(|m| m.as_str()), Some("tmpl."));
        assert_eq!(&caps[2], "htm");
        assert_eq!(&caps[4], "==");

        assert!(re.is_match(r#"ext("html")[["#));
        assert!(re.is_match("html([["));
        assert!(!re.is_match(r#"html "x""#));
        assert!(!re.is_match(r#"ext("css") [["#));
    }

    #[test]
    fn test_grammar_shape() {
        let registry = Registry::builtin();
        let grammar = build_grammar(registry.language("py").unwrap(), &["source.lua".into()]);
        assert_eq!(grammar["scopeName"], "inline.py.template");
        assert_eq!(grammar["injectionSelector"], "L:source.lua");
        let rule = &grammar["repository"]["py-template"];
        assert_eq!(rule["end"], r"\]\4\]");
        assert_eq!(rule["contentName"], "meta.embedded.block.py");
        assert_eq!(rule["patterns"][0]["include"], "source.python");
    }

    #[test]
    fn test_special_cases() {
        let registry = Registry::builtin();
        let scopes = ["source.lua".to_string()];

        let php = build_grammar(registry.language("php").unwrap(), &scopes);
        let patterns = php["repository"]["php-template"]["patterns"].as_array().unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0]["contentName"], "source.php");

        let md = build_grammar(registry.language("md").unwrap(), &scopes);
        let patterns = md["repository"]["md-template"]["patterns"].as_array().unwrap();
        assert_eq!(patterns[0]["name"], "markup.fenced_code.block.markdown");
        assert_eq!(patterns[1]["include"], "text.html.markdown");
    }

    #[test]
    fn test_unknown_language_uses_plaintext() {
        let def = LanguageDefinition::new("vue");
        let grammar = build_grammar(&def, &[]);
        assert_eq!(
            grammar["repository"]["vue-template"]["patterns"][0]["include"],
            DEFAULT_SCOPE
        );
    }

    #[test]
    fn test_manifest_entries() {
        let registry = Registry::builtin();
        let entries = manifest_entries(&registry, &SyntaxesConfig::default());
        assert_eq!(entries.len(), registry.languages().len());
        let ini = entries
            .iter()
            .find(|e| e["scopeName"] == "inline.ini.template")
            .unwrap();
        assert_eq!(ini["path"], "./syntaxes/ini.json");
        assert_eq!(ini["embeddedLanguages"]["meta.embedded.block.ini"], "properties");
        assert_eq!(ini["injectTo"][0], "source.lua");
    }

    #[test]
    fn test_export_writes_grammars_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "ext", "contributes": {"grammars": [], "languages": []}}"#,
        )
        .unwrap();

        let registry = Registry::builtin();
        let report = export(&registry, &SyntaxesConfig::default(), dir.path()).unwrap();
        assert_eq!(report.written.len(), registry.languages().len());
        assert!(report.manifest_error.is_none());
        assert!(dir.path().join("syntaxes/html.json").exists());

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("package.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["name"], "ext");
        assert!(manifest["contributes"]["languages"].is_array());
        assert_eq!(
            manifest["contributes"]["grammars"].as_array().unwrap().len(),
            registry.languages().len()
        );
    }

    #[test]
    fn test_missing_manifest_keeps_grammars() {
        let dir = tempfile::tempdir().unwrap();
        let report = export(&Registry::builtin(), &SyntaxesConfig::default(), dir.path()).unwrap();
        assert!(report.manifest_error.is_some());
        assert!(dir.path().join("syntaxes/css.json").exists());
    }
}
