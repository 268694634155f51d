use crate::language::{self, LanguageDefinition};
use crate::parser::Parser;
use crate::tag::Tag;
use std::collections::{HashMap, HashSet};
use std::sync::{LazyLock, RwLock};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("语言 key `{key}` 已被 `{owner}` 占用")]
    Conflict { key: String, owner: String },

    #[error("语言扩展名不能为空")]
    EmptyExtension,

    #[error("语言 `{extension}` 的 key `{key}` 重复")]
    DuplicateKey { extension: String, key: String },
}

/// 语言表 + 标签注册表，只允许追加
#[derive(Debug, Clone)]
pub struct Registry {
    languages: Vec<LanguageDefinition>,
    // key（主扩展名或别名）-> (languages 下标, 标签)
    keys: HashMap<String, (usize, Tag)>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            languages: Vec::new(),
            keys: HashMap::new(),
        }
    }

    /// 内置语言表对应的注册表
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for def in language::builtin() {
            let tag = Tag::builtin(&def.extension);
            // 内置表的 key 唯一性由 language 模块的测试保证
            if let Err(e) = registry.insert(def, tag) {
                tracing::warn!("内置语言注册失败：{e}");
            }
        }
        registry
    }

    /// 注册自定义语言，返回新建的标签
    pub fn register(&mut self, definition: LanguageDefinition) -> Result<Tag, RegistryError> {
        let tag = Tag::new(definition.extension.clone());
        self.insert(definition, tag)
    }

    pub fn register_with_parser(
        &mut self,
        definition: LanguageDefinition,
        parser: Parser,
    ) -> Result<Tag, RegistryError> {
        let tag = Tag::with_parser(definition.extension.clone(), parser);
        self.insert(definition, tag)
    }

    fn insert(&mut self, definition: LanguageDefinition, tag: Tag) -> Result<Tag, RegistryError> {
        if definition.extension.is_empty() {
            return Err(RegistryError::EmptyExtension);
        }
        let mut seen = HashSet::new();
        for key in definition.keys() {
            if !seen.insert(key) {
                return Err(RegistryError::DuplicateKey {
                    extension: definition.extension.clone(),
                    key: key.to_string(),
                });
            }
            if let Some((index, _)) = self.keys.get(key) {
                return Err(RegistryError::Conflict {
                    key: key.to_string(),
                    owner: self.languages[*index].extension.clone(),
                });
            }
        }

        let index = self.languages.len();
        for key in definition.keys() {
            self.keys.insert(key.to_string(), (index, tag.clone()));
        }
        tracing::debug!("已注册语言: {}", definition.extension);
        self.languages.push(definition);
        Ok(tag)
    }

    pub fn tag(&self, key: &str) -> Option<&Tag> {
        self.keys.get(key).map(|(_, tag)| tag)
    }

    /// 按主扩展名或别名查找语言定义
    pub fn language(&self, key: &str) -> Option<&LanguageDefinition> {
        self.languages
            .iter()
            .find(|def| def.extension == key)
            .or_else(|| {
                self.keys
                    .get(key)
                    .and_then(|(index, _)| self.languages.get(*index))
            })
    }

    pub fn languages(&self) -> &[LanguageDefinition] {
        &self.languages
    }

    /// 所有可用的 key（主扩展名 + 别名），按注册顺序
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.languages.iter().flat_map(LanguageDefinition::keys)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.keys().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

static GLOBAL: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::builtin()));

/// 进程级默认注册表
pub fn global() -> &'static RwLock<Registry> {
    &GLOBAL
}

/// 当前全局注册表的快照
pub fn snapshot() -> Registry {
    global()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}
