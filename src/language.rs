use serde::{Deserialize, Serialize};

/// 语言定义：主扩展名 + 别名 + MIME 类型 + 描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDefinition {
    pub extension: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LanguageDefinition {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            aliases: Vec::new(),
            mime_type: None,
            description: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 主扩展名与所有别名
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.extension.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// (扩展名, 别名, MIME, 描述)
const BUILTIN: &[(&str, &[&str], &str, &str)] = &[
    // Web
    ("html", &["htm"], "text/html", "HTML markup language"),
    ("css", &[], "text/css", "Cascading Style Sheets"),
    ("js", &["javascript"], "application/javascript", "JavaScript programming language"),
    ("ts", &["typescript"], "application/typescript", "TypeScript programming language"),
    ("jsx", &[], "text/jsx", "JavaScript XML"),
    ("tsx", &[], "text/tsx", "TypeScript XML"),
    // 数据格式
    ("json", &[], "application/json", "JavaScript Object Notation"),
    ("xml", &[], "application/xml", "Extensible Markup Language"),
    ("yaml", &["yml"], "application/yaml", "YAML Ain't Markup Language"),
    ("toml", &[], "application/toml", "Tom's Obvious, Minimal Language"),
    ("ini", &[], "text/plain", "Configuration file format"),
    ("csv", &[], "text/csv", "Comma-Separated Values"),
    // 标记语言
    ("md", &["markdown"], "text/markdown", "Markdown markup language"),
    ("tex", &["latex"], "application/x-tex", "LaTeX document preparation system"),
    ("rst", &[], "text/x-rst", "reStructuredText markup language"),
    // 查询语言
    ("sql", &[], "application/sql", "Structured Query Language"),
    ("graphql", &["gql"], "application/graphql", "GraphQL query language"),
    // Shell
    ("sh", &["bash", "shell"], "application/x-sh", "Shell script"),
    ("ps1", &[], "application/x-powershell", "PowerShell script"),
    ("bat", &["cmd"], "application/x-bat", "Windows Batch file"),
    // 编程语言
    ("py", &["python"], "text/x-python", "Python programming language"),
    ("rb", &["ruby"], "text/x-ruby", "Ruby programming language"),
    ("go", &["golang"], "text/x-go", "Go programming language"),
    ("rs", &["rust"], "text/x-rust", "Rust programming language"),
    ("c", &[], "text/x-c", "C programming language"),
    ("cpp", &["cc", "cxx"], "text/x-c++", "C++ programming language"),
    ("cs", &["csharp"], "text/x-csharp", "C# programming language"),
    ("java", &[], "text/x-java", "Java programming language"),
    ("php", &[], "application/x-php", "PHP programming language"),
    ("swift", &[], "text/x-swift", "Swift programming language"),
    ("kt", &["kotlin"], "text/x-kotlin", "Kotlin programming language"),
    ("scala", &[], "text/x-scala", "Scala programming language"),
    ("dart", &[], "text/x-dart", "Dart programming language"),
    ("lua", &[], "text/x-lua", "Lua programming language"),
    ("pl", &["perl"], "text/x-perl", "Perl programming language"),
    ("r", &[], "text/x-r", "R programming language"),
    ("elm", &[], "text/x-elm", "Elm programming language"),
    ("fs", &["fsharp"], "text/x-fsharp", "F# programming language"),
    ("clj", &["clojure"], "text/x-clojure", "Clojure programming language"),
    ("hs", &["haskell"], "text/x-haskell", "Haskell programming language"),
    // 配置文件
    ("dockerfile", &[], "text/x-dockerfile", "Docker configuration file"),
    ("makefile", &[], "text/x-makefile", "Make build automation"),
    ("mk", &[], "text/x-makefile", "Make build automation"),
    // 其他
    ("svg", &[], "image/svg+xml", "Scalable Vector Graphics"),
    ("diff", &["patch"], "text/x-diff", "Diff file format"),
    ("proto", &[], "text/x-protobuf", "Protocol Buffers"),
    ("sol", &["solidity"], "text/x-solidity", "Solidity smart contract language"),
];

/// 内置语言表（按声明顺序）
pub fn builtin() -> Vec<LanguageDefinition> {
    BUILTIN
        .iter()
        .map(|(extension, aliases, mime, description)| {
            LanguageDefinition::new(*extension)
                .with_aliases(aliases.iter().copied())
                .with_mime_type(*mime)
                .with_description(*description)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_keys_are_unique() {
        let mut seen = HashSet::new();
        for def in builtin() {
            for key in def.keys() {
                assert!(seen.insert(key.to_string()), "重复的语言 key: {key}");
            }
        }
    }

    #[test]
    fn test_builtin_contains_common_languages() {
        let table = builtin();
        let html = table.iter().find(|d| d.extension == "html").unwrap();
        assert_eq!(html.aliases, vec!["htm"]);
        assert_eq!(html.mime_type.as_deref(), Some("text/html"));

        let yaml = table.iter().find(|d| d.extension == "yaml").unwrap();
        assert!(yaml.aliases.contains(&"yml".to_string()));
        assert!(table.iter().any(|d| d.extension == "sol"));
        assert!(table.iter().any(|d| d.extension == "mk"));
    }

    #[test]
    fn test_definition_deserializes_from_toml() {
        let def: LanguageDefinition = toml::from_str(
            r#"
            extension = "vue"
            aliases = ["sfc"]
            mime_type = "text/x-vue"
            "#,
        )
        .unwrap();
        assert_eq!(def.extension, "vue");
        assert_eq!(def.keys().collect::<Vec<_>>(), vec!["vue", "sfc"]);
        assert_eq!(def.description, None);
    }
}
