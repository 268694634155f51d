pub mod indent;

pub use indent::Indent;

use crate::parser::{BoxError, Parser};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\([`$])").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{kind} 模板解析失败：{message}")]
    Parse { kind: String, message: String },

    #[error("{0} 模板未配置解析器")]
    NoParser(String),

    #[error("解析结果类型转换失败：{0}")]
    Convert(String),
}

/// 片段中 `\`` 与 `\$` 还原为字面字符
pub fn unescape(fragment: &str) -> Cow<'_, str> {
    ESCAPE_RE.replace_all(fragment, "$1")
}

/// 交替拼接片段与插值：f0 + v0 + f1 + v1 + ... + fN
///
/// 多出的插值（超过 `fragments.len() - 1`）会被丢弃。
pub fn render<S: AsRef<str>>(fragments: &[S], values: &[&dyn fmt::Display]) -> String {
    let mut out = String::new();
    for (i, fragment) in fragments.iter().enumerate() {
        out.push_str(&unescape(fragment.as_ref()));
        if i + 1 < fragments.len()
            && let Some(value) = values.get(i)
        {
            out.push_str(&value.to_string());
        }
    }
    out
}

/// 一次标签调用的结果：渲染文本 + 语言标记 + 解析状态
#[derive(Clone)]
pub struct Template {
    kind: String,
    raw: String,
    text: String,
    data: Option<Value>,
    error: Option<TemplateError>,
    parser: Option<Parser>,
}

impl Template {
    pub fn new(kind: impl Into<String>, raw: String, parser: Option<Parser>) -> Self {
        Self {
            kind: kind.into(),
            text: raw.clone(),
            raw,
            data: None,
            error: None,
            parser,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// 插值完成、未经缩进调整的文本
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// 以具体类型读取解析结果
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, TemplateError> {
        self.data
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| TemplateError::Convert(e.to_string()))
    }

    pub fn error(&self) -> Option<&TemplateError> {
        self.error.as_ref()
    }

    pub fn parser(&self) -> Option<&Parser> {
        self.parser.as_ref()
    }

    /// 基于当前文本生成新的结果，原结果不变
    pub fn indent(&self, indent: impl Into<Indent>) -> Template {
        Template {
            kind: self.kind.clone(),
            raw: self.raw.clone(),
            text: indent::reshape(&self.text, indent.into()),
            data: None,
            error: None,
            parser: self.parser.clone(),
        }
    }

    pub fn noindent(&self) -> Template {
        self.indent(Indent::Flush)
    }

    /// 用已绑定的解析器解析文本；失败只记录错误，不会中断调用方
    pub fn parse(&mut self) -> &mut Self {
        let Some(parser) = self.parser.clone() else {
            self.error = Some(TemplateError::NoParser(self.kind.clone()));
            return self;
        };
        let outcome = parser(&self.text);
        self.record_parse(outcome)
    }

    /// 记录一次外部解析的结果（如 Lua 侧解析器）
    pub fn record_parse(&mut self, outcome: Result<Value, BoxError>) -> &mut Self {
        match outcome {
            Ok(value) => {
                self.data = Some(value);
                self.error = None;
            }
            Err(e) => {
                tracing::debug!("{} 模板解析失败：{e}", self.kind);
                self.error = Some(TemplateError::Parse {
                    kind: self.kind.clone(),
                    message: e.to_string(),
                });
            }
        }
        self
    }

    /// 替换绑定的解析器后解析
    pub fn parse_with(&mut self, parser: Parser) -> &mut Self {
        self.parser = Some(parser);
        self.parse()
    }

    pub fn parsed(mut self) -> Self {
        self.parse();
        self
    }

    /// 若记录了解析错误则返回它，否则原样返回
    pub fn throw(&self) -> Result<&Self, TemplateError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self),
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("data", &self.data)
            .field("error", &self.error)
            .field("has_parser", &self.parser.is_some())
            .finish()
    }
}
