pub mod builtin;

use crate::parser::{self, Parser};
use crate::template::{self, Template};
use std::fmt;

/// 标签函数：绑定一个语言 key 和可选解析器
#[derive(Clone)]
pub struct Tag {
    key: String,
    parser: Option<Parser>,
}

impl Tag {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            parser: None,
        }
    }

    pub fn with_parser(key: impl Into<String>, parser: Parser) -> Self {
        Self {
            key: key.into(),
            parser: Some(parser),
        }
    }

    /// 内置语言的标签，json/yaml/toml 自带解析器
    pub fn builtin(extension: &str) -> Self {
        Self {
            key: extension.to_string(),
            parser: parser::builtin(extension),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parser(&self) -> Option<&Parser> {
        self.parser.as_ref()
    }

    pub fn call<S: AsRef<str>>(&self, fragments: &[S], values: &[&dyn fmt::Display]) -> Template {
        Template::new(
            self.key.clone(),
            template::render(fragments, values),
            self.parser.clone(),
        )
    }

    /// 无插值调用
    pub fn text(&self, literal: &str) -> Template {
        self.call(&[literal], &[])
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("key", &self.key)
            .field("has_parser", &self.parser.is_some())
            .finish()
    }
}

/// 任意扩展名的标签；每次调用都返回独立的新标签
pub fn ext(key: impl Into<String>) -> Tag {
    Tag::new(key)
}

pub fn ext_with(key: impl Into<String>, parser: Parser) -> Tag {
    Tag::with_parser(key, parser)
}

/// 标签模板调用：`tmpl!(tag, "片段", 值, "片段", ...)`
///
/// ```
/// let title = "Hi";
/// let page = tmpl::tmpl!(tmpl::html(), "<h1>", title, "</h1>");
/// assert_eq!(page.as_str(), "<h1>Hi</h1>");
/// ```
#[macro_export]
macro_rules! tmpl {
    ($tag:expr, $first:expr $(, $value:expr, $fragment:expr)* $(,)?) => {
        $tag.call(
            &[$first $(, $fragment)*],
            &[$(&$value as &dyn ::std::fmt::Display),*],
        )
    };
}
