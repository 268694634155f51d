//! 多语言标签模板
//!
//! 每个语言 key 对应一个标签函数，调用结果是带语言标记的 [`Template`]，
//! 可调整缩进、按语言解析为结构化数据。`generate` 把 Lua 模板模块批量渲染为文件，
//! `syntaxes` 为编辑器导出嵌入语法。

pub mod config;
pub mod generate;
pub mod language;
pub mod lua;
pub mod parser;
pub mod registry;
pub mod syntaxes;
pub mod tag;
pub mod template;

pub use language::LanguageDefinition;
pub use registry::Registry;
pub use tag::builtin::*;
pub use tag::{Tag, ext, ext_with};
pub use template::{Indent, Template, TemplateError};
