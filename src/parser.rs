use serde_json::Value;
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 模板解析器：渲染文本 -> 结构化数据
pub type Parser = Arc<dyn Fn(&str) -> Result<Value, BoxError> + Send + Sync>;

/// 用任意闭包构造解析器
pub fn from_fn<F>(f: F) -> Parser
where
    F: Fn(&str) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn json() -> Parser {
    from_fn(|text| Ok(serde_json::from_str(text)?))
}

pub fn yaml() -> Parser {
    from_fn(|text| Ok(serde_yaml::from_str(text)?))
}

pub fn toml() -> Parser {
    from_fn(|text| Ok(toml::from_str(text)?))
}

/// 按名称查找解析器（配置文件中使用）
pub fn by_name(name: &str) -> Option<Parser> {
    match name {
        "json" => Some(json()),
        "yaml" | "yml" => Some(yaml()),
        "toml" => Some(toml()),
        _ => None,
    }
}

/// 内置语言绑定的解析器
pub fn builtin(extension: &str) -> Option<Parser> {
    match extension {
        "json" | "yaml" | "toml" => by_name(extension),
        _ => None,
    }
}
