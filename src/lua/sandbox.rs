use anyhow::Result;
use mlua::{Function, Lua, MultiValue, Table};
use std::path::{Component, Path, PathBuf};

/// 移除危险的 os/io 函数，并把 io.open 限制在根目录内
///
/// `root` 必须已 canonicalize。
pub fn apply(lua: &Lua, root: &Path) -> Result<()> {
    let globals = lua.globals();

    let os: Table = globals.get("os").map_err(|e| anyhow::anyhow!("{e}"))?;
    os.set("execute", mlua::Value::Nil)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    os.set("exit", mlua::Value::Nil)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let io: Table = globals.get("io").map_err(|e| anyhow::anyhow!("{e}"))?;
    io.set("popen", mlua::Value::Nil)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let original_open: Function = io.get("open").map_err(|e| anyhow::anyhow!("{e}"))?;
    let root = root.to_path_buf();
    let safe_open = lua
        .create_function(move |_, (path, mode): (String, Option<String>)| {
            let full = resolve_path(&root, &path)?;
            let mode = mode.unwrap_or_else(|| "r".to_string());
            original_open.call::<MultiValue>((full.to_string_lossy().to_string(), mode))
        })
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    io.set("open", safe_open)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}

/// 解析相对路径并验证不越界根目录
pub fn resolve_path(root: &Path, relative: &str) -> Result<PathBuf, mlua::Error> {
    let path = Path::new(relative);

    if path.is_absolute() {
        return Err(mlua::Error::external(format!(
            "不允许绝对路径: {}",
            relative
        )));
    }

    let full = root.join(path);

    let canonical = if full.exists() {
        full.canonicalize().map_err(|e| {
            mlua::Error::external(format!("路径解析失败: {} - {}", relative, e))
        })?
    } else {
        let mut resolved = root.to_path_buf();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(c) => resolved.push(c),
                Component::CurDir => {}
                _ => {
                    return Err(mlua::Error::external(format!(
                        "路径包含非法组件: {}",
                        relative
                    )));
                }
            }
        }
        resolved
    };

    if !canonical.starts_with(root) {
        return Err(mlua::Error::external(format!(
            "路径越界: {} 不在根目录内",
            relative
        )));
    }

    Ok(canonical)
}
