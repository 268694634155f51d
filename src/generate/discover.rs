use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::registry::Registry;

/// 模板模块文件的后缀：`<name>.<key>.lua`
pub const MODULE_SUFFIX: &str = "lua";

/// 递归查找 `source` 下的模板模块，按路径排序
pub fn discover(source: &Path, registry: &Registry) -> Result<Vec<PathBuf>> {
    let mut modules = Vec::new();
    walk(source, registry, &mut modules)?;
    modules.sort();
    Ok(modules)
}

fn walk(dir: &Path, registry: &Registry, modules: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("读取目录 {} 失败", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("遍历目录 {} 失败", dir.display()))?
            .path();
        if path.is_dir() {
            walk(&path, registry, modules)?;
        } else if is_module(&path, registry) {
            modules.push(path);
        }
    }
    Ok(())
}

/// 文件名形如 `<任意>.<已注册 key>.lua`
pub fn is_module(path: &Path, registry: &Registry) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some(MODULE_SUFFIX) {
        return false;
    }
    path.file_stem()
        .map(Path::new)
        .and_then(|stem| stem.extension())
        .and_then(|key| key.to_str())
        .is_some_and(|key| registry.contains(key))
}

/// 输出路径：`destination` 下的相同相对路径，去掉末尾的 `.lua`
pub fn output_path(source: &Path, destination: &Path, module: &Path) -> Result<PathBuf> {
    let relative = module.strip_prefix(source).with_context(|| {
        format!("{} 不在源目录 {} 内", module.display(), source.display())
    })?;
    Ok(destination.join(relative.with_extension("")))
}
