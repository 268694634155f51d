use anyhow::{Context, Result};
use mlua::{
    Function, Lua, LuaOptions, LuaSerdeExt, SerializeOptions, StdLib, Table, Thread, ThreadStatus,
    Value,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::generate::ModuleLoader;
use crate::lua::sandbox;
use crate::lua::template::{tag_function, text_of};
use crate::registry::Registry;
use crate::tag::{self, Tag};

/// 模板模块加载器：每个模块一个独立的 Lua VM
pub struct LuaLoader {
    registry: Arc<Registry>,
    root: PathBuf,
}

impl LuaLoader {
    /// `root` 限定 io.open 与 tmpl.files 的访问范围
    pub fn new(registry: Arc<Registry>, root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("根目录不存在: {}", root.display()))?;
        Ok(Self { registry, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 创建加载 `module` 用的 VM
    pub fn create_vm(&self, module: &Path) -> Result<Lua> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(|e| anyhow::anyhow!("Lua VM 初始化失败: {e}"))?;

        sandbox::apply(&lua, &self.root)?;

        // 同目录下的辅助模块可直接 require
        let dir = module
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        prepend_package_path(&lua, dir).map_err(|e| anyhow::anyhow!("设置 package.path 失败: {e}"))?;

        let name = module
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "module".to_string());
        self.register_api(&lua, &name)
            .map_err(|e| anyhow::anyhow!("注册 tmpl API 失败: {e}"))?;

        Ok(lua)
    }

    fn register_api(&self, lua: &Lua, module: &str) -> mlua::Result<()> {
        let globals = lua.globals();
        let api = lua.create_table()?;

        // 每个 key 一个标签函数；全局变量已存在时只挂在 tmpl 上
        for key in self.registry.keys() {
            let Some(tag) = self.registry.tag(key) else {
                continue;
            };
            let f = tag_function(lua, tag.clone(), None)?;
            if globals.raw_get::<Value>(key)?.is_nil() {
                globals.set(key, f.clone())?;
            }
            api.set(key, f)?;
        }

        // tmpl.ext(key [, parser])
        let registry = self.registry.clone();
        let ext = lua.create_function(move |lua, (key, parser): (String, Option<Function>)| {
            // 结果总是标记为传入的 key；已注册的 key 沿用其解析器
            let tag = match registry.tag(&key).and_then(Tag::parser) {
                Some(inherited) => tag::ext_with(key, inherited.clone()),
                None => tag::ext(key),
            };
            tag_function(lua, tag, parser)
        })?;
        globals.set("ext", ext.clone())?;
        api.set("ext", ext)?;

        // tmpl.languages()
        let registry = self.registry.clone();
        api.set(
            "languages",
            lua.create_function(move |lua, ()| {
                let options = SerializeOptions::new().serialize_none_to_null(false);
                lua.to_value_with(registry.languages(), options)
            })?,
        )?;

        // tmpl.encode(value) -> string；`tmpl.json` 留给 json 标签
        api.set(
            "encode",
            lua.create_function(|lua, val: Value| {
                let json_val: serde_json::Value = lua.from_value(val)?;
                serde_json::to_string(&json_val)
                    .map_err(|e| mlua::Error::external(format!("JSON 序列化失败: {e}")))
            })?,
        )?;

        // tmpl.async(fn) 返回协程，tmpl.await 即 coroutine.yield
        api.set(
            "async",
            lua.create_function(|lua, f: Function| lua.create_thread(f))?,
        )?;
        let coroutine: Table = globals.get("coroutine")?;
        api.set("await", coroutine.get::<Function>("yield")?)?;

        let version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("TMPL_GIT_COMMIT")).to_string();
        api.set(
            "version",
            lua.create_function(move |_, ()| Ok(version.clone()))?,
        )?;

        api.set("log", log_table(lua, module)?)?;
        api.set("files", files_table(lua, &self.root)?)?;

        globals.set("tmpl", api)?;
        Ok(())
    }
}

impl ModuleLoader for LuaLoader {
    fn evaluate(&self, path: &Path) -> Result<String> {
        let code = std::fs::read_to_string(path)
            .with_context(|| format!("读取模块 {} 失败", path.display()))?;
        let lua = self.create_vm(path)?;

        let export: Value = lua
            .load(&code)
            .set_name(format!("@{}", path.display()))
            .call(())
            .map_err(|e| anyhow::anyhow!("执行模块 {} 失败: {e}", path.display()))?;

        resolve_export(&lua, export)
            .map_err(|e| anyhow::anyhow!("模块 {} 默认导出求值失败: {e}", path.display()))
    }
}

fn prepend_package_path(lua: &Lua, dir: &Path) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let current: String = package.get("path")?;
    package.set("path", format!("{}/?.lua;{}", dir.display(), current))
}

fn log_table(lua: &Lua, module: &str) -> mlua::Result<Table> {
    let log = lua.create_table()?;
    for level in ["debug", "info", "warn", "error"] {
        let module = module.to_string();
        log.set(
            level,
            lua.create_function(move |_, msg: String| {
                match level {
                    "debug" => tracing::debug!("[{}] {}", module, msg),
                    "warn" => tracing::warn!("[{}] {}", module, msg),
                    "error" => tracing::error!("[{}] {}", module, msg),
                    _ => tracing::info!("[{}] {}", module, msg),
                }
                Ok(())
            })?,
        )?;
    }
    Ok(log)
}

fn files_table(lua: &Lua, root: &Path) -> mlua::Result<Table> {
    let files = lua.create_table()?;

    let root_c = root.to_path_buf();
    files.set(
        "read",
        lua.create_function(move |_, path: String| {
            let full = sandbox::resolve_path(&root_c, &path)?;
            std::fs::read_to_string(&full)
                .map_err(|e| mlua::Error::external(format!("读取文件失败: {e}")))
        })?,
    )?;

    let root_c = root.to_path_buf();
    files.set(
        "exists",
        lua.create_function(move |_, path: String| {
            let full = sandbox::resolve_path(&root_c, &path)?;
            Ok(full.exists())
        })?,
    )?;

    let root_c = root.to_path_buf();
    files.set(
        "list",
        lua.create_function(move |_, path: String| {
            let full = sandbox::resolve_path(&root_c, &path)?;
            let entries = std::fs::read_dir(&full)
                .map_err(|e| mlua::Error::external(format!("读取目录失败: {e}")))?;
            let mut names = Vec::new();
            for entry in entries {
                let entry = entry
                    .map_err(|e| mlua::Error::external(format!("遍历目录条目失败: {e}")))?;
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
            names.sort();
            Ok(names)
        })?,
    )?;

    Ok(files)
}

/// 默认导出求值为文本
///
/// 函数以无参调用；协程（导出本身或函数返回值）一直恢复到结束。
pub fn resolve_export(lua: &Lua, export: Value) -> mlua::Result<String> {
    let value = match export {
        Value::Function(f) => f.call::<Value>(())?,
        other => other,
    };
    let value = match value {
        Value::Thread(thread) => drive(thread)?,
        other => other,
    };
    match value {
        Value::Nil => Err(mlua::Error::runtime("默认导出为 nil")),
        Value::Function(_) => Err(mlua::Error::runtime("默认导出求值后仍是函数")),
        other => text_of(lua, other),
    }
}

/// 恢复协程直到结束；让出的值原样作为 await 的结果传回
fn drive(thread: Thread) -> mlua::Result<Value> {
    let mut input = Value::Nil;
    loop {
        let output: Value = thread.resume(input)?;
        if thread.status() != ThreadStatus::Resumable {
            return Ok(output);
        }
        input = match output {
            Value::Thread(inner) => drive(inner)?,
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, LuaLoader) {
        let dir = tempfile::tempdir().unwrap();
        let loader = LuaLoader::new(Arc::new(Registry::builtin()), dir.path()).unwrap();
        (dir, loader)
    }

    fn eval(loader: &LuaLoader, name: &str, code: &str) -> Result<String> {
        let path = loader.root().join(name);
        std::fs::write(&path, code).unwrap();
        loader.evaluate(&path)
    }

    #[test]
    fn test_string_export() {
        let (_dir, loader) = setup();
        assert_eq!(eval(&loader, "a.sh.lua", r#"return "echo hi""#).unwrap(), "echo hi");
    }

    #[test]
    fn test_template_export_uses_rendered_text() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "a.html.lua",
            r#"local title = "T" return html { "<h1>", title, "</h1>" }"#,
        )
        .unwrap();
        assert_eq!(out, "<h1>T</h1>");
    }

    #[test]
    fn test_function_export_is_called() {
        let (_dir, loader) = setup();
        let out = eval(&loader, "f.css.lua", "return function() return css [[a {}]] end").unwrap();
        assert_eq!(out, "a {}");
    }

    #[test]
    fn test_async_export_is_awaited() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "async.txt.lua",
            r#"
            local fetch = function(v) return tmpl.async(function() return tmpl.await(v) end) end
            return tmpl.async(function()
                local n = tmpl.await(fetch(40))
                return n + tmpl.await(2)
            end)
            "#,
        )
        .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_function_returning_thread() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "f.txt.lua",
            r#"return function() return tmpl.async(function() return "42" end) end"#,
        )
        .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_nil_export_is_error() {
        let (_dir, loader) = setup();
        assert!(eval(&loader, "nil.txt.lua", "local x = 1").is_err());
    }

    #[test]
    fn test_throwing_export_is_error() {
        let (_dir, loader) = setup();
        let err = eval(&loader, "bad.txt.lua", r#"return function() error("boom") end"#)
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_tmpl_table_and_ext() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "e.txt.lua",
            r#"
            local vue = tmpl.ext("vue")
            local r = vue [[<template/>]]
            local y = tmpl.yml "a: 1"
            return r.type .. "|" .. y.type .. "|" .. tostring(y:parse().data.a)
            "#,
        )
        .unwrap();
        assert_eq!(out, "vue|yaml|1");
    }

    #[test]
    fn test_json_tag_is_not_shadowed() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "j.txt.lua",
            r#"
            local r = tmpl.json [==[[1, 2]]==]
            return r.type .. ":" .. tostring(r:parse():throw().data[2]) .. ":" .. tmpl.encode({ 1 })
            "#,
        )
        .unwrap();
        assert_eq!(out, "json:2:[1]");
    }

    #[test]
    fn test_ext_stamps_given_key() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "k.txt.lua",
            r#"
            local r = ext("yml")("a: 1")
            return r.type .. ":" .. tostring(r:parse().data.a) .. ":" .. tmpl.yml("b: 2").type
            "#,
        )
        .unwrap();
        assert_eq!(out, "yml:1:yaml");
    }

    #[test]
    fn test_ext_with_lua_parser() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "p.txt.lua",
            r#"
            local csv = ext("csv", function(text)
                local cells = {}
                for cell in text:gmatch("[^,]+") do cells[#cells + 1] = cell end
                return cells
            end)
            return csv("a,b,c"):parse():throw().data[2]
            "#,
        )
        .unwrap();
        assert_eq!(out, "b");
    }

    #[test]
    fn test_languages_and_json() {
        let (_dir, loader) = setup();
        let out = eval(
            &loader,
            "l.txt.lua",
            r#"
            local found
            for _, def in ipairs(tmpl.languages()) do
                if def.extension == "py" then found = def end
            end
            return tmpl.encode({ ext = found.extension, alias = found.aliases[1] })
            "#,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["ext"], "py");
        assert_eq!(value["alias"], "python");
    }

    #[test]
    fn test_require_sibling_module() {
        let (dir, loader) = setup();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/helpers.lua"), "return { name = 'helper' }").unwrap();
        let out = eval(
            &loader,
            "sub/page.html.lua",
            r#"local h = require("helpers") return html { "<p>", h.name, "</p>" }"#,
        )
        .unwrap();
        assert_eq!(out, "<p>helper</p>");
    }

    #[test]
    fn test_files_api_is_sandboxed() {
        let (dir, loader) = setup();
        std::fs::write(dir.path().join("data.txt"), "hello").unwrap();
        let out = eval(
            &loader,
            "r.txt.lua",
            r#"
            local names = tmpl.files.list(".")
            return tmpl.files.read("data.txt") .. ":" .. tostring(tmpl.files.exists("nope")) .. ":" .. names[1]
            "#,
        )
        .unwrap();
        assert_eq!(out, "hello:false:data.txt");

        assert!(eval(&loader, "x.txt.lua", r#"return tmpl.files.read("../secret")"#).is_err());
        assert!(eval(&loader, "y.txt.lua", r#"return os.execute("true")"#).is_err());
    }

    #[test]
    fn test_existing_global_is_not_shadowed() {
        let (_dir, loader) = setup();
        // `lua` 不是 Lua 的内置全局，标签函数可用；`string` 等内置库不受影响
        let out = eval(&loader, "g.txt.lua", r#"return string.upper(lua "x".text)"#).unwrap();
        assert_eq!(out, "X");
    }
}
