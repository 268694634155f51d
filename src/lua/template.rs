use crate::parser::BoxError;
use crate::tag::Tag;
use crate::template::indent::MAX_SHIFT;
use crate::template::{Indent, Template};
use mlua::{
    AnyUserData, FromLua, Function, Lua, LuaSerdeExt, MetaMethod, UserData, UserDataFields,
    UserDataMethods, Value,
};
use std::fmt;

/// 暴露给 Lua 的模板结果
pub struct LuaTemplate {
    inner: Template,
    // Lua 侧传入的解析器优先于 Rust 侧绑定的解析器
    lua_parser: Option<Function>,
}

impl LuaTemplate {
    pub fn new(inner: Template, lua_parser: Option<Function>) -> Self {
        Self { inner, lua_parser }
    }

    pub fn template(&self) -> &Template {
        &self.inner
    }

    fn derive(&self, indent: Indent) -> Self {
        Self {
            inner: self.inner.indent(indent),
            lua_parser: self.lua_parser.clone(),
        }
    }
}

impl UserData for LuaTemplate {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("type", |_, this| Ok(this.inner.kind().to_string()));
        fields.add_field_method_get("raw", |_, this| Ok(this.inner.raw().to_string()));
        fields.add_field_method_get("text", |_, this| Ok(this.inner.as_str().to_string()));
        fields.add_field_method_get("data", |lua, this| match this.inner.data() {
            Some(data) => lua.to_value(data),
            None => Ok(Value::Nil),
        });
        fields.add_field_method_get("error", |_, this| {
            Ok(this.inner.error().map(|e| e.to_string()))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("indent", |_, this, arg: Value| {
            Ok(this.derive(indent_arg(arg)?))
        });

        methods.add_method("noindent", |_, this, ()| Ok(this.derive(Indent::Flush)));

        // parse 原地修改并返回同一个 userdata
        methods.add_function(
            "parse",
            |lua, (ud, parser): (AnyUserData, Option<Function>)| {
                let (text, lua_parser) = {
                    let mut this = ud.borrow_mut::<LuaTemplate>()?;
                    if parser.is_some() {
                        this.lua_parser = parser;
                    }
                    (this.inner.as_str().to_string(), this.lua_parser.clone())
                };

                match lua_parser {
                    Some(f) => {
                        let outcome = f
                            .call::<Value>(text)
                            .and_then(|v| lua.from_value::<serde_json::Value>(v))
                            .map_err(|e| BoxError::from(e.to_string()));
                        ud.borrow_mut::<LuaTemplate>()?.inner.record_parse(outcome);
                    }
                    None => {
                        ud.borrow_mut::<LuaTemplate>()?.inner.parse();
                    }
                }
                Ok(ud)
            },
        );

        methods.add_function("throw", |_, ud: AnyUserData| {
            let error = ud.borrow::<LuaTemplate>()?.inner.error().cloned();
            match error {
                Some(e) => Err(mlua::Error::external(e)),
                None => Ok(ud),
            }
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(this.inner.as_str().to_string())
        });

        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.inner.as_str().len()));

        methods.add_meta_function(MetaMethod::Concat, |lua, (a, b): (Value, Value)| {
            Ok(format!("{}{}", text_of(lua, a)?, text_of(lua, b)?))
        });
    }
}

fn indent_arg(arg: Value) -> mlua::Result<Indent> {
    let n = match arg {
        Value::Boolean(false) => return Ok(Indent::Flush),
        Value::Integer(n) => n as f64,
        Value::Number(n) if n.fract() == 0.0 => n,
        other => {
            return Err(mlua::Error::runtime(format!(
                "indent 参数必须是整数或 false，收到 {}",
                other.type_name()
            )));
        }
    };
    if n.abs() > MAX_SHIFT as f64 {
        return Err(mlua::Error::runtime(format!(
            "indent 参数超出范围 ±{MAX_SHIFT}：{n}"
        )));
    }
    Ok(Indent::Shift(n as isize))
}

/// 插值的文本形式：字符串原样，模板取渲染文本，其余交给 tostring
pub fn text_of(lua: &Lua, value: Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::UserData(ud) if ud.is::<LuaTemplate>() => {
            Ok(ud.borrow::<LuaTemplate>()?.inner.as_str().to_string())
        }
        other => {
            let tostring: Function = lua.globals().get("tostring")?;
            tostring.call::<String>(other)
        }
    }
}

/// 把 Lua 调用参数拆成片段与插值
///
/// `html [[...]]` 只有一个片段；`html { "a", x, "b" }` 奇数位是片段、偶数位是插值。
fn split_call(lua: &Lua, arg: Value) -> mlua::Result<(Vec<String>, Vec<String>)> {
    match arg {
        Value::Table(table) => {
            let len = table.raw_len();
            let mut fragments = Vec::with_capacity(len / 2 + 1);
            let mut values = Vec::with_capacity(len / 2);
            for i in 1..=len {
                let item: Value = table.raw_get(i)?;
                if i % 2 == 1 {
                    fragments.push(String::from_lua(item, lua)?);
                } else {
                    values.push(text_of(lua, item)?);
                }
            }
            // 以插值结尾时补一个空片段
            if fragments.len() == values.len() {
                fragments.push(String::new());
            }
            Ok((fragments, values))
        }
        other => Ok((vec![text_of(lua, other)?], Vec::new())),
    }
}

/// 为标签创建 Lua 函数
pub fn tag_function(lua: &Lua, tag: Tag, lua_parser: Option<Function>) -> mlua::Result<Function> {
    lua.create_function(move |lua, arg: Value| {
        let (fragments, values) = split_call(lua, arg)?;
        let values: Vec<&dyn fmt::Display> = values.iter().map(|v| v as &dyn fmt::Display).collect();
        Ok(LuaTemplate::new(
            tag.call(&fragments, &values),
            lua_parser.clone(),
        ))
    })
}
