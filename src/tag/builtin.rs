//! 每个内置语言一个标签函数，首次访问时构造

use super::Tag;
use std::sync::LazyLock;

macro_rules! builtin_tags {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name() -> &'static Tag {
                static TAG: LazyLock<Tag> = LazyLock::new(|| Tag::builtin(stringify!($name)));
                &TAG
            }
        )*
    };
}

builtin_tags! {
    // Web
    html, css, js, ts, jsx, tsx,
    // 数据格式
    json, xml, yaml, toml, ini, csv,
    // 标记语言
    md, tex, rst,
    // 查询语言
    sql, graphql,
    // Shell
    sh, ps1, bat,
    // 编程语言
    py, rb, go, rs, c, cpp, cs, java, php, swift, kt,
    scala, dart, lua, pl, r, elm, fs, clj, hs,
    // 配置文件
    dockerfile, makefile, mk,
    // 其他
    svg, diff, proto, sol,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language;

    #[test]
    fn test_builtin_tags_cover_language_table() {
        let tags = [
            html(), css(), js(), ts(), jsx(), tsx(), json(), xml(), yaml(), toml(), ini(),
            csv(), md(), tex(), rst(), sql(), graphql(), sh(), ps1(), bat(), py(), rb(), go(),
            rs(), c(), cpp(), cs(), java(), php(), swift(), kt(), scala(), dart(), lua(), pl(),
            r(), elm(), fs(), clj(), hs(), dockerfile(), makefile(), mk(), svg(), diff(),
            proto(), sol(),
        ];
        let table = language::builtin();
        assert_eq!(tags.len(), table.len());
        for (tag, def) in tags.iter().zip(&table) {
            assert_eq!(tag.key(), def.extension);
        }
    }

    #[test]
    fn test_interpolation_matches_concatenation() {
        let title = "Test Title";
        let width = 100;
        for tag in [html(), css(), sql(), py(), dockerfile()] {
            let t = crate::tmpl!(tag, "a ", title, " b ", width, " c");
            assert_eq!(t.as_str(), "a Test Title b 100 c");
            assert_eq!(t.kind(), tag.key());
        }
    }

    #[test]
    fn test_structured_tags_round_trip() {
        let name = "Test";
        let version = "1.0.0";

        let j = crate::tmpl!(
            json(),
            "\n    {\n      \"name\": \"", name, "\",\n      \"version\": \"", version, "\"\n    }\n  "
        )
        .parsed();
        assert_eq!(j.data().unwrap()["name"], name);
        assert_eq!(j.data().unwrap()["version"], version);

        let y = crate::tmpl!(yaml(), "\n    name: ", name, "\n    version: ", version, "\n  ")
            .parsed();
        assert!(y.error().is_none(), "{:?}", y.error());
        assert_eq!(y.data().unwrap()["name"], name);
        assert_eq!(y.data().unwrap()["version"], version);

        let port = 8080;
        let t = crate::tmpl!(toml(), "[server]\nport = ", port, "\n").parsed();
        assert_eq!(t.data().unwrap()["server"]["port"], port);
    }

    #[test]
    fn test_same_static_tag() {
        assert!(std::ptr::eq(html(), html()));
    }
}
