/// 缩进调整方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    /// 以第一个非空行的缩进为基准整体左移
    Flush,
    /// 正数：每个非空行前补空格；非正数：每行最多去掉 |n| 个前导空白
    Shift(isize),
}

impl From<isize> for Indent {
    fn from(n: isize) -> Self {
        Indent::Shift(n)
    }
}

impl From<i32> for Indent {
    fn from(n: i32) -> Self {
        Indent::Shift(n as isize)
    }
}

/// 单次缩进允许的最大空格数，超出部分截断
pub const MAX_SHIFT: usize = 1024;

/// 按行调整前导空白
pub fn reshape(text: &str, indent: Indent) -> String {
    match indent {
        Indent::Flush => {
            let base = text
                .split('\n')
                .find(|line| !is_blank(line))
                .map(leading_whitespace)
                .unwrap_or(0);
            strip_each(text, base)
        }
        Indent::Shift(n) if n > 0 => {
            let pad = " ".repeat(n.unsigned_abs().min(MAX_SHIFT));
            text.split('\n')
                .map(|line| {
                    if is_blank(line) {
                        line.to_string()
                    } else {
                        format!("{pad}{line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Indent::Shift(n) => strip_each(text, n.unsigned_abs()),
    }
}

fn strip_each(text: &str, max: usize) -> String {
    if max == 0 {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| {
            let cut = leading_whitespace(line).min(max);
            // 空白字符均为单字节，按字节切片安全
            &line[cut..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| is_whitespace(*c)).count()
}
