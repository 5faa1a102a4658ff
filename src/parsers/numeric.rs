//! # 数值字段与装饰行工具
//!
//! 固定列格式输出的通用词法层：
//! - 宽松的数值转换（带符号科学计数法、Fortran `D` 指数、普通小数）
//! - 数值与紧随其后单位的拆分
//! - 装饰行（横线、边框、空行）识别
//! - `Row`：带段落名和行号的分列行，列转换失败时给出定位错误
//!
//! ## 依赖关系
//! - 被 `parsers/castep_out.rs`, `models/calculation.rs` 使用
//! - 使用 `error.rs`

use crate::error::{CastlogError, Result};
use crate::models::AtomKey;

/// 宽松地解析一个数值字段
///
/// 接受 `-3.37678149E+002`、`0.1000E-04`、`1.5D-03`、`150.0000`。
/// Fortran 溢出时打印的 `*****` 返回 None。
pub fn parse_f64(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() || token.starts_with('*') {
        return None;
    }

    if let Ok(v) = token.parse::<f64>() {
        return Some(v);
    }

    // Fortran 双精度指数
    if token.contains(|c| c == 'D' || c == 'd') {
        let fixed: String = token
            .chars()
            .map(|c| if c == 'D' || c == 'd' { 'E' } else { c })
            .collect();
        return fixed.parse().ok();
    }

    None
}

/// 拆分数值和单位：`"150.0000   eV"` -> (150.0, Some("eV"))
///
/// 也处理数值与单位粘连的情况，如 `"7.93s"`。
pub fn split_value_unit(s: &str) -> Option<(f64, Option<&str>)> {
    let s = s.trim();
    let mut parts = s.splitn(2, char::is_whitespace);
    let first = parts.next()?;
    let rest = parts.next().map(str::trim).filter(|r| !r.is_empty());

    if let Some(v) = parse_f64(first) {
        return Some((v, rest.and_then(|r| r.split_whitespace().next())));
    }

    // 最长数值前缀
    let split = first
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(first.len()))
        .rev()
        .find(|&i| i > 0 && parse_f64(&first[..i]).is_some())?;
    let value = parse_f64(&first[..split])?;
    Some((value, Some(&first[split..])))
}

/// 是否为装饰行：空行或仅由边框字符组成的行
pub fn is_decorative(line: &str) -> bool {
    line.trim().chars().all(|c| matches!(c, '-' | '=' | '*' | '+' | 'x'))
}

/// 是否为分隔横线（至少三个同类字符）
pub fn is_rule(line: &str, ch: char) -> bool {
    let t = line.trim();
    t.len() >= 3 && t.chars().all(|c| c == ch)
}

/// 已分列的表格行
///
/// 列含义由各段落的语法决定，这里只负责转换和报错定位。
#[derive(Debug)]
pub struct Row<'a> {
    pub section: &'a str,
    pub line: usize,
    pub tokens: Vec<&'a str>,
}

impl<'a> Row<'a> {
    pub fn new(section: &'a str, line: usize, text: &'a str) -> Self {
        Row {
            section,
            line,
            tokens: text.split_whitespace().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 要求列数恰好为 `n`
    pub fn expect_len(&self, n: usize) -> Result<()> {
        if self.tokens.len() != n {
            return Err(CastlogError::malformed(
                self.section,
                self.line,
                format!("expected {} columns, found {}", n, self.tokens.len()),
            ));
        }
        Ok(())
    }

    pub fn str_at(&self, idx: usize) -> Result<&'a str> {
        self.tokens.get(idx).copied().ok_or_else(|| {
            CastlogError::malformed(self.section, self.line, format!("missing column {}", idx + 1))
        })
    }

    pub fn f64_at(&self, idx: usize) -> Result<f64> {
        let token = self.str_at(idx)?;
        parse_f64(token).ok_or_else(|| CastlogError::numeric(self.section, self.line, token))
    }

    pub fn usize_at(&self, idx: usize) -> Result<usize> {
        let token = self.str_at(idx)?;
        token
            .parse()
            .map_err(|_| CastlogError::numeric(self.section, self.line, token))
    }

    /// 三个连续数值列
    pub fn vec3_at(&self, idx: usize) -> Result<[f64; 3]> {
        Ok([self.f64_at(idx)?, self.f64_at(idx + 1)?, self.f64_at(idx + 2)?])
    }

    /// 物种标签 + 1 起始序号组成的原子键
    pub fn atom_key_at(&self, idx: usize) -> Result<AtomKey> {
        let species = self.str_at(idx)?;
        if !species.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(CastlogError::malformed(
                self.section,
                self.line,
                format!("'{}' is not a species label", species),
            ));
        }
        let index = self.usize_at(idx + 1)?;
        if index == 0 {
            return Err(CastlogError::malformed(
                self.section,
                self.line,
                "atom numbers start at 1",
            ));
        }
        Ok(AtomKey::new(species, index))
    }
}
