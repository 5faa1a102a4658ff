//! # 解析器模块
//!
//! 提供 DFT 输出日志的解析器。每种格式实现 `OutputParser`，
//! 由文件扩展名分派；目前只有 CASTEP `.castep`。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: numeric, castep_out

pub mod castep_out;
pub mod numeric;

use crate::error::{CastlogError, Result};
use crate::models::ParsedCalculation;
use std::fs;
use std::path::Path;

/// 输出日志解析器
///
/// 解析是纯函数：同样的内容总是得到相同的结果，不读取环境或全局状态。
pub trait OutputParser {
    /// 格式名，用于日志和错误消息
    fn format_name(&self) -> &'static str;

    /// 解析整个日志内容
    fn parse_str(&self, content: &str) -> Result<ParsedCalculation>;

    /// 读取并解析文件
    fn parse_file(&self, path: &Path) -> Result<ParsedCalculation> {
        let content = fs::read_to_string(path).map_err(|e| CastlogError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        log::debug!(
            "parsing {} as {} ({} bytes)",
            path.display(),
            self.format_name(),
            content.len()
        );
        self.parse_str(&content)
    }
}

/// CASTEP `.castep` 输出解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct CastepParser;

impl OutputParser for CastepParser {
    fn format_name(&self) -> &'static str {
        "castep"
    }

    fn parse_str(&self, content: &str) -> Result<ParsedCalculation> {
        castep_out::parse_castep_content(content)
    }
}

/// 根据扩展名选择解析器
pub fn parser_for(path: &Path) -> Result<Box<dyn OutputParser + Send + Sync>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "castep" => Ok(Box::new(CastepParser)),
        _ => Err(CastlogError::UnsupportedFormat(format!(
            "Cannot determine output format for: {}",
            path.display()
        ))),
    }
}

/// 从文件路径推断格式并解析
pub fn parse_output_file(path: &Path) -> Result<ParsedCalculation> {
    if !path.exists() {
        return Err(CastlogError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    parser_for(path)?.parse_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parser_for_extension() {
        assert_eq!(
            parser_for(Path::new("run/Si2.castep")).unwrap().format_name(),
            "castep"
        );
        assert_eq!(
            parser_for(Path::new("Si2.CASTEP")).unwrap().format_name(),
            "castep"
        );
        assert!(matches!(
            parser_for(Path::new("OUTCAR")),
            Err(CastlogError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Si2.castep");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(include_str!("../../tests/data/Si2.castep").as_bytes())
            .unwrap();

        let calc = parse_output_file(&path).unwrap();
        assert_eq!(calc.forces.len(), 2);

        let missing = dir.path().join("missing.castep");
        assert!(matches!(
            parse_output_file(&missing),
            Err(CastlogError::FileNotFound { .. })
        ));
    }
}
