//! # 统一错误处理模块
//!
//! 定义 castlog 的所有错误类型，使用 `thiserror` 派生。
//!
//! 解析错误分三类：
//! - `MissingSection`: 必需的段落（如 Final energy）完全缺失
//! - `MalformedSection`: 已识别段落的行/列结构不符合预期
//! - `NumericParseError`: 期望为数值的字段无法转换，报告时视作 `MalformedSection` 的子类
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// castlog 统一错误类型
#[derive(Error, Debug)]
pub enum CastlogError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Missing required section: {section}")]
    MissingSection { section: String },

    #[error("Malformed section '{section}' at line {line}: {reason}")]
    MalformedSection {
        section: String,
        line: usize,
        reason: String,
    },

    #[error("Malformed section '{section}' at line {line}: cannot parse '{token}' as a number")]
    NumericParseError {
        section: String,
        line: usize,
        token: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // 序列化错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

impl CastlogError {
    /// 构造 `MalformedSection`
    pub fn malformed(section: &str, line: usize, reason: impl Into<String>) -> Self {
        CastlogError::MalformedSection {
            section: section.to_string(),
            line,
            reason: reason.into(),
        }
    }

    /// 构造 `NumericParseError`
    pub fn numeric(section: &str, line: usize, token: &str) -> Self {
        CastlogError::NumericParseError {
            section: section.to_string(),
            line,
            token: token.to_string(),
        }
    }

    /// 是否为段落结构错误（含数值转换错误）
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CastlogError::MalformedSection { .. } | CastlogError::NumericParseError { .. }
        )
    }

    /// 出错段落名称
    pub fn section(&self) -> Option<&str> {
        match self {
            CastlogError::MissingSection { section }
            | CastlogError::MalformedSection { section, .. }
            | CastlogError::NumericParseError { section, .. } => Some(section),
            _ => None,
        }
    }

    /// 出错行号（从 1 开始）
    pub fn line(&self) -> Option<usize> {
        match self {
            CastlogError::MalformedSection { line, .. }
            | CastlogError::NumericParseError { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, CastlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_error_reports_as_malformed() {
        let err = CastlogError::numeric("Symmetrised Forces", 42, "0.0O1");
        assert!(err.is_malformed());
        assert_eq!(err.section(), Some("Symmetrised Forces"));
        assert_eq!(err.line(), Some(42));
        assert!(err.to_string().contains("0.0O1"));
    }

    #[test]
    fn test_missing_section_is_not_malformed() {
        let err = CastlogError::MissingSection {
            section: "Final energy".to_string(),
        };
        assert!(!err.is_malformed());
        assert_eq!(err.section(), Some("Final energy"));
        assert_eq!(err.line(), None);
    }
}
