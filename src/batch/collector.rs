//! # 文件收集器
//!
//! 根据输入路径和模式收集待解析的输出日志。
//!
//! ## 功能
//! - 支持单文件和目录输入
//! - glob 模式匹配（逗号分隔多模式）
//! - 递归目录搜索
//!
//! ## 依赖关系
//! - 被 `commands/collect.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use crate::error::{CastlogError, Result};

use glob::Pattern;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 文件收集器
pub struct FileCollector {
    /// 输入路径
    input: PathBuf,
    /// 匹配模式列表（原始字符串）
    patterns: Vec<String>,
    /// 是否递归
    recursive: bool,
}

impl FileCollector {
    /// 创建新的文件收集器，默认匹配 `*.castep`
    pub fn new(input: PathBuf) -> Self {
        Self {
            input,
            patterns: vec!["*.castep".to_string()],
            recursive: false,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式）
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        let patterns: Vec<String> = pattern
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !patterns.is_empty() {
            self.patterns = patterns;
        }
        self
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 模式的显示形式
    pub fn pattern_display(&self) -> String {
        self.patterns.join(",")
    }

    /// 收集所有匹配的文件，按路径排序
    pub fn collect(&self) -> Result<Vec<PathBuf>> {
        if self.input.is_file() {
            return Ok(vec![self.input.clone()]);
        }

        if !self.input.is_dir() {
            return Err(CastlogError::DirectoryNotFound {
                path: self.input.display().to_string(),
            });
        }

        let patterns = self.compile()?;
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files: Vec<PathBuf> = WalkDir::new(&self.input)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|entry| Self::matches_any(&patterns, entry.path()))
            .map(|e| e.path().to_path_buf())
            .collect();

        files.sort();
        log::debug!(
            "collected {} files under {} matching '{}'",
            files.len(),
            self.input.display(),
            self.pattern_display()
        );
        Ok(files)
    }

    fn compile(&self) -> Result<Vec<Pattern>> {
        self.patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    CastlogError::InvalidArgument(format!("invalid pattern '{}': {}", p, e))
                })
            })
            .collect()
    }

    /// 检查文件名是否匹配任一模式
    fn matches_any(patterns: &[Pattern], path: &Path) -> bool {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        patterns.iter().any(|p| p.matches(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_collect_matches_pattern_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.castep"));
        touch(&dir.path().join("a.castep"));
        touch(&dir.path().join("a.cell"));
        touch(&dir.path().join("a.castep_bin"));

        let files = FileCollector::new(dir.path().to_path_buf()).collect().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.castep", "b.castep"]);
    }

    #[test]
    fn test_collect_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("run1");
        fs::create_dir(&sub).unwrap();
        touch(&dir.path().join("top.castep"));
        touch(&sub.join("nested.castep"));

        let flat = FileCollector::new(dir.path().to_path_buf()).collect().unwrap();
        assert_eq!(flat.len(), 1);

        let deep = FileCollector::new(dir.path().to_path_buf())
            .recursive(true)
            .collect()
            .unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_multiple_patterns_and_single_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x.castep"));
        touch(&dir.path().join("y.out"));

        let files = FileCollector::new(dir.path().to_path_buf())
            .with_pattern("*.castep, *.out")
            .collect()
            .unwrap();
        assert_eq!(files.len(), 2);

        let single = dir.path().join("y.out");
        let files = FileCollector::new(single.clone()).collect().unwrap();
        assert_eq!(files, vec![single]);
    }

    #[test]
    fn test_collect_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileCollector::new(dir.path().join("nope")).collect();
        assert!(matches!(missing, Err(CastlogError::DirectoryNotFound { .. })));

        let bad = FileCollector::new(dir.path().to_path_buf())
            .with_pattern("[*.castep")
            .collect();
        assert!(matches!(bad, Err(CastlogError::InvalidArgument(_))));
    }
}
