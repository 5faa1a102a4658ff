//! # 美化输出工具
//!
//! 提供统一的终端输出样式。诊断信息走 `log`，这里只负责面向用户的状态行。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块和 `main.rs` 使用
//! - 使用 `colored` crate

use colored::Colorize;
use std::path::Path;

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 单个日志文件的状态行：路径加原因
fn file_status(path: &Path, reason: &str) -> String {
    format!("{}: {}", path.display().to_string().cyan(), reason)
}

/// 打印被跳过的日志文件
pub fn print_file_skipped(path: &Path, reason: &str) {
    println!("{} {}", "[SKIP]".dimmed(), file_status(path, reason));
}

/// 打印解析失败的日志文件
pub fn print_file_failed(path: &Path, reason: &str) {
    println!("{} {}", "[FAIL]".red(), file_status(path, reason));
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_keeps_path_and_reason() {
        let line = file_status(Path::new("runs/Si2.castep"), "empty file");
        assert!(line.contains("runs/Si2.castep"));
        assert!(line.ends_with(": empty file"));
    }
}
