//! # castlog - CASTEP 输出日志解析工具
//!
//! 把 CASTEP `.castep` 文本日志解析为结构化数据：最终能量、SCF 收敛过程、
//! 受力、轨道与 Mulliken 布居、晶胞、计时和运行参数。
//!
//! ## 子命令
//! - `parse`   - 解析单个日志，输出表格或 JSON
//! - `scf`     - SCF 收敛表格与收敛曲线
//! - `collect` - 批量解析并按最终能量排序
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── batch/     (文件收集与并行执行)
//!   │     ├── parsers/   (日志解析器)
//!   │     └── models/    (数据模型)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod error;
mod models;
mod parsers;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Err(e) = commands::run(cli.command) {
        log::debug!("command failed: {:?}", e);
        utils::output::print_error(&format!("{}", e));
        if e.is_malformed() {
            if let (Some(section), Some(line)) = (e.section(), e.line()) {
                utils::output::print_info(&format!(
                    "Check the '{}' block of the log around line {}",
                    section, line
                ));
            }
        }
        std::process::exit(1);
    }
}
