//! # collect 子命令 CLI 定义
//!
//! 批量解析目录下的 .castep 日志并汇总
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/collect.rs`

use clap::Args;
use std::path::PathBuf;

/// collect 子命令参数
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Directory containing CASTEP runs (or a single .castep file)
    pub dir: PathBuf,

    /// Glob pattern(s) for log files, comma separated
    #[arg(long, default_value = "*.castep")]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, env = "CASTLOG_JOBS", default_value_t = 0)]
    pub jobs: usize,

    /// Filename for the full CSV summary
    #[arg(short, long, default_value = "castep_summary.csv")]
    pub output: PathBuf,

    /// Number of lowest-energy runs to print
    #[arg(long, default_value_t = 10)]
    pub top_n: usize,
}
