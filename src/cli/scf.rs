//! # scf 子命令 CLI 定义
//!
//! 显示 SCF 收敛过程
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/scf.rs`

use clap::Args;
use std::path::PathBuf;

/// scf 子命令参数
#[derive(Args, Debug)]
pub struct ScfArgs {
    /// Path to the .castep output file
    pub input: PathBuf,

    /// Save a convergence plot (PNG) to this path
    #[arg(short, long)]
    pub plot: Option<PathBuf>,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1000)]
    pub width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 700)]
    pub height: u32,
}
