//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `models/`, `batch/`, `utils/`
//! - 子模块: parse, scf, collect

pub mod collect;
pub mod parse;
pub mod scf;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Parse(args) => parse::execute(args),
        Commands::Scf(args) => scf::execute(args),
        Commands::Collect(args) => collect::execute(args),
    }
}
