//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `parse`: 解析单个 .castep 日志并输出表格或 JSON
//! - `scf`: 显示 SCF 收敛过程，可选绘图
//! - `collect`: 批量解析目录下的日志并按能量排序
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: parse, scf, collect

pub mod collect;
pub mod parse;
pub mod scf;

use clap::{Parser, Subcommand};

/// castlog - CASTEP 输出日志解析工具
#[derive(Parser)]
#[command(name = "castlog")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Structured parser and batch summariser for CASTEP .castep logs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Parse a .castep log and print its contents
    Parse(parse::ParseArgs),

    /// Show the SCF convergence trace of a .castep log
    Scf(scf::ScfArgs),

    /// Parse every .castep log under a directory and rank by final energy
    Collect(collect::CollectArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommand_args() {
        let cli = Cli::try_parse_from(["castlog", "-v", "parse", "Si2.castep", "--format", "json"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Parse(args) => {
                assert_eq!(args.input.to_str(), Some("Si2.castep"));
                assert_eq!(args.format, parse::OutputFormat::Json);
                assert!(args.output.is_none());
            }
            _ => panic!("expected parse"),
        }
    }

    #[test]
    fn test_collect_defaults() {
        let cli = Cli::try_parse_from(["castlog", "collect", "runs"]).unwrap();
        match cli.command {
            Commands::Collect(args) => {
                assert_eq!(args.pattern, "*.castep");
                assert!(!args.recursive);
                assert_eq!(args.top_n, 10);
                assert_eq!(args.output.to_str(), Some("castep_summary.csv"));
            }
            _ => panic!("expected collect"),
        }
    }
}
