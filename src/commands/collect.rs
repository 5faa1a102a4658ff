//! # collect 命令实现
//!
//! 批量解析目录下的 .castep 日志，按最终能量排序并汇总。
//!
//! ## 功能
//! - 收集匹配的日志文件（可递归）
//! - 并行解析，空文件跳过，失败文件单独报告
//! - 终端显示能量最低的若干个计算
//! - 完整排序写入 CSV
//!
//! ## 依赖关系
//! - 使用 `cli/collect.rs` 定义的参数
//! - 使用 `batch/` 收集和并行执行
//! - 使用 `parsers/`, `models/`
//! - 使用 `utils/output.rs`

use crate::batch::{BatchResult, BatchRunner, FileCollector, ProcessResult};
use crate::cli::collect::CollectArgs;
use crate::error::{CastlogError, Result};
use crate::models::ParsedCalculation;
use crate::parsers;
use crate::utils::output;

use serde::Serialize;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 终端表格的一行
#[derive(Debug, Clone, Tabled)]
struct RankRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Run")]
    run: String,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "E/atom (eV)")]
    energy_per_atom: String,
    #[tabled(rename = "ΔE/atom (eV)")]
    delta: String,
    #[tabled(rename = "Finished")]
    finished: String,
}

/// CSV 汇总记录
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRecord {
    pub rank: usize,
    pub file: String,
    pub formula: String,
    pub num_atoms: Option<usize>,
    pub final_energy_ev: f64,
    pub energy_per_atom_ev: Option<f64>,
    pub delta_per_atom_ev: Option<f64>,
    pub final_enthalpy_ev: Option<f64>,
    pub enthalpy_per_atom_ev: Option<f64>,
    pub scf_cycles: usize,
    pub scf_iterations: u32,
    pub max_force_ev_per_a: Option<f64>,
    pub total_time_s: Option<f64>,
    pub finished: bool,
}

/// 执行 collect 命令
pub fn execute(args: CollectArgs) -> Result<()> {
    output::print_header("Collecting CASTEP Results");

    let collector = FileCollector::new(args.dir.clone())
        .with_pattern(&args.pattern)
        .recursive(args.recursive);
    let files = collector.collect()?;

    if files.is_empty() {
        return Err(CastlogError::NoFilesFound {
            pattern: format!("{}/{}", args.dir.display(), collector.pattern_display()),
        });
    }

    let mut runner = BatchRunner::new(args.jobs);
    if !std::io::stdout().is_terminal() {
        runner = runner.quiet();
    }
    output::print_info(&format!(
        "Parsing {} file(s) with {} job(s)...",
        files.len(),
        runner.jobs()
    ));

    let batch = parse_all(&runner, files);

    for (path, reason) in &batch.skipped {
        output::print_file_skipped(path, reason);
    }
    for (path, err) in &batch.failures {
        output::print_file_failed(path, err);
    }

    if batch.successes.is_empty() {
        output::print_warning("No log could be parsed.");
        return Ok(());
    }

    let records = rank_runs(&batch.successes);

    output::print_header(&format!(
        "Top {} Runs by Final Energy",
        args.top_n.min(records.len())
    ));
    let rows: Vec<RankRow> = records.iter().take(args.top_n).map(RankRow::from).collect();
    println!("{}", Table::new(rows));

    write_summary_csv(&records, &args.output)?;
    output::print_done(&format!(
        "{}/{} parsed, {} skipped, {} failed; summary saved to '{}'",
        batch.successes.len(),
        batch.total(),
        batch.skipped.len(),
        batch.failures.len(),
        args.output.display()
    ));

    Ok(())
}

/// 并行解析文件列表
pub fn parse_all(runner: &BatchRunner, files: Vec<PathBuf>) -> BatchResult<ParsedCalculation> {
    runner.run(files, |path| {
        match fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => {
                return ProcessResult::Skipped("empty file".to_string())
            }
            Ok(_) => {}
            Err(e) => return ProcessResult::Failed(e.to_string()),
        }

        match parsers::parse_output_file(path) {
            Ok(calc) => ProcessResult::Success(calc),
            Err(e) => ProcessResult::Failed(e.to_string()),
        }
    })
}

/// 按最终能量升序排序；每原子能量差以能量最低的计算为参考
pub fn rank_runs(successes: &[(PathBuf, ParsedCalculation)]) -> Vec<SummaryRecord> {
    let mut sorted: Vec<&(PathBuf, ParsedCalculation)> = successes.iter().collect();
    sorted.sort_by(|a, b| a.1.final_energy.total_cmp(&b.1.final_energy));

    let reference = sorted.first().and_then(|(_, c)| c.energy_per_atom());

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (path, calc))| {
            let per_atom = calc.energy_per_atom();
            SummaryRecord {
                rank: i + 1,
                file: path.display().to_string(),
                formula: calc.cell.formula(),
                num_atoms: calc.num_atoms(),
                final_energy_ev: calc.final_energy,
                energy_per_atom_ev: per_atom,
                delta_per_atom_ev: per_atom.zip(reference).map(|(e, r)| e - r),
                final_enthalpy_ev: calc.final_enthalpy,
                enthalpy_per_atom_ev: calc.enthalpy_per_atom(),
                scf_cycles: calc.scf_cycles,
                scf_iterations: calc.scf_trace.last().map(|s| s.iteration).unwrap_or(0),
                max_force_ev_per_a: calc.max_force().map(|(_, f)| f),
                total_time_s: calc.timing("Total"),
                finished: calc.finished,
            }
        })
        .collect()
}

impl From<&SummaryRecord> for RankRow {
    fn from(r: &SummaryRecord) -> Self {
        let fmt = |v: Option<f64>| v.map(|x| format!("{:.6}", x)).unwrap_or_else(|| "-".to_string());
        let run = Path::new(&r.file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| r.file.clone());
        RankRow {
            rank: r.rank,
            run,
            formula: r.formula.clone(),
            energy: format!("{:.6}", r.final_energy_ev),
            energy_per_atom: fmt(r.energy_per_atom_ev),
            delta: fmt(r.delta_per_atom_ev),
            finished: (if r.finished { "yes" } else { "no" }).to_string(),
        }
    }
}

/// 保存汇总到 CSV
pub fn write_summary_csv(records: &[SummaryRecord], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    for record in records {
        wtr.serialize(record)?;
    }

    wtr.flush().map_err(|e| CastlogError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SI2: &str = include_str!("../../tests/data/Si2.castep");

    fn write_run(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn populated_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_run(dir.path(), "a_high.castep", SI2);
        write_run(
            dir.path(),
            "b_low.castep",
            &SI2.replace(
                "Final energy, E             =  -337.6781491429",
                "Final energy, E             =  -338.0000000000",
            ),
        );
        write_run(dir.path(), "c_empty.castep", "");
        write_run(dir.path(), "d_broken.castep", "no energies here\n");
        dir
    }

    #[test]
    fn test_parse_all_sorts_outcomes() {
        let dir = populated_dir();
        let files = FileCollector::new(dir.path().to_path_buf()).collect().unwrap();
        assert_eq!(files.len(), 4);

        let batch = parse_all(&BatchRunner::new(2).quiet(), files);
        assert_eq!(batch.successes.len(), 2);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].0.ends_with("d_broken.castep"));
        assert!(batch.failures[0].1.contains("Final energy"));
    }

    #[test]
    fn test_rank_runs_by_final_energy() {
        let dir = populated_dir();
        let files = FileCollector::new(dir.path().to_path_buf()).collect().unwrap();
        let batch = parse_all(&BatchRunner::new(2).quiet(), files);

        let records = rank_runs(&batch.successes);
        assert_eq!(records.len(), 2);
        assert!(records[0].file.ends_with("b_low.castep"));
        assert_eq!(records[0].rank, 1);
        assert_relative_eq!(records[0].delta_per_atom_ev.unwrap(), 0.0);
        assert_relative_eq!(
            records[1].delta_per_atom_ev.unwrap(),
            (-337.6781491429 + 338.0) / 2.0,
            epsilon = 1e-9
        );
        assert_eq!(records[1].scf_iterations, 12);
        assert_eq!(records[1].formula, "Si2");
    }

    #[test]
    fn test_write_summary_csv() {
        let dir = populated_dir();
        let files = FileCollector::new(dir.path().to_path_buf()).collect().unwrap();
        let batch = parse_all(&BatchRunner::new(1).quiet(), files);
        let records = rank_runs(&batch.successes);

        let out = dir.path().join("summary.csv");
        write_summary_csv(&records, &out).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("rank,file,formula,num_atoms,final_energy_ev"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn test_execute_without_matches() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(CollectArgs {
            dir: dir.path().to_path_buf(),
            pattern: "*.castep".to_string(),
            recursive: false,
            jobs: 1,
            output: dir.path().join("summary.csv"),
            top_n: 10,
        })
        .unwrap_err();
        assert!(matches!(err, CastlogError::NoFilesFound { .. }));
    }
}
