//! # scf 命令实现
//!
//! 显示最后一个 SCF 循环的收敛过程，可选绘制收敛曲线。
//!
//! ## 功能
//! - SCF 迭代表格（能量、费米能、每原子能量增益、耗时）
//! - SCF 末能量与 Final energy 的差值
//! - log10|ΔE| 随迭代变化的 PNG 图
//!
//! ## 依赖关系
//! - 使用 `cli/scf.rs` 定义的参数
//! - 使用 `parsers/`, `models/`
//! - 使用 `utils/output.rs`
//! - 使用 `plotters` 绘图

use crate::cli::scf::ScfArgs;
use crate::error::{CastlogError, Result};
use crate::models::{ParsedCalculation, ScfStep};
use crate::parsers;
use crate::utils::output;

use plotters::prelude::*;
use std::path::Path;
use tabled::{Table, Tabled};

/// SCF 末能量与 Final energy 允许的差 (eV)
const SCF_FINAL_TOLERANCE: f64 = 1e-4;

/// SCF 表的一行
#[derive(Debug, Clone, Tabled)]
struct ScfRow {
    #[tabled(rename = "Iter")]
    iteration: String,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "Fermi (eV)")]
    fermi: String,
    #[tabled(rename = "ΔE/atom (eV)")]
    gain: String,
    #[tabled(rename = "Timer (s)")]
    elapsed: String,
}

impl From<&ScfStep> for ScfRow {
    fn from(step: &ScfStep) -> Self {
        ScfRow {
            iteration: if step.iteration == 0 {
                "Initial".to_string()
            } else {
                step.iteration.to_string()
            },
            energy: format!("{:.8}", step.energy),
            fermi: step
                .fermi_energy
                .map(|f| format!("{:.6}", f))
                .unwrap_or_else(|| "-".to_string()),
            gain: step
                .energy_gain_per_atom
                .map(|g| format!("{:.3e}", g))
                .unwrap_or_else(|| "-".to_string()),
            elapsed: format!("{:.2}", step.elapsed_seconds),
        }
    }
}

/// 执行 scf 命令
pub fn execute(args: ScfArgs) -> Result<()> {
    let calc = parsers::parse_output_file(&args.input)?;

    if calc.scf_trace.is_empty() {
        output::print_warning(&format!(
            "No SCF table found in '{}'",
            args.input.display()
        ));
        return Ok(());
    }

    output::print_header(&format!(
        "SCF convergence: {} ({} cycle(s), showing the last)",
        args.input.display(),
        calc.scf_cycles
    ));

    let rows: Vec<ScfRow> = calc.scf_trace.iter().map(ScfRow::from).collect();
    println!("{}", Table::new(rows));

    if let Some(diff) = final_energy_gap(&calc) {
        let msg = format!(
            "Last SCF energy differs from Final energy by {:.3e} eV",
            diff
        );
        if calc.scf_matches_final(SCF_FINAL_TOLERANCE) {
            output::print_info(&msg);
        } else {
            output::print_warning(&msg);
        }
    }

    if let Some(ref path) = args.plot {
        plot_convergence(&calc.scf_trace, path, args.width, args.height)?;
        output::print_success(&format!("Convergence plot saved to '{}'", path.display()));
    }

    Ok(())
}

/// SCF 末能量与 Final energy 的差（两者打印精度不同）
fn final_energy_gap(calc: &ParsedCalculation) -> Option<f64> {
    calc.last_scf_energy().map(|e| (e - calc.final_energy).abs())
}

/// 可绘制的 (迭代, log10|ΔE|) 点，跳过 Initial 行和零增益
fn convergence_points(trace: &[ScfStep]) -> Vec<(f64, f64)> {
    trace
        .iter()
        .filter_map(|s| {
            s.energy_gain_per_atom
                .map(f64::abs)
                .filter(|g| *g > 0.0)
                .map(|g| (s.iteration as f64, g.log10()))
        })
        .collect()
}

/// 绘制收敛曲线 PNG
fn plot_convergence(trace: &[ScfStep], output_path: &Path, width: u32, height: u32) -> Result<()> {
    let points = convergence_points(trace);
    if points.is_empty() {
        return Err(CastlogError::Other(
            "No SCF energy gains to plot".to_string(),
        ));
    }

    let x_max = points.iter().map(|(x, _)| *x).fold(1.0, f64::max);
    let y_min = points.iter().map(|(_, y)| *y).fold(f64::INFINITY, f64::min);
    let y_max = points
        .iter()
        .map(|(_, y)| *y)
        .fold(f64::NEG_INFINITY, f64::max);

    let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| CastlogError::Other(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption("SCF Convergence", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.5..(x_max + 0.5), (y_min.floor() - 0.5)..(y_max.ceil() + 0.5))
        .map_err(|e| CastlogError::Other(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc("SCF iteration")
        .y_desc("log10 |ΔE per atom| (eV)")
        .draw()
        .map_err(|e| CastlogError::Other(e.to_string()))?;

    chart
        .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))
        .map_err(|e| CastlogError::Other(e.to_string()))?;

    chart
        .draw_series(points.iter().map(|(x, y)| Circle::new((*x, *y), 4, BLUE.filled())))
        .map_err(|e| CastlogError::Other(e.to_string()))?;

    root.present()
        .map_err(|e| CastlogError::Other(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::castep_out::parse_castep_content;
    use approx::assert_relative_eq;

    const SI2: &str = include_str!("../../tests/data/Si2.castep");

    #[test]
    fn test_convergence_points_skip_initial() {
        let calc = parse_castep_content(SI2).unwrap();
        let points = convergence_points(&calc.scf_trace);
        assert_eq!(points.len(), 12);
        assert_relative_eq!(points[0].0, 1.0);
        assert_relative_eq!(points[11].1, 1.16106013e-11_f64.log10(), epsilon = 1e-12);
        assert!(points.first().unwrap().1 > points.last().unwrap().1);
    }

    #[test]
    fn test_final_energy_gap() {
        let calc = parse_castep_content(SI2).unwrap();
        let gap = final_energy_gap(&calc).unwrap();
        assert!(gap < 1e-5);
    }

    #[test]
    fn test_scf_row_labels() {
        let calc = parse_castep_content(SI2).unwrap();
        let first = ScfRow::from(&calc.scf_trace[0]);
        assert_eq!(first.iteration, "Initial");
        assert_eq!(first.gain, "-");
        let last = ScfRow::from(calc.scf_trace.last().unwrap());
        assert_eq!(last.iteration, "12");
        assert_eq!(last.elapsed, "6.48");
    }

    #[test]
    fn test_plot_without_gains_fails() {
        let dir = tempfile::tempdir().unwrap();
        let trace = vec![ScfStep {
            iteration: 0,
            energy: -1.0,
            fermi_energy: None,
            energy_gain_per_atom: None,
            elapsed_seconds: 0.1,
        }];
        let err = plot_convergence(&trace, &dir.path().join("scf.png"), 400, 300).unwrap_err();
        assert!(matches!(err, CastlogError::Other(_)));
    }
}
