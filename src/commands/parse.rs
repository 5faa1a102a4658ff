//! # parse 命令实现
//!
//! 解析单个 .castep 日志，以表格或 JSON 输出解析结果。
//!
//! ## 功能
//! - 能量、体系和运行参数概要
//! - 受力、轨道布居、Mulliken 原子布居、计时表格
//! - 完整结果的 JSON 序列化
//!
//! ## 依赖关系
//! - 使用 `cli/parse.rs` 定义的参数
//! - 使用 `parsers/`, `models/`
//! - 使用 `utils/output.rs`

use crate::cli::parse::{OutputFormat, ParseArgs};
use crate::error::{CastlogError, Result};
use crate::models::ParsedCalculation;
use crate::parsers;
use crate::utils::output;

use std::fs;
use tabled::{Table, Tabled};

/// 概要表的一行
#[derive(Debug, Clone, Tabled)]
struct FieldRow {
    #[tabled(rename = "Quantity")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// 原子坐标表的一行
#[derive(Debug, Clone, Tabled)]
struct PositionRow {
    #[tabled(rename = "Atom")]
    atom: String,
    #[tabled(rename = "u")]
    u: String,
    #[tabled(rename = "v")]
    v: String,
    #[tabled(rename = "w")]
    w: String,
    #[tabled(rename = "Cartesian (Å)")]
    cartesian: String,
}

/// 受力表的一行
#[derive(Debug, Clone, Tabled)]
struct ForceRow {
    #[tabled(rename = "Atom")]
    atom: String,
    #[tabled(rename = "Fx (eV/Å)")]
    fx: String,
    #[tabled(rename = "Fy (eV/Å)")]
    fy: String,
    #[tabled(rename = "Fz (eV/Å)")]
    fz: String,
    #[tabled(rename = "|F| (eV/Å)")]
    magnitude: String,
}

/// 轨道布居表的一行
#[derive(Debug, Clone, Tabled)]
struct PopulationRow {
    #[tabled(rename = "Atom")]
    atom: String,
    #[tabled(rename = "Orbital")]
    orbital: String,
    #[tabled(rename = "Charge (e)")]
    charge: String,
}

/// Mulliken 原子布居表的一行
#[derive(Debug, Clone, Tabled)]
struct MullikenRow {
    #[tabled(rename = "Atom")]
    atom: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Charge (e)")]
    charge: String,
    #[tabled(rename = "Spin (hbar/2)")]
    spin: String,
}

/// 计时表的一行
#[derive(Debug, Clone, Tabled)]
struct TimingRow {
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Time (s)")]
    seconds: String,
}

/// 执行 parse 命令
pub fn execute(args: ParseArgs) -> Result<()> {
    let calc = parsers::parse_output_file(&args.input)?;

    let rendered = match args.format {
        OutputFormat::Table => render_tables(&calc),
        OutputFormat::Json => render_json(&calc)?,
    };

    match args.output {
        Some(path) => {
            fs::write(&path, rendered).map_err(|e| CastlogError::FileWriteError {
                path: path.display().to_string(),
                source: e,
            })?;
            output::print_success(&format!(
                "Wrote {} output for '{}' to '{}'",
                args.format,
                args.input.display(),
                path.display()
            ));
        }
        None => {
            if args.format == OutputFormat::Table {
                output::print_header(&format!("CASTEP run: {}", args.input.display()));
            }
            println!("{}", rendered);
        }
    }

    Ok(())
}

/// 完整结果的 JSON
pub fn render_json(calc: &ParsedCalculation) -> Result<String> {
    Ok(serde_json::to_string_pretty(calc)?)
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

/// 各段落的文本表格，缺失的段落不输出
pub fn render_tables(calc: &ParsedCalculation) -> String {
    let mut sections: Vec<String> = Vec::new();

    sections.push(format!("Summary\n{}", Table::new(summary_rows(calc))));

    if !calc.cell.positions.is_empty() {
        let rows: Vec<PositionRow> = calc
            .cell
            .positions
            .iter()
            .map(|(atom, p)| PositionRow {
                atom: atom.to_string(),
                u: format!("{:.6}", p[0]),
                v: format!("{:.6}", p[1]),
                w: format!("{:.6}", p[2]),
                cartesian: calc
                    .cell
                    .cartesian_position(atom)
                    .map(|c| format!("{:.5} {:.5} {:.5}", c[0], c[1], c[2]))
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        sections.push(format!("Cell contents\n{}", Table::new(rows)));
    }

    if !calc.forces.is_empty() {
        let rows: Vec<ForceRow> = calc
            .forces
            .iter()
            .map(|(atom, f)| ForceRow {
                atom: atom.to_string(),
                fx: format!("{:.5}", f[0]),
                fy: format!("{:.5}", f[1]),
                fz: format!("{:.5}", f[2]),
                magnitude: opt(calc.force_magnitude(atom), 5),
            })
            .collect();
        sections.push(format!("Forces\n{}", Table::new(rows)));
    }

    if !calc.populations.is_empty() {
        let rows: Vec<PopulationRow> = calc
            .populations
            .iter()
            .map(|(key, charge)| PopulationRow {
                atom: key.atom.to_string(),
                orbital: key.orbital.clone(),
                charge: format!("{:.3}", charge),
            })
            .collect();
        sections.push(format!(
            "Orbital populations (total {:.3} e)\n{}",
            calc.total_orbital_charge(),
            Table::new(rows)
        ));
    }

    if !calc.atomic_populations.is_empty() {
        let rows: Vec<MullikenRow> = calc
            .atomic_populations
            .iter()
            .map(|(atom, p)| MullikenRow {
                atom: atom.to_string(),
                total: format!("{:.2}", p.total),
                charge: format!("{:.2}", p.charge),
                spin: opt(p.spin, 2),
            })
            .collect();
        sections.push(format!("Mulliken atomic populations\n{}", Table::new(rows)));
    }

    if !calc.timings.is_empty() {
        let rows: Vec<TimingRow> = calc
            .timings
            .iter()
            .map(|(phase, s)| TimingRow {
                phase: phase.clone(),
                seconds: format!("{:.2}", s),
            })
            .collect();
        sections.push(format!("Timings\n{}", Table::new(rows)));
    }

    sections.join("\n\n")
}

fn summary_rows(calc: &ParsedCalculation) -> Vec<FieldRow> {
    let mut rows = vec![
        FieldRow {
            name: "Final energy (eV)",
            value: format!("{:.10}", calc.final_energy),
        },
        FieldRow {
            name: "Energy per atom (eV)",
            value: opt(calc.energy_per_atom(), 6),
        },
        FieldRow {
            name: "Final free energy (eV)",
            value: opt(calc.final_free_energy, 10),
        },
        FieldRow {
            name: "0K energy (eV)",
            value: opt(calc.zero_kelvin_energy, 10),
        },
    ];

    if calc.basis_corrected_energy.is_some() {
        rows.push(FieldRow {
            name: "Basis-corrected energy (eV)",
            value: opt(calc.basis_corrected_energy, 10),
        });
    }
    if calc.final_enthalpy.is_some() {
        rows.push(FieldRow {
            name: "Final enthalpy (eV)",
            value: opt(calc.final_enthalpy, 10),
        });
    }
    if calc.pressure_gpa.is_some() {
        rows.push(FieldRow {
            name: "Pressure (GPa)",
            value: opt(calc.pressure_gpa, 4),
        });
    }

    let formula = calc.cell.formula();
    rows.extend([
        FieldRow {
            name: "Formula",
            value: if formula.is_empty() {
                "-".to_string()
            } else {
                formula
            },
        },
        FieldRow {
            name: "Atoms",
            value: calc
                .num_atoms()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            name: "a, b, c (Å) / α, β, γ (°)",
            value: calc
                .cell
                .lattice
                .as_ref()
                .map(|l| {
                    let (a, b, c, alpha, beta, gamma) = l.parameters();
                    format!(
                        "{:.5} {:.5} {:.5} / {:.3} {:.3} {:.3}",
                        a, b, c, alpha, beta, gamma
                    )
                })
                .unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            name: "Cell volume (Å³)",
            value: opt(calc.cell.lattice.as_ref().map(|l| l.volume()), 4),
        },
        FieldRow {
            name: "Cut-off (eV)",
            value: opt(calc.cut_off_energy(), 2),
        },
        FieldRow {
            name: "k-points",
            value: calc
                .kpoints_used()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            name: "SCF cycles / last iterations",
            value: format!(
                "{} / {}",
                calc.scf_cycles,
                calc.scf_trace.last().map(|s| s.iteration).unwrap_or(0)
            ),
        },
        FieldRow {
            name: "CASTEP version",
            value: calc.castep_version.clone().unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            name: "Finished",
            value: (if calc.finished { "yes" } else { "no" }).to_string(),
        },
    ]);

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::castep_out::parse_castep_content;

    const SI2: &str = include_str!("../../tests/data/Si2.castep");

    #[test]
    fn test_render_tables_sections() {
        let calc = parse_castep_content(SI2).unwrap();
        let text = render_tables(&calc);

        assert!(text.contains("Summary"));
        assert!(text.contains("-337.6781491429"));
        assert!(text.contains("Si2"));
        assert!(text.contains("Forces"));
        assert!(text.contains("1.35750 1.35750 1.35750"));
        assert!(text.contains("60.000 60.000 60.000"));
        assert!(text.contains("Orbital populations (total 8.000 e)"));
        assert!(text.contains("Mulliken atomic populations"));
        assert!(text.contains("Initialisation"));
        assert!(text.contains("19.11"));
    }

    #[test]
    fn test_render_tables_skips_absent_sections() {
        let calc = parse_castep_content("Final energy, E = -1.5 eV\n").unwrap();
        let text = render_tables(&calc);
        assert!(text.contains("Summary"));
        assert!(!text.contains("Forces"));
        assert!(!text.contains("Timings"));
    }

    #[test]
    fn test_render_json_round_trips() {
        let calc = parse_castep_content(SI2).unwrap();
        let json = render_json(&calc).unwrap();
        assert!(json.contains("\"Si 1 Px\""));

        let back: ParsedCalculation = serde_json::from_str(&json).unwrap();
        assert!((back.final_energy - calc.final_energy).abs() < 1e-9);
        assert_eq!(back.scf_trace.len(), calc.scf_trace.len());
        assert_eq!(back.forces.keys().collect::<Vec<_>>(), calc.forces.keys().collect::<Vec<_>>());
        assert_eq!(back.populations.len(), calc.populations.len());
        assert_eq!(back.metadata, calc.metadata);
        assert_eq!(back.finished, calc.finished);
    }

    #[test]
    fn test_execute_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Si2.castep");
        fs::write(&input, SI2).unwrap();
        let out = dir.path().join("Si2.json");

        execute(ParseArgs {
            input,
            format: OutputFormat::Json,
            output: Some(out.clone()),
        })
        .unwrap();

        let written = fs::read_to_string(out).unwrap();
        let calc: ParsedCalculation = serde_json::from_str(&written).unwrap();
        assert_eq!(calc.forces.len(), 2);
    }
}
