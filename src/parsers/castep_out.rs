//! # CASTEP .castep 输出解析器
//!
//! 单遍逐行扫描的状态机，把 .castep 日志转换为 `ParsedCalculation`。
//!
//! ## 段落与状态
//! ```text
//! Searching ──"SCF loop"──────────────> ScfTable            (横线结束，必需)
//!           ──"*** Symmetrised Forces"> Forces              (星号框结束，必需)
//!           ──"Orbital Populations"───> OrbitalPopulations  (Total: 后的横线结束，必需)
//!           ──"Atomic Populations"────> AtomicPopulations   (等号线结束，可开放)
//!           ──"Real Lattice(A)"───────> Lattice             (三行晶格向量，必需)
//!           ──"Fractional coordinates"> Coordinates         (x 框结束，必需)
//!           ──"Mass of species in AMU"> Masses              (空行结束)
//!           ──"Files used for pseudo.."> Pseudopotentials    (空行结束)
//!           ──"<Phase> time = ..."────> Timings             ("Total time" 结束)
//! ```
//! 标题横幅、横线和空行不携带信息，在 Searching 状态下直接跳过。
//! 每个段落按固定列语义分列，列数不符时报 `MalformedSection`。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 的 `CastepParser` 使用
//! - 使用 `parsers/numeric.rs`, `models/`

use super::numeric::{self, Row};
use crate::error::{CastlogError, Result};
use crate::models::{AtomKey, AtomicPopulation, Lattice, OrbitalKey, ParsedCalculation, ScfStep};

use once_cell::sync::Lazy;
use regex::Regex;

const SCF_MARKER: &str = "<-- SCF";

const SCF_SECTION: &str = "SCF loop";
const FINAL_ENERGY_SECTION: &str = "Final energy";
const ORBITAL_SECTION: &str = "Orbital Populations";
const ATOMIC_SECTION: &str = "Atomic Populations";
const LATTICE_SECTION: &str = "Unit Cell";
const COORDINATES_SECTION: &str = "Cell Contents";
const MASSES_SECTION: &str = "Mass of species in AMU";
const PSEUDO_SECTION: &str = "Files used for pseudopotentials";
const TIMINGS_SECTION: &str = "Timings";

/// 受力段落标题：`******** Symmetrised Forces ********`
static FORCES_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\*+\s+((?:Symmetrised |Constrained |Unconstrained )?Forces)\s+\*+\s*$")
        .expect("forces header regex")
});

/// 计时行：`Calculation time    =      6.02 s`
static TIMING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Z][a-z]+) time\s*=\s*(\S+(?:\s+\S+)?)\s*$").expect("timing line regex")
});

static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CASTEP version\s+(\d[\w.]*)").expect("version regex"));

/// 以 `key = value` 形式出现在晶胞/k 点段落中、需要记入元数据的行
const EQ_METADATA: &[&str] = &[
    "Total number of ions in cell",
    "Total number of species in cell",
    "Max number of any one species",
    "Current cell volume",
    "Number of kpoints used",
    "Number of symmetry operations",
];

/// 从字符串内容解析 .castep 输出
pub fn parse_castep_content(content: &str) -> Result<ParsedCalculation> {
    let mut scanner = Scanner::default();
    let mut last_line = 0;

    for (idx, line) in content.lines().enumerate() {
        last_line = idx + 1;
        scanner.feed(last_line, line)?;
    }

    scanner.finish(last_line)
}

/// 扫描状态
#[derive(Debug, Default)]
enum State {
    #[default]
    Searching,
    ScfTable {
        opened: usize,
        fermi: bool,
        rows: Vec<ScfStep>,
    },
    Forces {
        section: &'static str,
        opened: usize,
        rows: Vec<(AtomKey, [f64; 3], usize)>,
    },
    OrbitalPopulations {
        opened: usize,
        columns: Option<usize>,
        total: Option<f64>,
        rows: Vec<(OrbitalKey, f64, usize)>,
    },
    AtomicPopulations {
        layout: Option<AtomicLayout>,
        rows: Vec<(AtomKey, AtomicPopulation, usize)>,
    },
    Lattice {
        opened: usize,
        rows: Vec<[f64; 3]>,
    },
    Coordinates {
        opened: usize,
        rows: Vec<(AtomKey, [f64; 3])>,
    },
    Masses {
        seen_rows: bool,
    },
    Pseudopotentials {
        seen_rows: bool,
    },
    Timings,
}

/// Mulliken 原子布居表的列布局，由表头推出
#[derive(Debug, Clone, Copy)]
struct AtomicLayout {
    orbitals: usize,
    spin: bool,
}

impl AtomicLayout {
    /// 数据行列数：物种 + 序号 + 各轨道 + Total + Charge [+ Spin]
    fn columns(&self) -> usize {
        2 + self.orbitals + 2 + usize::from(self.spin)
    }
}

/// 单行处理结果
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Consumed,
    /// 段落隐式结束，该行需在 Searching 状态下重新处理
    Reprocess,
}

#[derive(Debug, Default)]
struct Scanner {
    calc: ParsedCalculation,
    state: State,
    final_energy: Option<f64>,
    in_parameters: bool,
    force_section: &'static str,
    force_lines: Vec<(AtomKey, usize)>,
    orbital_lines: Vec<(AtomKey, usize)>,
    atomic_lines: Vec<(AtomKey, usize)>,
}

impl Scanner {
    fn feed(&mut self, n: usize, line: &str) -> Result<()> {
        if self.step(n, line)? == Step::Reprocess {
            self.state = State::Searching;
            self.search(n, line)?;
        }
        Ok(())
    }

    fn step(&mut self, n: usize, line: &str) -> Result<Step> {
        match self.state {
            State::Searching => {
                self.search(n, line)?;
                Ok(Step::Consumed)
            }
            State::ScfTable { .. } => self.scf_row(n, line),
            State::Forces { .. } => self.force_row(n, line),
            State::OrbitalPopulations { .. } => self.orbital_row(n, line),
            State::AtomicPopulations { .. } => self.atomic_row(n, line),
            State::Lattice { .. } => self.lattice_row(n, line),
            State::Coordinates { .. } => self.coordinate_row(n, line),
            State::Masses { .. } | State::Pseudopotentials { .. } => self.species_row(n, line),
            State::Timings => self.timing_row(n, line),
        }
    }

    fn enter(&mut self, n: usize, state: State) {
        log::debug!("line {}: entering {:?}", n, state);
        self.state = state;
    }

    fn leave(&mut self, n: usize) {
        log::debug!("line {}: back to Searching", n);
        self.state = State::Searching;
    }

    // ─────────────────────────────────────────────────────────────
    // Searching
    // ─────────────────────────────────────────────────────────────

    fn search(&mut self, n: usize, line: &str) -> Result<()> {
        if numeric::is_decorative(line) {
            return Ok(());
        }
        let trimmed = line.trim();

        if self.calc.castep_version.is_none() {
            if let Some(caps) = VERSION.captures(line) {
                self.calc.castep_version = Some(caps[1].to_string());
                return Ok(());
            }
        }

        // 参数段落：`****** General Parameters ******` 到 Unit Cell 之前
        if trimmed.starts_with('*') && trimmed.contains("Parameters") {
            self.in_parameters = true;
            return Ok(());
        }
        if trimmed == "Unit Cell" {
            self.in_parameters = false;
            return Ok(());
        }

        if line.contains(SCF_MARKER) && line.contains(SCF_SECTION) {
            let fermi = line.contains("Fermi");
            self.enter(
                n,
                State::ScfTable {
                    opened: n,
                    fermi,
                    rows: Vec::new(),
                },
            );
            return Ok(());
        }

        if trimmed.starts_with(FINAL_ENERGY_SECTION) {
            self.final_energy = Some(value_after_eq(FINAL_ENERGY_SECTION, n, line)?);
            return Ok(());
        }
        if trimmed.starts_with("Final free energy") {
            self.calc.final_free_energy = Some(value_after_eq("Final free energy", n, line)?);
            return Ok(());
        }
        if trimmed.starts_with("NB est. 0K energy") {
            self.calc.zero_kelvin_energy = Some(value_after_eq("NB est. 0K energy", n, line)?);
            return Ok(());
        }
        if trimmed.starts_with("Total energy corrected for finite basis set") {
            self.calc.basis_corrected_energy =
                Some(value_after_eq("Total energy corrected for finite basis set", n, line)?);
            return Ok(());
        }
        if trimmed.contains("Final Enthalpy") {
            self.calc.final_enthalpy = Some(value_after_eq("Final Enthalpy", n, line)?);
            return Ok(());
        }

        if let Some(caps) = FORCES_HEADER.captures(line) {
            let section = match &caps[1] {
                "Symmetrised Forces" => "Symmetrised Forces",
                "Constrained Forces" => "Constrained Forces",
                "Unconstrained Forces" => "Unconstrained Forces",
                _ => "Forces",
            };
            self.enter(
                n,
                State::Forces {
                    section,
                    opened: n,
                    rows: Vec::new(),
                },
            );
            return Ok(());
        }

        if trimmed == ORBITAL_SECTION {
            self.enter(
                n,
                State::OrbitalPopulations {
                    opened: n,
                    columns: None,
                    total: None,
                    rows: Vec::new(),
                },
            );
            return Ok(());
        }

        if trimmed.starts_with("Atomic Populations (Mulliken)") {
            self.enter(
                n,
                State::AtomicPopulations {
                    layout: None,
                    rows: Vec::new(),
                },
            );
            return Ok(());
        }

        if trimmed.starts_with("Real Lattice") {
            self.enter(
                n,
                State::Lattice {
                    opened: n,
                    rows: Vec::new(),
                },
            );
            return Ok(());
        }

        if trimmed.contains("Fractional coordinates of atoms") {
            self.enter(
                n,
                State::Coordinates {
                    opened: n,
                    rows: Vec::new(),
                },
            );
            return Ok(());
        }

        if trimmed == MASSES_SECTION {
            self.enter(n, State::Masses { seen_rows: false });
            return Ok(());
        }

        if trimmed.starts_with(PSEUDO_SECTION) {
            self.enter(n, State::Pseudopotentials { seen_rows: false });
            return Ok(());
        }

        if TIMING_LINE.is_match(line) {
            self.enter(n, State::Timings);
            self.timing_row(n, line)?;
            return Ok(());
        }

        if let Some(pos) = trimmed.find("Pressure:") {
            let row = Row::new("Pressure", n, &trimmed[pos + "Pressure:".len()..]);
            self.calc.pressure_gpa = Some(row.f64_at(0)?);
            return Ok(());
        }

        if self.in_parameters {
            if let Some((key, value)) = trimmed.split_once(" : ") {
                self.calc
                    .metadata
                    .insert(normalize_key(key), value.trim().to_string());
            }
            return Ok(());
        }

        for key in EQ_METADATA {
            if trimmed.starts_with(key) {
                if let Some((_, value)) = trimmed.split_once('=') {
                    self.calc
                        .metadata
                        .insert(normalize_key(key), value.trim().to_string());
                }
                return Ok(());
            }
        }

        if let Some(rest) = trimmed.strip_prefix("MP grid size for SCF calculation is") {
            self.calc.metadata.insert(
                "mp grid size for scf calculation".to_string(),
                rest.split_whitespace().collect::<Vec<_>>().join(" "),
            );
            return Ok(());
        }

        log::trace!("line {}: no section marker", n);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // SCF 表
    // ─────────────────────────────────────────────────────────────

    fn scf_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let State::ScfTable { fermi, rows, .. } = &mut self.state else {
            return Ok(Step::Reprocess);
        };

        // 表内穿插的无标记输出（如 verbose 模式下的诊断行）
        let Some(pos) = line.find(SCF_MARKER) else {
            log::trace!("line {}: unmarked line inside SCF table", n);
            return Ok(Step::Consumed);
        };
        let body = line[..pos].trim();
        let row = Row::new(SCF_SECTION, n, body);

        if row.is_empty() {
            return Ok(Step::Consumed);
        }

        if numeric::is_rule(body, '-') {
            if !rows.is_empty() {
                self.calc.scf_trace = std::mem::take(rows);
                self.calc.scf_cycles += 1;
                self.leave(n);
            }
            return Ok(Step::Consumed);
        }

        let first = row.str_at(0)?;
        let iteration = if first == "Initial" {
            0
        } else if let Ok(i) = first.parse::<u32>() {
            i
        } else if row.tokens.iter().all(|t| numeric::parse_f64(t).is_none()) {
            // 表头续行，如 "per atom   (sec)"
            return Ok(Step::Consumed);
        } else {
            return Err(CastlogError::malformed(
                SCF_SECTION,
                n,
                format!("invalid iteration '{}'", first),
            ));
        };

        // Initial: 能量 [费米能] 计时；迭代行: 序号 能量 [费米能] 增益 计时
        let has_gain = iteration > 0;
        row.expect_len(3 + usize::from(*fermi) + usize::from(has_gain))?;

        let mut col = 1;
        let energy = row.f64_at(col)?;
        col += 1;
        let fermi_energy = if *fermi {
            col += 1;
            Some(row.f64_at(col - 1)?)
        } else {
            None
        };
        let energy_gain_per_atom = if has_gain {
            col += 1;
            Some(row.f64_at(col - 1)?)
        } else {
            None
        };
        let elapsed_seconds = row.f64_at(col)?;

        if let Some(prev) = rows.last() {
            if iteration < prev.iteration {
                return Err(CastlogError::malformed(
                    SCF_SECTION,
                    n,
                    format!(
                        "iteration {} follows iteration {}",
                        iteration, prev.iteration
                    ),
                ));
            }
        }

        rows.push(ScfStep {
            iteration,
            energy,
            fermi_energy,
            energy_gain_per_atom,
            elapsed_seconds,
        });
        Ok(Step::Consumed)
    }

    // ─────────────────────────────────────────────────────────────
    // 受力框
    // ─────────────────────────────────────────────────────────────

    fn force_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let State::Forces { section, rows, .. } = &mut self.state else {
            return Ok(Step::Reprocess);
        };
        let section: &'static str = *section;
        let t = line.trim();

        if !t.starts_with('*') {
            return Err(CastlogError::malformed(section, n, "forces box is not closed"));
        }

        // 结束边框
        if t.chars().all(|c| c == '*') {
            let expected = self.calc.cell.num_atoms();
            if rows.is_empty() {
                return Err(CastlogError::malformed(section, n, "forces box has no atom rows"));
            }
            if expected > 0 && rows.len() != expected {
                return Err(CastlogError::malformed(
                    section,
                    n,
                    format!("expected {} atom rows, found {}", expected, rows.len()),
                ));
            }

            let rows = std::mem::take(rows);
            self.force_section = section;
            self.force_lines = rows.iter().map(|(k, _, l)| (k.clone(), *l)).collect();
            self.calc.forces = rows.into_iter().map(|(k, f, _)| (k, f)).collect();
            self.leave(n);
            return Ok(Step::Consumed);
        }

        let inner = t.trim_matches('*').trim();
        if inner.is_empty() || inner.starts_with('-') || !inner.contains(|c: char| c.is_ascii_digit())
        {
            return Ok(Step::Consumed);
        }

        // 物种 序号 Fx Fy Fz [(cons'd)]
        let row = Row::new(section, n, inner);
        let data_columns = row
            .tokens
            .iter()
            .position(|t| t.starts_with('('))
            .unwrap_or(row.len());
        if data_columns != 5 {
            return Err(CastlogError::malformed(
                section,
                n,
                format!("expected 5 columns, found {}", data_columns),
            ));
        }

        let key = row.atom_key_at(0)?;
        let force = row.vec3_at(2)?;
        if rows.iter().any(|(k, _, _)| k == &key) {
            return Err(CastlogError::malformed(
                section,
                n,
                format!("duplicate atom {}", key),
            ));
        }
        rows.push((key, force, n));
        Ok(Step::Consumed)
    }

    // ─────────────────────────────────────────────────────────────
    // 轨道布居
    // ─────────────────────────────────────────────────────────────

    fn orbital_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let State::OrbitalPopulations {
            columns,
            total,
            rows,
            ..
        } = &mut self.state
        else {
            return Ok(Step::Reprocess);
        };
        let t = line.trim();

        if t.is_empty() {
            return Ok(Step::Consumed);
        }

        if numeric::is_rule(t, '-') {
            if total.is_some() {
                let rows = std::mem::take(rows);
                self.calc.orbital_population_total = *total;
                self.orbital_lines = rows.iter().map(|(k, _, l)| (k.atom.clone(), *l)).collect();
                self.calc.populations = rows.into_iter().map(|(k, q, _)| (k, q)).collect();
                self.leave(n);
            }
            return Ok(Step::Consumed);
        }

        if let Some(rest) = t.strip_prefix("Total:") {
            let row = Row::new(ORBITAL_SECTION, n, rest);
            row.expect_len(1)?;
            *total = Some(row.f64_at(0)?);
            return Ok(Step::Consumed);
        }

        let Some(expected) = *columns else {
            if t.contains("Orbital") && t.contains("Charge") {
                *columns = Some(t.split_whitespace().count());
                return Ok(Step::Consumed);
            }
            return Err(CastlogError::malformed(
                ORBITAL_SECTION,
                n,
                "missing column header",
            ));
        };

        if total.is_some() {
            return Err(CastlogError::malformed(
                ORBITAL_SECTION,
                n,
                "row after the Total: line",
            ));
        }

        // 物种 序号 轨道 [各自旋分量] 电荷
        let row = Row::new(ORBITAL_SECTION, n, t);
        row.expect_len(expected)?;
        let atom = row.atom_key_at(0)?;
        let orbital = row.str_at(2)?;
        for idx in 3..expected - 1 {
            row.f64_at(idx)?;
        }
        let charge = row.f64_at(expected - 1)?;

        let key = OrbitalKey::new(atom, orbital);
        if rows.iter().any(|(k, _, _)| k == &key) {
            return Err(CastlogError::malformed(
                ORBITAL_SECTION,
                n,
                format!("duplicate orbital {}", key),
            ));
        }
        rows.push((key, charge, n));
        Ok(Step::Consumed)
    }

    // ─────────────────────────────────────────────────────────────
    // Mulliken 原子布居
    // ─────────────────────────────────────────────────────────────

    fn atomic_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let State::AtomicPopulations { layout, rows } = &mut self.state else {
            return Ok(Step::Reprocess);
        };
        let t = line.trim();

        if t.is_empty() || numeric::is_rule(t, '-') {
            return Ok(Step::Consumed);
        }

        if numeric::is_rule(t, '=') {
            if !rows.is_empty() {
                self.commit_atomic();
                self.leave(n);
            }
            return Ok(Step::Consumed);
        }

        let Some(layout) = *layout else {
            let header: Vec<&str> = t.split_whitespace().collect();
            let ion = header.iter().position(|&h| h == "Ion");
            let total_col = header.iter().position(|&h| h == "Total");
            let (Some(ion), Some(total_col)) = (ion, total_col) else {
                return Err(CastlogError::malformed(
                    ATOMIC_SECTION,
                    n,
                    "missing column header",
                ));
            };
            let spin = header.get(ion + 1) == Some(&"Spin");
            let orbitals = total_col.saturating_sub(ion + 1 + usize::from(spin));
            *layout = Some(AtomicLayout { orbitals, spin });
            return Ok(Step::Consumed);
        };

        let mut row = Row::new(ATOMIC_SECTION, n, t);
        if layout.spin {
            // 自旋极化表每个原子两行：up: 行带总量，dn: 行只有各分量
            if row.str_at(0)? == "dn:" {
                return Ok(Step::Consumed);
            }
            row.tokens.retain(|&tok| tok != "up:");
        }
        row.expect_len(layout.columns())?;

        let key = row.atom_key_at(0)?;
        for idx in 2..2 + layout.orbitals {
            row.f64_at(idx)?;
        }
        let total = row.f64_at(2 + layout.orbitals)?;
        let charge = row.f64_at(3 + layout.orbitals)?;
        let spin = if layout.spin {
            Some(row.f64_at(4 + layout.orbitals)?)
        } else {
            None
        };

        rows.push((key, AtomicPopulation { total, charge, spin }, n));
        Ok(Step::Consumed)
    }

    fn commit_atomic(&mut self) {
        if let State::AtomicPopulations { rows, .. } = &mut self.state {
            let rows = std::mem::take(rows);
            self.atomic_lines = rows.iter().map(|(k, _, l)| (k.clone(), *l)).collect();
            self.calc.atomic_populations = rows.into_iter().map(|(k, p, _)| (k, p)).collect();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // 晶格与坐标
    // ─────────────────────────────────────────────────────────────

    fn lattice_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let State::Lattice { rows, .. } = &mut self.state else {
            return Ok(Step::Reprocess);
        };

        // 实空间向量 [倒空间向量]
        let row = Row::new(LATTICE_SECTION, n, line);
        if row.len() != 3 && row.len() != 6 {
            return Err(CastlogError::malformed(
                LATTICE_SECTION,
                n,
                format!("expected 3 or 6 columns, found {}", row.len()),
            ));
        }
        rows.push(row.vec3_at(0)?);

        if rows.len() == 3 {
            self.calc.cell.lattice = Some(Lattice::from_vectors([rows[0], rows[1], rows[2]]));
            self.leave(n);
        }
        Ok(Step::Consumed)
    }

    fn coordinate_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let State::Coordinates { rows, .. } = &mut self.state else {
            return Ok(Step::Reprocess);
        };
        let t = line.trim();

        if numeric::is_rule(t, 'x') {
            if rows.is_empty() {
                return Err(CastlogError::malformed(
                    COORDINATES_SECTION,
                    n,
                    "coordinate box has no atom rows",
                ));
            }
            self.calc.cell.positions = std::mem::take(rows).into_iter().collect();
            self.leave(n);
            return Ok(Step::Consumed);
        }

        let Some(inner) = t.strip_prefix('x').and_then(|s| s.strip_suffix('x')) else {
            return Err(CastlogError::malformed(
                COORDINATES_SECTION,
                n,
                "coordinate box is not closed",
            ));
        };
        let inner = inner.trim();
        if inner.is_empty() || inner.starts_with('-') || !inner.contains(|c: char| c.is_ascii_digit())
        {
            return Ok(Step::Consumed);
        }

        // 物种 序号 u v w
        let row = Row::new(COORDINATES_SECTION, n, inner);
        row.expect_len(5)?;
        let key = row.atom_key_at(0)?;
        let frac = row.vec3_at(2)?;
        if rows.iter().any(|(k, _)| k == &key) {
            return Err(CastlogError::malformed(
                COORDINATES_SECTION,
                n,
                format!("duplicate atom {}", key),
            ));
        }
        rows.push((key, frac));
        Ok(Step::Consumed)
    }

    // ─────────────────────────────────────────────────────────────
    // 物种列表：质量 / 赝势
    // ─────────────────────────────────────────────────────────────

    fn species_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let (section, seen_rows) = match &mut self.state {
            State::Masses { seen_rows } => (MASSES_SECTION, seen_rows),
            State::Pseudopotentials { seen_rows } => (PSEUDO_SECTION, seen_rows),
            _ => return Ok(Step::Reprocess),
        };

        if line.trim().is_empty() {
            if *seen_rows {
                self.leave(n);
            }
            return Ok(Step::Consumed);
        }
        *seen_rows = true;

        let row = Row::new(section, n, line);
        row.expect_len(2)?;
        let species = row.str_at(0)?.to_string();

        if section == MASSES_SECTION {
            let mass = row.f64_at(1)?;
            self.calc.species_masses.insert(species, mass);
        } else {
            let pseudo = row.str_at(1)?.to_string();
            self.calc.pseudopotentials.insert(species, pseudo);
        }
        Ok(Step::Consumed)
    }

    // ─────────────────────────────────────────────────────────────
    // 计时
    // ─────────────────────────────────────────────────────────────

    fn timing_row(&mut self, n: usize, line: &str) -> Result<Step> {
        let Some(caps) = TIMING_LINE.captures(line) else {
            return Ok(Step::Reprocess);
        };

        let phase = caps[1].to_string();
        let raw = caps.get(2).map_or("", |m| m.as_str());
        let (seconds, _unit) = numeric::split_value_unit(raw)
            .ok_or_else(|| CastlogError::numeric(TIMINGS_SECTION, n, raw))?;

        let finished = phase == "Total";
        self.calc.timings.insert(phase, seconds);
        if finished {
            self.calc.finished = true;
            self.leave(n);
        }
        Ok(Step::Consumed)
    }

    // ─────────────────────────────────────────────────────────────
    // 输入结束
    // ─────────────────────────────────────────────────────────────

    fn finish(mut self, last_line: usize) -> Result<ParsedCalculation> {
        let unterminated = match &self.state {
            State::ScfTable { opened, .. } => Some((SCF_SECTION, *opened)),
            State::Forces {
                section, opened, ..
            } => Some((*section, *opened)),
            State::OrbitalPopulations { opened, .. } => Some((ORBITAL_SECTION, *opened)),
            State::Lattice { opened, .. } => Some((LATTICE_SECTION, *opened)),
            State::Coordinates { opened, .. } => Some((COORDINATES_SECTION, *opened)),
            _ => None,
        };
        if let Some((section, opened)) = unterminated {
            return Err(CastlogError::malformed(
                section,
                last_line,
                format!("input ends inside the section opened at line {}", opened),
            ));
        }

        // 开放式段落在输入结束时隐式关闭
        if matches!(self.state, State::AtomicPopulations { .. }) {
            self.commit_atomic();
        }

        let final_energy = self.final_energy.ok_or_else(|| CastlogError::MissingSection {
            section: FINAL_ENERGY_SECTION.to_string(),
        })?;
        self.calc.final_energy = final_energy;

        self.check_joins()?;
        Ok(self.calc)
    }

    /// 受力和布居表中的原子必须出现在坐标表中
    fn check_joins(&self) -> Result<()> {
        let cell = &self.calc.cell;
        if cell.positions.is_empty() {
            return Ok(());
        }

        let tables = [
            (self.force_section, &self.force_lines),
            (ORBITAL_SECTION, &self.orbital_lines),
            (ATOMIC_SECTION, &self.atomic_lines),
        ];
        for (section, lines) in tables {
            if let Some((key, line)) = lines.iter().find(|(k, _)| !cell.contains(k)) {
                return Err(CastlogError::malformed(
                    section,
                    *line,
                    format!("atom {} is not in the cell coordinates", key),
                ));
            }
        }
        Ok(())
    }
}

/// 取 `=` 后第一个字段作为数值
fn value_after_eq(section: &str, n: usize, line: &str) -> Result<f64> {
    let (_, rest) = line
        .split_once('=')
        .ok_or_else(|| CastlogError::malformed(section, n, "missing '='"))?;
    Row::new(section, n, rest).f64_at(0)
}

/// 参数名统一为小写、单空格
fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
