//! # 计算结果数据模型
//!
//! 存储从一个 CASTEP 输出日志中提取的全部信息。
//! `ParsedCalculation` 是纯数据值：每次解析构造一次，之后不再修改，
//! 不包含时间戳、计数器或文件路径等隐藏状态。
//!
//! ## 依赖关系
//! - 被 `parsers/castep_out.rs` 构造
//! - 被 `commands/` 和 `batch/` 使用
//! - 使用 `models/structure.rs`

use super::structure::{AtomKey, CellData, OrbitalKey};
use crate::parsers::numeric;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SCF 循环中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScfStep {
    /// 迭代序号，`Initial` 行为 0
    pub iteration: u32,

    /// 总能量 (eV)
    pub energy: f64,

    /// 费米能 (eV)，仅金属体系的 SCF 表含此列
    pub fermi_energy: Option<f64>,

    /// 每原子能量增益 (eV)，`Initial` 行没有
    pub energy_gain_per_atom: Option<f64>,

    /// 累计耗时 (s)
    pub elapsed_seconds: f64,
}

/// Mulliken 原子布居
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicPopulation {
    /// 总布居
    pub total: f64,
    /// 净电荷 (e)
    pub charge: f64,
    /// 自旋 (hbar/2)，仅自旋极化计算
    pub spin: Option<f64>,
}

/// 一次计算的解析结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCalculation {
    /// 最后一行 `Final energy` 的值 (eV)
    pub final_energy: f64,

    /// 最后一个 SCF 循环的迭代记录，按文件顺序
    pub scf_trace: Vec<ScfStep>,

    /// 出现过的 SCF 循环数（几何优化每个离子步一个）
    pub scf_cycles: usize,

    /// 最后一个受力段落 (eV/Å)
    pub forces: BTreeMap<AtomKey, [f64; 3]>,

    /// 轨道布居
    pub populations: BTreeMap<OrbitalKey, f64>,

    /// 轨道布居表下方打印的总电荷
    pub orbital_population_total: Option<f64>,

    /// Mulliken 原子布居
    pub atomic_populations: BTreeMap<AtomKey, AtomicPopulation>,

    /// 晶格与分数坐标
    pub cell: CellData,

    /// 各阶段耗时 (s)：Initialisation, Calculation, Finalisation, Total
    pub timings: BTreeMap<String, f64>,

    /// 运行参数等自由格式信息
    pub metadata: BTreeMap<String, String>,

    /// 物种质量 (AMU)
    pub species_masses: BTreeMap<String, f64>,

    /// 物种使用的赝势（文件名或 OTFG 字符串）
    pub pseudopotentials: BTreeMap<String, String>,

    pub final_free_energy: Option<f64>,
    pub zero_kelvin_energy: Option<f64>,
    pub basis_corrected_energy: Option<f64>,
    pub final_enthalpy: Option<f64>,

    /// 压力 (GPa)
    pub pressure_gpa: Option<f64>,

    pub castep_version: Option<String>,

    /// 是否出现 `Total time` 行
    pub finished: bool,
}

impl ParsedCalculation {
    /// 最后一次 SCF 迭代的能量
    pub fn last_scf_energy(&self) -> Option<f64> {
        self.scf_trace.last().map(|s| s.energy)
    }

    /// SCF 末能量与 Final energy 是否在容差内一致（两者打印精度不同，不要求完全相等）
    pub fn scf_matches_final(&self, tolerance: f64) -> bool {
        self.last_scf_energy()
            .map(|e| (e - self.final_energy).abs() <= tolerance)
            .unwrap_or(false)
    }

    /// 原子数：优先坐标表，其次 Cell Contents 中的离子数
    pub fn num_atoms(&self) -> Option<usize> {
        if self.cell.num_atoms() > 0 {
            return Some(self.cell.num_atoms());
        }
        self.metadata_value("total number of ions in cell")
            .map(|n| n as usize)
    }

    /// 每原子能量
    pub fn energy_per_atom(&self) -> Option<f64> {
        match self.num_atoms() {
            Some(n) if n > 0 => Some(self.final_energy / n as f64),
            _ => None,
        }
    }

    /// 每原子焓
    pub fn enthalpy_per_atom(&self) -> Option<f64> {
        match (self.final_enthalpy, self.num_atoms()) {
            (Some(h), Some(n)) if n > 0 => Some(h / n as f64),
            _ => None,
        }
    }

    /// 受力模长
    pub fn force_magnitude(&self, key: &AtomKey) -> Option<f64> {
        self.forces
            .get(key)
            .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt())
    }

    /// 最大受力原子及其模长
    pub fn max_force(&self) -> Option<(&AtomKey, f64)> {
        self.forces
            .keys()
            .filter_map(|k| self.force_magnitude(k).map(|m| (k, m)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// 所有轨道布居之和
    pub fn total_orbital_charge(&self) -> f64 {
        self.populations.values().sum()
    }

    /// 阶段耗时
    pub fn timing(&self, phase: &str) -> Option<f64> {
        self.timings.get(phase).copied()
    }

    /// 元数据值的前导数值（自动去掉单位），如 `"150.0000   eV"` -> 150.0
    pub fn metadata_value(&self, key: &str) -> Option<f64> {
        self.metadata
            .get(key)
            .and_then(|v| numeric::split_value_unit(v))
            .map(|(value, _)| value)
    }

    /// 平面波截断能 (eV)
    pub fn cut_off_energy(&self) -> Option<f64> {
        self.metadata_value("plane wave basis set cut-off")
    }

    /// 使用的 k 点数
    pub fn kpoints_used(&self) -> Option<usize> {
        self.metadata_value("number of kpoints used")
            .map(|n| n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step(iteration: u32, energy: f64) -> ScfStep {
        ScfStep {
            iteration,
            energy,
            fermi_energy: None,
            energy_gain_per_atom: None,
            elapsed_seconds: 1.0,
        }
    }

    #[test]
    fn test_scf_matches_final_within_tolerance() {
        let calc = ParsedCalculation {
            final_energy: -337.6781491429,
            scf_trace: vec![step(0, -293.47), step(1, -337.678149)],
            ..Default::default()
        };
        assert!(calc.scf_matches_final(1e-5));
        assert!(!calc.scf_matches_final(1e-9));
    }

    #[test]
    fn test_num_atoms_falls_back_to_metadata() {
        let mut calc = ParsedCalculation {
            final_energy: -20.0,
            ..Default::default()
        };
        assert_eq!(calc.num_atoms(), None);
        assert_eq!(calc.energy_per_atom(), None);

        calc.metadata
            .insert("total number of ions in cell".to_string(), "4".to_string());
        assert_eq!(calc.num_atoms(), Some(4));
        assert_relative_eq!(calc.energy_per_atom().unwrap(), -5.0);
    }

    #[test]
    fn test_max_force() {
        let mut calc = ParsedCalculation::default();
        calc.forces.insert(AtomKey::new("H:mu", 1), [0.3, 0.0, 0.4]);
        calc.forces.insert(AtomKey::new("Si", 1), [0.0, 0.1, 0.0]);

        let (key, mag) = calc.max_force().unwrap();
        assert_eq!(key, &AtomKey::new("H:mu", 1));
        assert_relative_eq!(mag, 0.5);
    }

    #[test]
    fn test_metadata_value_strips_unit() {
        let mut calc = ParsedCalculation::default();
        calc.metadata.insert(
            "plane wave basis set cut-off".to_string(),
            "150.0000   eV".to_string(),
        );
        calc.metadata
            .insert("using functional".to_string(), "Perdew Burke Ernzerhof".to_string());

        assert_relative_eq!(calc.cut_off_energy().unwrap(), 150.0);
        assert_eq!(calc.metadata_value("using functional"), None);
        assert_eq!(calc.kpoints_used(), None);
    }
}
