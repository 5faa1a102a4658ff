//! # 数据模型模块
//!
//! 定义解析结果和晶胞数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/` 和 `commands/` 使用
//! - 子模块: structure, calculation

pub mod calculation;
pub mod structure;

pub use calculation::{AtomicPopulation, ParsedCalculation, ScfStep};
pub use structure::{AtomKey, CellData, Lattice, OrbitalKey};
