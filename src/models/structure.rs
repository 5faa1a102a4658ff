//! # 晶胞与原子标识数据模型
//!
//! 定义跨表格连接用的原子键 `AtomKey`（元素符号 + 1 起始序号），
//! 以及输出文件中 Unit Cell / Cell Contents 段落对应的晶格和分数坐标。
//!
//! `AtomKey` 与 `OrbitalKey` 序列化为字符串（如 `"Si 1"`, `"Si 1 Px"`），
//! 以便作为 JSON 对象的键。
//!
//! ## 依赖关系
//! - 被 `models/calculation.rs`, `parsers/castep_out.rs` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 原子键：元素符号（或 CASTEP 自定义物种标签，如 `H:mu`）+ 物种内序号
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomKey {
    pub species: String,
    pub index: usize,
}

impl AtomKey {
    pub fn new(species: impl Into<String>, index: usize) -> Self {
        AtomKey {
            species: species.into(),
            index,
        }
    }
}

impl fmt::Display for AtomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.species, self.index)
    }
}

impl FromStr for AtomKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (species, index) = s
            .trim()
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| format!("invalid atom key '{}'", s))?;
        let index = index
            .parse::<usize>()
            .map_err(|_| format!("invalid atom index in '{}'", s))?;
        Ok(AtomKey::new(species.trim(), index))
    }
}

impl Serialize for AtomKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AtomKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 轨道键：原子键 + 轨道标签（S, Px, Py, Pz, ...）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrbitalKey {
    pub atom: AtomKey,
    pub orbital: String,
}

impl OrbitalKey {
    pub fn new(atom: AtomKey, orbital: impl Into<String>) -> Self {
        OrbitalKey {
            atom,
            orbital: orbital.into(),
        }
    }
}

impl fmt::Display for OrbitalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.atom, self.orbital)
    }
}

impl FromStr for OrbitalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (atom, orbital) = s
            .trim()
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| format!("invalid orbital key '{}'", s))?;
        Ok(OrbitalKey::new(atom.parse()?, orbital))
    }
}

impl Serialize for OrbitalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OrbitalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 晶格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c，单位 Å
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)，角度单位：度
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(&a_vec);
        let b = norm(&b_vec);
        let c = norm(&c_vec);

        let alpha = (dot(&b_vec, &c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(&a_vec, &c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(&a_vec, &b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 晶格体积（行列式绝对值）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        (a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0]))
            .abs()
    }

    /// 分数坐标转笛卡尔坐标
    pub fn to_cartesian(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        let mut cart = [0.0; 3];
        for (i, c) in cart.iter_mut().enumerate() {
            *c = frac[0] * m[0][i] + frac[1] * m[1][i] + frac[2] * m[2][i];
        }
        cart
    }
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

/// 晶胞：晶格 + 分数坐标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    /// Real Lattice 段落给出的晶格，缺失时为 None
    pub lattice: Option<Lattice>,

    /// 分数坐标，按原子键索引
    pub positions: BTreeMap<AtomKey, [f64; 3]>,
}

impl CellData {
    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn contains(&self, key: &AtomKey) -> bool {
        self.positions.contains_key(key)
    }

    /// 化学式，如 `Si2`
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for key in self.positions.keys() {
            *counts.entry(key.species.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 笛卡尔坐标 (Å)，需要晶格
    pub fn cartesian_position(&self, key: &AtomKey) -> Option<[f64; 3]> {
        let lattice = self.lattice.as_ref()?;
        self.positions.get(key).map(|p| lattice.to_cartesian(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn si_fcc() -> Lattice {
        Lattice::from_vectors([[0.0, 2.715, 2.715], [2.715, 0.0, 2.715], [2.715, 2.715, 0.0]])
    }

    #[test]
    fn test_atom_key_display_and_parse() {
        let key = AtomKey::new("Si", 2);
        assert_eq!(key.to_string(), "Si 2");
        assert_eq!("Si 2".parse::<AtomKey>().unwrap(), key);

        let muon: AtomKey = "H:mu 1".parse().unwrap();
        assert_eq!(muon.species, "H:mu");
        assert_eq!(muon.index, 1);

        assert!("Si".parse::<AtomKey>().is_err());
        assert!("Si x".parse::<AtomKey>().is_err());
    }

    #[test]
    fn test_atom_key_ordering_groups_by_species() {
        let mut keys = vec![
            AtomKey::new("Si", 2),
            AtomKey::new("O", 1),
            AtomKey::new("Si", 1),
        ];
        keys.sort();
        assert_eq!(keys[0], AtomKey::new("O", 1));
        assert_eq!(keys[1], AtomKey::new("Si", 1));
    }

    #[test]
    fn test_orbital_key_as_json_map_key() {
        let mut map = BTreeMap::new();
        map.insert(OrbitalKey::new(AtomKey::new("Si", 1), "Px"), 0.893);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"Si 1 Px":0.893}"#);

        let back: BTreeMap<OrbitalKey, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_lattice_fcc_parameters() {
        let (a, b, c, alpha, beta, gamma) = si_fcc().parameters();
        assert_relative_eq!(a, 3.839590, epsilon = 1e-5);
        assert_relative_eq!(b, 3.839590, epsilon = 1e-5);
        assert_relative_eq!(c, 3.839590, epsilon = 1e-5);
        assert_relative_eq!(alpha, 60.0, epsilon = 1e-6);
        assert_relative_eq!(beta, 60.0, epsilon = 1e-6);
        assert_relative_eq!(gamma, 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lattice_fcc_volume() {
        assert_relative_eq!(si_fcc().volume(), 40.025752, epsilon = 1e-5);
    }

    #[test]
    fn test_cell_formula_and_cartesian() {
        let mut cell = CellData {
            lattice: Some(si_fcc()),
            ..Default::default()
        };
        cell.positions.insert(AtomKey::new("Si", 1), [0.0, 0.0, 0.0]);
        cell.positions.insert(AtomKey::new("Si", 2), [0.25, 0.25, 0.25]);

        assert_eq!(cell.formula(), "Si2");
        assert_eq!(cell.num_atoms(), 2);

        let p = cell.cartesian_position(&AtomKey::new("Si", 2)).unwrap();
        assert_relative_eq!(p[0], 1.3575, epsilon = 1e-9);
        assert_relative_eq!(p[1], 1.3575, epsilon = 1e-9);
        assert_relative_eq!(p[2], 1.3575, epsilon = 1e-9);
        assert!(cell.cartesian_position(&AtomKey::new("Si", 3)).is_none());
    }
}
