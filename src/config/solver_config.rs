// ==========================================
// 矿石配矿堆料系统 - 求解配置
// ==========================================
// 职责: 已解析的结构化配置（质量窗口/品位带/药剂带/搜索参数/种子）
// 红线: 引擎只消费已校验的 SolverConfig，不再做覆写合并
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::domain::blend::TOLERANCE;
use serde::{Deserialize, Serialize};

/// 缺失值在距离计算中的占位距离
const MISSING_DISTANCE: f64 = 1e9;
/// 品位缺失时的惩罚
const MISSING_GRADE_PENALTY: f64 = 1e6;
/// 开区间边界上的额外惩罚
const EDGE_EPSILON: f64 = 1e-6;

// ==========================================
// MassWindow - 质量窗口（干吨）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassWindow {
    pub min: f64,
    pub target: f64,
    pub max: f64,
}

impl MassWindow {
    /// 构造时把 target 夹紧到 [min, max]
    pub fn new(min: f64, target: f64, max: f64) -> Self {
        let min = min.min(max);
        Self {
            min,
            target: target.max(min).min(max),
            max,
        }
    }

    pub fn contains(&self, mass: f64) -> bool {
        mass >= self.min - TOLERANCE && mass <= self.max + TOLERANCE
    }

    /// 低于下限的缺口
    pub fn deficit(&self, mass: f64) -> f64 {
        (self.min - mass).max(0.0)
    }

    /// 超出上限的部分
    pub fn excess(&self, mass: f64) -> f64 {
        (mass - self.max).max(0.0)
    }

    /// 与目标的绝对距离
    pub fn target_gap(&self, mass: f64) -> f64 {
        (mass - self.target).abs()
    }

    /// 实际追求的目标（不超过上限）
    pub fn effective_target(&self) -> f64 {
        self.target.min(self.max)
    }
}

// ==========================================
// GradeBand / GradeEdgePolicy - 品位带与边界策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeEdgePolicy {
    pub lower_exclusive: bool,
    pub upper_inclusive: bool,
}

impl Default for GradeEdgePolicy {
    /// (min, max]
    fn default() -> Self {
        Self {
            lower_exclusive: true,
            upper_inclusive: true,
        }
    }
}

impl GradeBand {
    pub fn new(min: f64, max: f64) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// 品位是否落在带内（按边界策略）
    pub fn admits(&self, grade: Option<f64>, edge: GradeEdgePolicy) -> bool {
        let g = match grade {
            Some(g) if g.is_finite() => g,
            _ => return false,
        };

        let lower_ok = if edge.lower_exclusive {
            g > self.min + TOLERANCE
        } else {
            g >= self.min - TOLERANCE
        };
        if !lower_ok {
            return false;
        }

        if edge.upper_inclusive {
            g <= self.max + TOLERANCE
        } else {
            g < self.max - TOLERANCE
        }
    }

    /// 品位越界惩罚（带内为 0，开区间边界上给一个极小正值）
    pub fn edge_penalty(&self, grade: Option<f64>, edge: GradeEdgePolicy) -> f64 {
        let g = match grade {
            Some(g) if g.is_finite() => g,
            _ => return MISSING_GRADE_PENALTY,
        };

        let mut pen = 0.0;
        if edge.lower_exclusive {
            if g <= self.min + TOLERANCE {
                pen = (self.min - g) + EDGE_EPSILON;
            }
        } else if g < self.min - TOLERANCE {
            pen = self.min - g;
        }

        if edge.upper_inclusive {
            if g > self.max + TOLERANCE {
                pen = f64::max(pen, g - self.max);
            }
        } else if g >= self.max - TOLERANCE {
            pen = f64::max(pen, (g - self.max) + EDGE_EPSILON);
        }

        pen
    }
}

// ==========================================
// ReagentBand - 药剂消耗带（两种药剂共用）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReagentBand {
    pub lo: f64,
    pub hi: f64,
}

impl ReagentBand {
    pub fn admits(&self, value: Option<f64>) -> bool {
        match value {
            Some(x) if x.is_finite() => x >= self.lo - TOLERANCE && x <= self.hi + TOLERANCE,
            _ => false,
        }
    }

    /// 到带的距离，缺失值视为极远
    pub fn distance(&self, value: Option<f64>) -> f64 {
        match value {
            Some(x) if x.is_finite() => {
                if x < self.lo {
                    self.lo - x
                } else if x > self.hi {
                    x - self.hi
                } else {
                    0.0
                }
            }
            _ => MISSING_DISTANCE,
        }
    }
}

// ==========================================
// AdmissionFloor - 批次准入回收率口径
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionFloor {
    /// rec ≥ lot_rec_min
    LotOnly,
    /// rec ≥ min(lot_rec_min, pile_rec_min)
    MinOfLotAndPile,
}

impl Default for AdmissionFloor {
    fn default() -> Self {
        AdmissionFloor::LotOnly
    }
}

// ==========================================
// 分组配置
// ==========================================

/// 批次过滤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotFilterConfig {
    pub lot_rec_min: f64,
    pub pile_rec_min: f64,
    /// 优先回收率档；为空时取 pile_rec_min
    pub preferred_lot_rec_min: Option<f64>,
    /// 单批次最小干吨（0 = 不过滤）
    pub lot_mass_min: f64,
    /// 区域白名单（为空 = 全部区域）
    pub zones: Option<Vec<String>>,
    pub admission_floor: AdmissionFloor,
}

impl Default for LotFilterConfig {
    fn default() -> Self {
        Self {
            lot_rec_min: 85.0,
            pile_rec_min: 85.0,
            preferred_lot_rec_min: None,
            lot_mass_min: 0.0,
            zones: None,
            admission_floor: AdmissionFloor::LotOnly,
        }
    }
}

/// varios 堆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariosConfig {
    pub window: MassWindow,
    /// 按顺序尝试的品位带
    pub grade_tries: Vec<GradeBand>,
    pub edge: GradeEdgePolicy,
}

impl Default for VariosConfig {
    fn default() -> Self {
        Self {
            window: MassWindow::new(250.0, 550.0, 550.0),
            grade_tries: vec![
                GradeBand::new(20.0, 24.0),
                GradeBand::new(19.5, 24.0),
                GradeBand::new(19.0, 24.0),
            ],
            edge: GradeEdgePolicy::default(),
        }
    }
}

/// batch 堆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub window: MassWindow,
    pub band: GradeBand,
    pub edge: GradeEdgePolicy,
    /// 单批次品位下限（0 = 不过滤）
    pub lot_grade_min: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: MassWindow::new(80.0, 120.0, 120.0),
            band: GradeBand::new(30.0, 1e9),
            edge: GradeEdgePolicy::default(),
            lot_grade_min: 0.0,
        }
    }
}

/// 随机贪心搜索参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchKnobs {
    pub n_iters_hard: usize,
    pub n_iters_soft: usize,
    pub max_steps: usize,
    pub cand_sample: usize,
    pub reseeds: usize,
    pub pair_topk: usize,
    pub pair_pool: usize,
    /// 放宽药剂阶段的种子偏移
    pub relaxed_seed_offset: u64,
    /// 单个 batch 堆失败后换种子重试次数
    pub seed_retries: usize,
}

impl Default for SearchKnobs {
    fn default() -> Self {
        Self {
            n_iters_hard: 900,
            n_iters_soft: 1400,
            max_steps: 600,
            cand_sample: 70,
            reseeds: 2,
            pair_topk: 10,
            pair_pool: 16,
            relaxed_seed_offset: 1000,
            seed_retries: 3,
        }
    }
}

/// 随机种子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seeds {
    pub batch_base: u64,
    pub mix_batch: u64,
}

impl Default for Seeds {
    fn default() -> Self {
        Self {
            batch_base: 100,
            mix_batch: 888,
        }
    }
}

// ==========================================
// SolverConfig - 求解配置（已解析）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub filters: LotFilterConfig,
    pub varios: VariosConfig,
    pub batch: BatchConfig,
    pub reagents: ReagentBand,
    pub knobs: SearchKnobs,
    pub seeds: Seeds,
    /// 混合视图中单个大 batch 需吸收的剩余质量比例
    pub mixed_absorb_ratio: f64,
    /// 低回收率报告上限
    pub reject_rec_ceiling: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            filters: LotFilterConfig::default(),
            varios: VariosConfig::default(),
            batch: BatchConfig::default(),
            reagents: ReagentBand { lo: 4.0, hi: 8.0 },
            knobs: SearchKnobs::default(),
            seeds: Seeds::default(),
            mixed_absorb_ratio: 0.98,
            reject_rec_ceiling: 85.0,
        }
    }
}

impl SolverConfig {
    /// 准入回收率下限（按口径）
    pub fn admission_rec_min(&self) -> f64 {
        match self.filters.admission_floor {
            AdmissionFloor::LotOnly => self.filters.lot_rec_min,
            AdmissionFloor::MinOfLotAndPile => {
                self.filters.lot_rec_min.min(self.filters.pile_rec_min)
            }
        }
    }

    /// 优先档回收率下限（不低于准入下限）
    pub fn preferred_rec_min(&self) -> f64 {
        self.filters
            .preferred_lot_rec_min
            .unwrap_or(self.filters.pile_rec_min)
            .max(self.admission_rec_min())
    }

    /// 一致性校验
    ///
    /// 经 ConfigResolver 解析的配置总能通过；手工构造的配置在进入引擎前调用
    pub fn validate(&self) -> ConfigResult<()> {
        check_window("varios.window", &self.varios.window)?;
        check_window("batch.window", &self.batch.window)?;

        if self.varios.grade_tries.is_empty() {
            return Err(inconsistent("varios.grade_tries", "品位带列表不能为空"));
        }
        for band in self.varios.grade_tries.iter().chain(std::iter::once(&self.batch.band)) {
            if !(band.min.is_finite() && band.max.is_finite()) || band.min > band.max {
                return Err(inconsistent(
                    "grade_band",
                    format!("品位带无效: ({}, {})", band.min, band.max),
                ));
            }
        }

        if !(self.reagents.lo.is_finite() && self.reagents.hi.is_finite())
            || self.reagents.lo > self.reagents.hi
        {
            return Err(inconsistent(
                "reagents",
                format!("药剂带无效: [{}, {}]", self.reagents.lo, self.reagents.hi),
            ));
        }

        for (field, value) in [
            ("filters.lot_rec_min", self.filters.lot_rec_min),
            ("filters.pile_rec_min", self.filters.pile_rec_min),
            ("filters.lot_mass_min", self.filters.lot_mass_min),
            ("reject_rec_ceiling", self.reject_rec_ceiling),
        ] {
            if !value.is_finite() {
                return Err(inconsistent(field, format!("非有限数值: {}", value)));
            }
        }

        if !(self.mixed_absorb_ratio > 0.0 && self.mixed_absorb_ratio <= 1.0) {
            return Err(inconsistent(
                "mixed_absorb_ratio",
                format!("比例需在 (0, 1]: {}", self.mixed_absorb_ratio),
            ));
        }

        let k = &self.knobs;
        for (field, value) in [
            ("knobs.n_iters_hard", k.n_iters_hard),
            ("knobs.n_iters_soft", k.n_iters_soft),
            ("knobs.max_steps", k.max_steps),
            ("knobs.cand_sample", k.cand_sample),
        ] {
            if value == 0 {
                return Err(inconsistent(field, "搜索参数必须 ≥ 1"));
            }
        }

        Ok(())
    }
}

fn check_window(field: &str, w: &MassWindow) -> ConfigResult<()> {
    let finite = w.min.is_finite() && w.target.is_finite() && w.max.is_finite();
    if !finite || w.min < 0.0 || w.min > w.max || w.target < w.min || w.target > w.max {
        return Err(inconsistent(
            field,
            format!("质量窗口无效: min={}, target={}, max={}", w.min, w.target, w.max),
        ));
    }
    Ok(())
}

fn inconsistent(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Inconsistent {
        field: field.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = SolverConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.admission_rec_min(), 85.0);
        assert_eq!(cfg.preferred_rec_min(), 85.0);
    }

    #[test]
    fn test_mass_window_clamps_target() {
        let w = MassWindow::new(80.0, 200.0, 120.0);
        assert_eq!(w.target, 120.0);
        assert!(w.contains(80.0));
        assert!(w.contains(120.0 + 1e-12));
        assert!(!w.contains(79.0));
        assert_eq!(w.deficit(70.0), 10.0);
        assert_eq!(w.excess(130.0), 10.0);
    }

    #[test]
    fn test_grade_band_edge_policy() {
        let band = GradeBand::new(20.0, 24.0);
        let open_closed = GradeEdgePolicy::default();
        let closed = GradeEdgePolicy {
            lower_exclusive: false,
            upper_inclusive: true,
        };

        assert!(!band.admits(Some(20.0), open_closed));
        assert!(band.admits(Some(20.0), closed));
        assert!(band.admits(Some(24.0), open_closed));
        assert!(!band.admits(Some(24.01), open_closed));
        assert!(!band.admits(None, closed));

        assert!(band.edge_penalty(Some(20.0), open_closed) > 0.0);
        assert_eq!(band.edge_penalty(Some(20.0), closed), 0.0);
        assert!((band.edge_penalty(Some(25.0), closed) - 1.0).abs() < 1e-12);
        assert_eq!(band.edge_penalty(None, closed), 1e6);
    }

    #[test]
    fn test_reagent_band() {
        let band = ReagentBand { lo: 4.0, hi: 8.0 };
        assert!(band.admits(Some(4.0)));
        assert!(!band.admits(Some(8.5)));
        assert!(!band.admits(None));
        assert_eq!(band.distance(Some(9.0)), 1.0);
        assert_eq!(band.distance(Some(6.0)), 0.0);
        assert_eq!(band.distance(None), 1e9);
    }

    #[test]
    fn test_admission_floor_policy() {
        let mut cfg = SolverConfig::default();
        cfg.filters.lot_rec_min = 90.0;
        cfg.filters.pile_rec_min = 85.0;
        assert_eq!(cfg.admission_rec_min(), 90.0);

        cfg.filters.admission_floor = AdmissionFloor::MinOfLotAndPile;
        assert_eq!(cfg.admission_rec_min(), 85.0);
        // 优先档不会低于准入下限
        assert_eq!(cfg.preferred_rec_min(), 85.0);
    }

    #[test]
    fn test_validate_rejects_inconsistent_config() {
        let mut cfg = SolverConfig::default();
        cfg.varios.grade_tries.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = SolverConfig::default();
        cfg.batch.window = MassWindow {
            min: 130.0,
            target: 120.0,
            max: 120.0,
        };
        assert!(cfg.validate().is_err());

        let mut cfg = SolverConfig::default();
        cfg.knobs.max_steps = 0;
        assert!(cfg.validate().is_err());
    }
}
