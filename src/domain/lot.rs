// ==========================================
// 矿石配矿堆料系统 - 批次领域模型
// ==========================================
// 用途: 导入层产出 RawLotRecord，准备阶段派生为只读 Lot
// 红线: Lot 准备完成后不可修改
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 金品位单位换算: 1 oz/short ton = 34.2857 g/t
pub const GRAMS_PER_TON_PER_OZ_TC: f64 = 34.2857;

// ==========================================
// RawLotRecord - 导入中间结构体
// ==========================================
// 生命周期: 文件解析 → 字段映射 → 此结构 → Lot 准备
// 所有数值字段均可缺失，由准备阶段判定是否可用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLotRecord {
    pub code: Option<String>,
    pub zone: Option<String>,

    // ===== 质量 =====
    pub wet_mass: Option<f64>,     // 湿吨 (tmh)
    pub moisture_pct: Option<f64>, // 水分 (%)
    pub dry_mass: Option<f64>,     // 干吨 (tms)

    // ===== 金 =====
    pub grade_oz_tc: Option<f64>,  // 品位 oz/tc
    pub grade: Option<f64>,        // 品位 g/t
    pub fine_content: Option<f64>, // 金属量

    // ===== 银（仅报告）=====
    pub ag_grade_oz_tc: Option<f64>,
    pub ag_grade: Option<f64>,
    pub ag_fine_content: Option<f64>,

    // ===== 工艺 =====
    pub impurity_pct: Option<f64>, // 铜含量 (%)，仅报告
    pub reagent_a: Option<f64>,    // NaCN 消耗 (kg/t)
    pub reagent_b: Option<f64>,    // NaOH 消耗 (kg/t)
    pub recovery_pct: Option<f64>, // 回收率 (%)

    // ===== 元信息 =====
    pub loaded_at: Option<DateTime<Utc>>,
    pub row_number: usize,
}

// ==========================================
// Lot - 已准备的批次
// ==========================================
// 不变式: dry_mass > 0, effective_mass > 0, grade/recovery 有限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub code: String,
    pub zone: Option<String>,

    pub wet_mass: Option<f64>,
    pub moisture_pct: Option<f64>,
    pub dry_mass: f64,
    /// wet_mass > 0 时取 wet_mass，否则取 dry_mass；只用于报告，不参与容量计算
    pub effective_mass: f64,

    pub grade_oz_tc: Option<f64>,
    pub grade: f64,
    pub fine_content: f64,

    pub ag_grade_oz_tc: Option<f64>,
    pub ag_grade: Option<f64>,
    pub ag_fine_content: Option<f64>,

    pub impurity_pct: Option<f64>,
    /// 缺失表示"未知"，不是 0
    pub reagent_a: Option<f64>,
    pub reagent_b: Option<f64>,
    pub recovery_pct: f64,

    pub loaded_at: Option<DateTime<Utc>>,
}

impl Lot {
    /// 两种药剂消耗是否均已知
    pub fn has_reagents(&self) -> bool {
        self.reagent_a.is_some() && self.reagent_b.is_some()
    }

    /// 单位干吨金属量（用于裁剪时比较"低价值"批次）
    pub fn fine_density(&self) -> f64 {
        self.fine_content / self.dry_mass.max(1e-9)
    }

    /// 区域名规范化（去空白 + 大小写折叠）
    pub fn zone_key(&self) -> Option<String> {
        self.zone
            .as_deref()
            .map(|z| z.trim().to_lowercase())
            .filter(|z| !z.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lot() -> Lot {
        Lot {
            code: "L-001".to_string(),
            zone: Some("  Norte ".to_string()),
            wet_mass: None,
            moisture_pct: None,
            dry_mass: 50.0,
            effective_mass: 50.0,
            grade_oz_tc: None,
            grade: 20.0,
            fine_content: 1000.0,
            ag_grade_oz_tc: None,
            ag_grade: None,
            ag_fine_content: None,
            impurity_pct: None,
            reagent_a: Some(5.0),
            reagent_b: None,
            recovery_pct: 90.0,
            loaded_at: None,
        }
    }

    #[test]
    fn test_lot_helpers() {
        let lot = sample_lot();
        assert!(!lot.has_reagents());
        assert_eq!(lot.fine_density(), 20.0);
        assert_eq!(lot.zone_key().as_deref(), Some("norte"));
    }
}
