// ==========================================
// 矿石配矿堆料系统 - 堆领域模型
// ==========================================
// 职责: Pile（成员 + 类型 + 编号）、汇总、结果表行
// 红线: 同一堆内、同一视图内批次编号不重复
// ==========================================

use crate::config::GradeBand;
use crate::domain::blend::BlendTotals;
use crate::domain::lot::Lot;
use crate::domain::types::{PileType, RecoveryBand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 成堆依据: 堆满足的品位带，以及是否同时满足药剂带
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PileBasis {
    pub band: GradeBand,
    pub reagents_enforced: bool,
}

impl PileBasis {
    pub fn new(band: GradeBand, reagents_enforced: bool) -> Self {
        Self {
            band,
            reagents_enforced,
        }
    }
}

// ==========================================
// Pile - 已接受的堆
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct Pile {
    pub pile_type: PileType,
    pub pile_code: u32,
    pub basis: PileBasis,
    lots: Vec<Lot>,
}

impl Pile {
    pub fn new(pile_type: PileType, pile_code: u32, basis: PileBasis, lots: Vec<Lot>) -> Self {
        Self {
            pile_type,
            pile_code,
            basis,
            lots,
        }
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn totals(&self) -> BlendTotals {
        BlendTotals::from_lots(&self.lots)
    }

    pub fn codes(&self) -> HashSet<String> {
        self.lots.iter().map(|l| l.code.clone()).collect()
    }

    pub fn summary(&self) -> PileSummary {
        PileSummary::new(self.pile_type, self.pile_code, &self.totals())
    }

    /// 展开为结果表行（保持成员顺序）
    pub fn to_rows(&self) -> Vec<PileRow> {
        self.lots
            .iter()
            .map(|lot| PileRow::from_lot(lot, self.pile_type, self.pile_code))
            .collect()
    }
}

// ==========================================
// PileSummary - 堆汇总（日志/报告用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileSummary {
    pub pile_type: PileType,
    pub pile_code: u32,
    pub lot_count: usize,
    pub dry_mass: f64,
    pub effective_mass: f64,
    pub grade: Option<f64>,
    pub recovery_pct: Option<f64>,
    pub reagent_a: Option<f64>,
    pub reagent_b: Option<f64>,
    pub fine_content: f64,
}

impl PileSummary {
    pub fn new(pile_type: PileType, pile_code: u32, totals: &BlendTotals) -> Self {
        Self {
            pile_type,
            pile_code,
            lot_count: totals.lot_count,
            dry_mass: totals.dry_mass,
            effective_mass: totals.effective_mass,
            grade: totals.grade(),
            recovery_pct: totals.recovery(),
            reagent_a: totals.reagent_a(),
            reagent_b: totals.reagent_b(),
            fine_content: totals.fine_content,
        }
    }
}

// ==========================================
// PileRow - 结果表行 (res_pile_1/2/3)
// ==========================================
// 列名与下游结果表保持一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileRow {
    pub pile_code: u32,
    pub pile_type: PileType,
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "zona")]
    pub zone: Option<String>,
    #[serde(rename = "tmh")]
    pub wet_mass: Option<f64>,
    #[serde(rename = "humedad_pct")]
    pub moisture_pct: Option<f64>,
    #[serde(rename = "tms")]
    pub dry_mass: f64,
    #[serde(rename = "au_oz_tc")]
    pub grade_oz_tc: Option<f64>,
    #[serde(rename = "au_gr_ton")]
    pub grade: f64,
    #[serde(rename = "au_fino")]
    pub fine_content: f64,
    #[serde(rename = "ag_oz_tc")]
    pub ag_grade_oz_tc: Option<f64>,
    #[serde(rename = "ag_gr_ton")]
    pub ag_grade: Option<f64>,
    #[serde(rename = "ag_fino")]
    pub ag_fine_content: Option<f64>,
    #[serde(rename = "cu_pct")]
    pub impurity_pct: Option<f64>,
    #[serde(rename = "nacn_kg_t")]
    pub reagent_a: Option<f64>,
    #[serde(rename = "naoh_kg_t")]
    pub reagent_b: Option<f64>,
    #[serde(rename = "rec_pct")]
    pub recovery_pct: f64,
}

impl PileRow {
    /// 列顺序（空表也必须输出表头）
    pub const COLUMNS: [&'static str; 17] = [
        "pile_code", "pile_type", "codigo", "zona", "tmh", "humedad_pct", "tms", "au_oz_tc",
        "au_gr_ton", "au_fino", "ag_oz_tc", "ag_gr_ton", "ag_fino", "cu_pct", "nacn_kg_t",
        "naoh_kg_t", "rec_pct",
    ];

    pub fn from_lot(lot: &Lot, pile_type: PileType, pile_code: u32) -> Self {
        Self {
            pile_code,
            pile_type,
            code: lot.code.clone(),
            zone: lot.zone.clone(),
            wet_mass: lot.wet_mass,
            moisture_pct: lot.moisture_pct,
            dry_mass: lot.dry_mass,
            grade_oz_tc: lot.grade_oz_tc,
            grade: lot.grade,
            fine_content: lot.fine_content,
            ag_grade_oz_tc: lot.ag_grade_oz_tc,
            ag_grade: lot.ag_grade,
            ag_fine_content: lot.ag_fine_content,
            impurity_pct: lot.impurity_pct,
            reagent_a: lot.reagent_a,
            reagent_b: lot.reagent_b,
            recovery_pct: lot.recovery_pct,
        }
    }
}

// ==========================================
// RejectRow - 低回收率未使用批次 (stg_lots_daily_rec)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectRow {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "zona")]
    pub zone: Option<String>,
    #[serde(rename = "tmh")]
    pub wet_mass: Option<f64>,
    #[serde(rename = "humedad_pct")]
    pub moisture_pct: Option<f64>,
    #[serde(rename = "tms")]
    pub dry_mass: f64,
    #[serde(rename = "au_oz_tc")]
    pub grade_oz_tc: Option<f64>,
    #[serde(rename = "au_gr_ton")]
    pub grade: f64,
    #[serde(rename = "au_fino")]
    pub fine_content: f64,
    #[serde(rename = "ag_oz_tc")]
    pub ag_grade_oz_tc: Option<f64>,
    #[serde(rename = "ag_gr_ton")]
    pub ag_grade: Option<f64>,
    #[serde(rename = "ag_fino")]
    pub ag_fine_content: Option<f64>,
    #[serde(rename = "cu_pct")]
    pub impurity_pct: Option<f64>,
    #[serde(rename = "nacn_kg_t")]
    pub reagent_a: Option<f64>,
    #[serde(rename = "naoh_kg_t")]
    pub reagent_b: Option<f64>,
    #[serde(rename = "rec_pct")]
    pub recovery_pct: f64,
    #[serde(rename = "rec_class")]
    pub recovery_band: RecoveryBand,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl RejectRow {
    pub const COLUMNS: [&'static str; 17] = [
        "codigo", "zona", "tmh", "humedad_pct", "tms", "au_oz_tc", "au_gr_ton", "au_fino",
        "ag_oz_tc", "ag_gr_ton", "ag_fino", "cu_pct", "nacn_kg_t", "naoh_kg_t", "rec_pct",
        "rec_class", "loaded_at",
    ];

    pub fn from_lot(lot: &Lot, recovery_band: RecoveryBand) -> Self {
        Self {
            code: lot.code.clone(),
            zone: lot.zone.clone(),
            wet_mass: lot.wet_mass,
            moisture_pct: lot.moisture_pct,
            dry_mass: lot.dry_mass,
            grade_oz_tc: lot.grade_oz_tc,
            grade: lot.grade,
            fine_content: lot.fine_content,
            ag_grade_oz_tc: lot.ag_grade_oz_tc,
            ag_grade: lot.ag_grade,
            ag_fine_content: lot.ag_fine_content,
            impurity_pct: lot.impurity_pct,
            reagent_a: lot.reagent_a,
            reagent_b: lot.reagent_b,
            recovery_pct: lot.recovery_pct,
            recovery_band,
            loaded_at: lot.loaded_at,
        }
    }
}
