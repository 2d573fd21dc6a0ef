// ==========================================
// 矿石配矿堆料系统 - 混料累计量
// ==========================================
// 职责: 以干吨为权重的累计量（质量/品位/回收率/药剂/金属量）
// 红线: 堆的加权指标只从成员派生，不单独存储
// ==========================================

use crate::domain::lot::Lot;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// 浮点比较统一容差
pub const TOLERANCE: f64 = 1e-9;

// ==========================================
// BlendTotals - 加权累计量
// ==========================================
// 药剂按"已知药剂的干吨"加权，未知药剂的批次不参与药剂均值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlendTotals {
    pub lot_count: usize,
    pub dry_mass: f64,
    pub effective_mass: f64,
    pub grade_mass: f64,
    pub recovery_mass: f64,
    pub reagent_mass: f64,
    pub reagent_a_mass: f64,
    pub reagent_b_mass: f64,
    pub fine_content: f64,
    /// 药剂未知的批次数
    pub unknown_reagent_lots: usize,
}

impl BlendTotals {
    /// 单个批次的累计量
    pub fn of_lot(lot: &Lot) -> Self {
        let m = lot.dry_mass;
        let (reagent_mass, reagent_a_mass, reagent_b_mass, unknown) =
            match (lot.reagent_a, lot.reagent_b) {
                (Some(a), Some(b)) => (m, a * m, b * m, 0),
                _ => (0.0, 0.0, 0.0, 1),
            };
        Self {
            lot_count: 1,
            dry_mass: m,
            effective_mass: lot.effective_mass,
            grade_mass: lot.grade * m,
            recovery_mass: lot.recovery_pct * m,
            reagent_mass,
            reagent_a_mass,
            reagent_b_mass,
            fine_content: lot.fine_content,
            unknown_reagent_lots: unknown,
        }
    }

    pub fn from_lots<'a, I>(lots: I) -> Self
    where
        I: IntoIterator<Item = &'a Lot>,
    {
        lots.into_iter()
            .fold(Self::default(), |acc, lot| acc + Self::of_lot(lot))
    }

    fn weighted(&self, total: f64) -> Option<f64> {
        if self.dry_mass > 0.0 {
            Some(total / self.dry_mass)
        } else {
            None
        }
    }

    /// 加权品位
    pub fn grade(&self) -> Option<f64> {
        self.weighted(self.grade_mass)
    }

    /// 加权回收率
    pub fn recovery(&self) -> Option<f64> {
        self.weighted(self.recovery_mass)
    }

    pub fn reagent_a(&self) -> Option<f64> {
        if self.reagent_mass > 0.0 {
            Some(self.reagent_a_mass / self.reagent_mass)
        } else {
            None
        }
    }

    pub fn reagent_b(&self) -> Option<f64> {
        if self.reagent_mass > 0.0 {
            Some(self.reagent_b_mass / self.reagent_mass)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lot_count == 0
    }
}

impl Add for BlendTotals {
    type Output = BlendTotals;

    fn add(mut self, rhs: BlendTotals) -> BlendTotals {
        self += rhs;
        self
    }
}

impl AddAssign for BlendTotals {
    fn add_assign(&mut self, rhs: BlendTotals) {
        self.lot_count += rhs.lot_count;
        self.dry_mass += rhs.dry_mass;
        self.effective_mass += rhs.effective_mass;
        self.grade_mass += rhs.grade_mass;
        self.recovery_mass += rhs.recovery_mass;
        self.reagent_mass += rhs.reagent_mass;
        self.reagent_a_mass += rhs.reagent_a_mass;
        self.reagent_b_mass += rhs.reagent_b_mass;
        self.fine_content += rhs.fine_content;
        self.unknown_reagent_lots += rhs.unknown_reagent_lots;
    }
}

impl Sub for BlendTotals {
    type Output = BlendTotals;

    fn sub(mut self, rhs: BlendTotals) -> BlendTotals {
        self -= rhs;
        self
    }
}

impl SubAssign for BlendTotals {
    fn sub_assign(&mut self, rhs: BlendTotals) {
        self.lot_count = self.lot_count.saturating_sub(rhs.lot_count);
        self.dry_mass -= rhs.dry_mass;
        self.effective_mass -= rhs.effective_mass;
        self.grade_mass -= rhs.grade_mass;
        self.recovery_mass -= rhs.recovery_mass;
        self.reagent_mass -= rhs.reagent_mass;
        self.reagent_a_mass -= rhs.reagent_a_mass;
        self.reagent_b_mass -= rhs.reagent_b_mass;
        self.fine_content -= rhs.fine_content;
        self.unknown_reagent_lots = self.unknown_reagent_lots.saturating_sub(rhs.unknown_reagent_lots);
    }
}
