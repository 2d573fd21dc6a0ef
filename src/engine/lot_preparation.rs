// ==========================================
// 矿石配矿堆料系统 - 批次准备引擎
// ==========================================
// 职责: RawLotRecord → Lot（派生干吨/有效质量/金属量）+ 基础过滤 + 回收率分档
// 输入: 导入层记录 + 已解析配置
// 输出: PreparedPool（基础表 / 准入池 / 优先档 / 补料档）
// 红线: 单行数据不合法只做剔除，不报错
// ==========================================

use crate::config::SolverConfig;
use crate::domain::{Lot, RawLotRecord, GRAMS_PER_TON_PER_OZ_TC};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

// ==========================================
// PreparedPool - 准备结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedPool {
    /// 区域/质量过滤后的全部批次（不按回收率过滤，用于低回收率报告）
    pub base: Vec<Lot>,
    /// 回收率 ≥ 准入下限
    pub eligible: Vec<Lot>,
    /// 准入批次中回收率 ≥ 优先档下限
    pub primary: Vec<Lot>,
    /// 准入批次中低于优先档的部分（只用于补料）
    pub secondary: Vec<Lot>,
}

impl PreparedPool {
    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }
}

// ==========================================
// LotPreparer - 批次准备引擎
// ==========================================
pub struct LotPreparer {
    // 无状态引擎
}

impl LotPreparer {
    pub fn new() -> Self {
        Self {}
    }

    /// 完整准备流程
    ///
    /// 1) 只保留最新一次装载（loaded_at 最大）
    /// 2) 逐行派生并校验数值字段
    /// 3) 区域白名单、单批次最小干吨
    /// 4) 按编号去重（保留首次出现）
    /// 5) 按准入下限 / 优先档分池
    #[instrument(skip(self, raw, cfg), fields(raw_count = raw.len()))]
    pub fn prepare(&self, raw: &[RawLotRecord], cfg: &SolverConfig) -> PreparedPool {
        let latest = self.select_latest_load(raw);

        let zone_set: Option<HashSet<String>> = cfg.filters.zones.as_ref().map(|zones| {
            zones
                .iter()
                .map(|z| z.trim().to_lowercase())
                .filter(|z| !z.is_empty())
                .collect()
        });

        let mut seen = HashSet::new();
        let mut base = Vec::with_capacity(latest.len());
        let mut dropped = 0usize;

        for record in latest {
            let lot = match self.prepare_lot(record) {
                Some(lot) => lot,
                None => {
                    dropped += 1;
                    continue;
                }
            };

            if let Some(zones) = zone_set.as_ref().filter(|z| !z.is_empty()) {
                match lot.zone_key() {
                    Some(key) if zones.contains(&key) => {}
                    _ => continue,
                }
            }

            if cfg.filters.lot_mass_min > 0.0 && lot.dry_mass < cfg.filters.lot_mass_min {
                continue;
            }

            if !seen.insert(lot.code.clone()) {
                warn!(code = %lot.code, row = record.row_number, "批次编号重复，保留首次出现");
                continue;
            }

            base.push(lot);
        }

        let admission = cfg.admission_rec_min();
        let preferred = cfg.preferred_rec_min();

        let eligible: Vec<Lot> = base
            .iter()
            .filter(|l| l.recovery_pct >= admission)
            .cloned()
            .collect();
        let (primary, secondary): (Vec<Lot>, Vec<Lot>) = eligible
            .iter()
            .cloned()
            .partition(|l| l.recovery_pct >= preferred);

        debug!(dropped, "不完整批次已剔除");
        info!(
            base = base.len(),
            eligible = eligible.len(),
            primary = primary.len(),
            secondary = secondary.len(),
            admission_rec_min = admission,
            preferred_rec_min = preferred,
            "批次准备完成"
        );

        PreparedPool {
            base,
            eligible,
            primary,
            secondary,
        }
    }

    /// 最新装载选择: 只要有任一行带 loaded_at，就只保留时间戳最大的行
    pub fn select_latest_load<'a>(&self, raw: &'a [RawLotRecord]) -> Vec<&'a RawLotRecord> {
        match raw.iter().filter_map(|r| r.loaded_at).max() {
            Some(latest) => raw
                .iter()
                .filter(|r| r.loaded_at == Some(latest))
                .collect(),
            None => raw.iter().collect(),
        }
    }

    /// 单行派生
    ///
    /// 缺编号/品位/回收率、干吨或有效质量非正 → None
    pub fn prepare_lot(&self, raw: &RawLotRecord) -> Option<Lot> {
        let code = raw
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())?
            .to_string();

        let grade = finite(raw.grade)
            .or_else(|| finite(raw.grade_oz_tc).map(|oz| oz * GRAMS_PER_TON_PER_OZ_TC))?;
        let recovery_pct = finite(raw.recovery_pct)?;

        let wet_mass = finite(raw.wet_mass);
        let moisture_pct = finite(raw.moisture_pct);

        let dry_mass = match finite(raw.dry_mass) {
            Some(d) if d > 0.0 => d,
            _ => match (wet_mass, moisture_pct) {
                (Some(w), Some(m)) if w > 0.0 => w * (1.0 - m / 100.0),
                _ => return None,
            },
        };
        if dry_mass <= 0.0 {
            return None;
        }

        let effective_mass = match wet_mass {
            Some(w) if w > 0.0 => w,
            _ => dry_mass,
        };
        if effective_mass <= 0.0 {
            return None;
        }

        let ag_grade = finite(raw.ag_grade);

        Some(Lot {
            code,
            zone: raw.zone.clone(),
            wet_mass,
            moisture_pct,
            dry_mass,
            effective_mass,
            grade_oz_tc: finite(raw.grade_oz_tc),
            grade,
            fine_content: finite(raw.fine_content).unwrap_or(grade * dry_mass),
            ag_grade_oz_tc: finite(raw.ag_grade_oz_tc),
            ag_grade,
            ag_fine_content: finite(raw.ag_fine_content).or(ag_grade.map(|g| g * dry_mass)),
            impurity_pct: finite(raw.impurity_pct),
            reagent_a: finite(raw.reagent_a),
            reagent_b: finite(raw.reagent_b),
            recovery_pct,
            loaded_at: raw.loaded_at,
        })
    }
}

impl Default for LotPreparer {
    fn default() -> Self {
        Self::new()
    }
}

/// 提供给 batch 构建器的批次（单批次品位下限 > 0 时过滤）
pub fn batch_candidates(lots: &[Lot], cfg: &SolverConfig) -> Vec<Lot> {
    let floor = cfg.batch.lot_grade_min;
    lots.iter()
        .filter(|l| floor <= 0.0 || l.grade >= floor)
        .cloned()
        .collect()
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionFloor;
    use chrono::{TimeZone, Utc};

    fn raw(code: &str, dry: f64, grade: f64, rec: f64) -> RawLotRecord {
        RawLotRecord {
            code: Some(code.to_string()),
            zone: Some("Norte".to_string()),
            dry_mass: Some(dry),
            grade: Some(grade),
            recovery_pct: Some(rec),
            reagent_a: Some(6.0),
            reagent_b: Some(6.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_derives_dry_mass_from_moisture() {
        let preparer = LotPreparer::new();
        let mut r = raw("A", 0.0, 22.0, 90.0);
        r.dry_mass = None;
        r.wet_mass = Some(110.0);
        r.moisture_pct = Some(10.0);

        let lot = preparer.prepare_lot(&r).unwrap();
        assert!((lot.dry_mass - 99.0).abs() < 1e-9);
        assert_eq!(lot.effective_mass, 110.0);
        assert!((lot.fine_content - 22.0 * 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_grade_falls_back_to_oz_tc() {
        let preparer = LotPreparer::new();
        let mut r = raw("A", 50.0, 0.0, 90.0);
        r.grade = None;
        r.grade_oz_tc = Some(1.0);
        let lot = preparer.prepare_lot(&r).unwrap();
        assert!((lot.grade - GRAMS_PER_TON_PER_OZ_TC).abs() < 1e-9);
    }

    #[test]
    fn test_incomplete_rows_are_dropped() {
        let preparer = LotPreparer::new();
        let mut no_rec = raw("A", 50.0, 22.0, 90.0);
        no_rec.recovery_pct = None;
        let mut blank_code = raw(" ", 50.0, 22.0, 90.0);
        blank_code.code = Some("  ".to_string());
        let no_mass = raw("C", -1.0, 22.0, 90.0);

        assert!(preparer.prepare_lot(&no_rec).is_none());
        assert!(preparer.prepare_lot(&blank_code).is_none());
        assert!(preparer.prepare_lot(&no_mass).is_none());
    }

    #[test]
    fn test_latest_load_and_dedupe() {
        let preparer = LotPreparer::new();
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut a_old = raw("A", 50.0, 22.0, 90.0);
        a_old.loaded_at = Some(old);
        let mut a_new = raw("A", 60.0, 22.0, 90.0);
        a_new.loaded_at = Some(new);
        let mut a_dup = raw("A", 70.0, 22.0, 90.0);
        a_dup.loaded_at = Some(new);
        let mut b_new = raw("B", 40.0, 22.0, 90.0);
        b_new.loaded_at = Some(new);

        let pool = preparer.prepare(&[a_old, a_new, a_dup, b_new], &SolverConfig::default());
        assert_eq!(pool.base.len(), 2);
        assert_eq!(pool.base[0].dry_mass, 60.0);
        assert_eq!(pool.base[1].code, "B");
    }

    #[test]
    fn test_zone_filter_is_case_insensitive() {
        let preparer = LotPreparer::new();
        let mut cfg = SolverConfig::default();
        cfg.filters.zones = Some(vec![" norte ".to_string()]);

        let mut other = raw("B", 50.0, 22.0, 90.0);
        other.zone = Some("Sur".to_string());
        let pool = preparer.prepare(&[raw("A", 50.0, 22.0, 90.0), other], &cfg);
        assert_eq!(pool.base.len(), 1);
        assert_eq!(pool.base[0].code, "A");
    }

    #[test]
    fn test_recovery_tiers_and_admission_floor() {
        let preparer = LotPreparer::new();
        let mut cfg = SolverConfig::default();
        cfg.filters.lot_rec_min = 80.0;
        cfg.filters.pile_rec_min = 88.0;

        let rows = [
            raw("A", 50.0, 22.0, 92.0),
            raw("B", 50.0, 22.0, 84.0),
            raw("C", 50.0, 22.0, 60.0),
        ];

        let pool = preparer.prepare(&rows, &cfg);
        assert_eq!(pool.base.len(), 3);
        assert_eq!(pool.eligible.len(), 2);
        assert_eq!(pool.primary.len(), 1);
        assert_eq!(pool.secondary[0].code, "B");

        cfg.filters.admission_floor = AdmissionFloor::MinOfLotAndPile;
        cfg.filters.lot_rec_min = 90.0;
        let pool = preparer.prepare(&rows, &cfg);
        // min(90, 88) = 88
        assert_eq!(pool.eligible.len(), 1);
    }

    #[test]
    fn test_lot_mass_min_and_batch_grade_floor() {
        let preparer = LotPreparer::new();
        let mut cfg = SolverConfig::default();
        cfg.filters.lot_mass_min = 45.0;
        cfg.batch.lot_grade_min = 30.0;

        let rows = [
            raw("A", 50.0, 35.0, 90.0),
            raw("B", 40.0, 35.0, 90.0),
            raw("C", 50.0, 22.0, 90.0),
        ];
        let pool = preparer.prepare(&rows, &cfg);
        assert_eq!(pool.eligible.len(), 2);
        let batch = batch_candidates(&pool.eligible, &cfg);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].code, "A");
    }
}
