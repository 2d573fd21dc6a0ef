// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 批次构造、快速配置、临时数据库/文件、结果不变式校验
// ==========================================

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ore_blending_aps::config::SolverConfig;
use ore_blending_aps::domain::{BlendTotals, Lot, PileType, RawLotRecord, TOLERANCE};
use ore_blending_aps::engine::AllocationResult;
use ore_blending_aps::ViewKind;
use std::collections::HashSet;
use std::error::Error;
use std::io::Write;
use tempfile::{Builder, NamedTempFile};

/// 已准备批次（两种药剂均为 6 kg/t）
pub fn lot(code: &str, mass: f64, grade: f64, rec: f64) -> Lot {
    Lot {
        code: code.to_string(),
        zone: Some("Z1".to_string()),
        wet_mass: None,
        moisture_pct: None,
        dry_mass: mass,
        effective_mass: mass,
        grade_oz_tc: None,
        grade,
        fine_content: grade * mass,
        ag_grade_oz_tc: None,
        ag_grade: None,
        ag_fine_content: None,
        impurity_pct: None,
        reagent_a: Some(6.0),
        reagent_b: Some(6.0),
        recovery_pct: rec,
        loaded_at: None,
    }
}

/// 药剂未知的批次
pub fn lot_without_reagents(code: &str, mass: f64, grade: f64, rec: f64) -> Lot {
    Lot {
        reagent_a: None,
        reagent_b: None,
        ..lot(code, mass, grade, rec)
    }
}

/// 导入记录
pub fn raw(code: &str, zone: &str, tms: f64, grade: f64, rec: f64) -> RawLotRecord {
    RawLotRecord {
        code: Some(code.to_string()),
        zone: Some(zone.to_string()),
        dry_mass: Some(tms),
        grade: Some(grade),
        recovery_pct: Some(rec),
        reagent_a: Some(6.0),
        reagent_b: Some(6.0),
        ..RawLotRecord::default()
    }
}

pub fn load_time(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

/// 缩短随机搜索的配置（测试速度）
pub fn fast_config() -> SolverConfig {
    let mut cfg = SolverConfig::default();
    cfg.knobs.n_iters_hard = 40;
    cfg.knobs.n_iters_soft = 40;
    cfg.knobs.max_steps = 60;
    cfg
}

/// 确定性的混合批次池（品位 18~40，回收率 80~95，药剂 4.5~7.5）
pub fn mixed_pool(n: usize) -> Vec<RawLotRecord> {
    (0..n)
        .map(|i| {
            let k = i as f64;
            RawLotRecord {
                code: Some(format!("L{:03}", i)),
                zone: Some(if i % 3 == 0 { "Norte" } else { "Sur" }.to_string()),
                dry_mass: Some(20.0 + ((i * 7) % 26) as f64),
                grade: Some(18.0 + ((i * 11) % 23) as f64),
                recovery_pct: Some(80.0 + ((i * 5) % 16) as f64),
                reagent_a: Some(4.5 + (k * 0.37) % 3.0),
                reagent_b: Some(4.5 + (k * 0.53) % 3.0),
                ..RawLotRecord::default()
            }
        })
        .collect()
}

/// 创建临时数据库文件
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = Builder::new().suffix(".db").tempfile()?;
    let db_path = temp_file.path().to_string_lossy().to_string();
    Ok((temp_file, db_path))
}

/// 写出临时 CSV 文件
pub fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

/// 校验结果不变式
///
/// - 每个堆: 干吨在窗口内、加权回收率 ≥ 堆下限、品位在成堆所用品位带内
/// - 强制药剂成堆时: 两种药剂加权均值均在药剂带内且无未知药剂成员
/// - 同一视图内批次编号不重复
/// - 低回收率表与任一视图的已用批次不相交
pub fn assert_result_invariants(result: &AllocationResult, cfg: &SolverConfig) {
    for view in result.views() {
        let mut seen = HashSet::new();
        for pile in &view.piles {
            assert!(!pile.is_empty(), "{} 中出现空堆", view.kind);
            let totals = BlendTotals::from_lots(pile.lots());

            for lot in pile.lots() {
                assert!(seen.insert(lot.code.clone()), "{} 中批次重复: {}", view.kind, lot.code);
            }

            let rec = totals.recovery().unwrap();
            assert!(
                rec >= cfg.filters.pile_rec_min - 1e-6,
                "{} 堆 {} 回收率 {} 低于下限",
                view.kind,
                pile.pile_code,
                rec
            );

            let grade = totals.grade();
            let band = pile.basis.band;
            match pile.pile_type {
                PileType::Varios => {
                    let window = cfg.varios.window;
                    assert!(totals.dry_mass >= window.min - 1e-6);
                    assert!(totals.dry_mass <= window.max + 1e-6);
                    assert!(cfg.varios.grade_tries.contains(&band), "varios 品位带 {:?} 不在配置中", band);
                    assert!(
                        band.admits(grade, cfg.varios.edge),
                        "varios 品位 {:?} 不在成堆品位带 {:?} 内",
                        grade,
                        band
                    );
                }
                PileType::Batch => {
                    let window = cfg.batch.window;
                    let upper = if view.kind == ViewKind::Mixed {
                        window.max.max(cfg.varios.window.max)
                    } else {
                        window.max
                    };
                    assert!(totals.dry_mass >= window.min - 1e-6);
                    assert!(totals.dry_mass <= upper + 1e-6);
                    assert_eq!(band, cfg.batch.band);
                    assert!(band.admits(grade, cfg.batch.edge));
                }
            }

            if pile.basis.reagents_enforced {
                assert_eq!(totals.unknown_reagent_lots, 0, "{} 堆 {} 含未知药剂批次", view.kind, pile.pile_code);
                assert!(
                    cfg.reagents.admits(totals.reagent_a()) && cfg.reagents.admits(totals.reagent_b()),
                    "{} 堆 {} 药剂均值 ({:?}, {:?}) 超出药剂带",
                    view.kind,
                    pile.pile_code,
                    totals.reagent_a(),
                    totals.reagent_b()
                );
            }
        }
    }

    let used = result.used_codes();
    for row in &result.rejects {
        assert!(!used.contains(&row.code), "低回收率批次 {} 被堆使用", row.code);
        assert!(row.recovery_pct < cfg.reject_rec_ceiling + TOLERANCE);
    }
}
