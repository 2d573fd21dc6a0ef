// ==========================================
// TopUpExtender 集成测试
// ==========================================
// 测试目标: 次级档补料只加不减，每次加入后仍满足全部硬约束
// ==========================================

mod test_helpers;

use ore_blending_aps::config::{GradeBand, SolverConfig};
use ore_blending_aps::domain::BlendTotals;
use ore_blending_aps::engine::{PileConstraints, TopUpExtender};
use test_helpers::{lot, lot_without_reagents};

fn varios(cfg: &SolverConfig, enforce: bool) -> PileConstraints {
    PileConstraints::for_varios(cfg, GradeBand::new(20.0, 24.0), enforce)
}

#[test]
fn test_fills_toward_target_within_capacity() {
    let cfg = SolverConfig::default();
    let members: Vec<_> = (0..3).map(|i| lot(&format!("M{}", i), 100.0, 22.0, 90.0)).collect();
    let secondary: Vec<_> = (0..5).map(|i| lot(&format!("S{}", i), 60.0, 22.0, 86.0)).collect();

    let added = TopUpExtender::new().extend(&members, &secondary, &varios(&cfg, true));

    // 300 + 4 × 60 = 540，第 5 个会超过 550
    assert_eq!(added.len(), 4);
    let all: Vec<_> = members.iter().chain(added.iter()).cloned().collect();
    let totals = BlendTotals::from_lots(&all);
    assert!(varios(&cfg, true).is_satisfied(&totals));
}

#[test]
fn test_skips_used_codes_and_unknown_reagents() {
    let cfg = SolverConfig::default();
    let members: Vec<_> = (0..3).map(|i| lot(&format!("M{}", i), 100.0, 22.0, 90.0)).collect();
    let secondary = vec![
        lot("M0", 50.0, 22.0, 90.0),
        lot_without_reagents("X", 50.0, 22.0, 90.0),
        lot("OK", 50.0, 22.0, 88.0),
    ];

    let added = TopUpExtender::new().extend(&members, &secondary, &varios(&cfg, true));
    let codes: Vec<&str> = added.iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, vec!["OK"]);

    // 不强制药剂时药剂未知批次也可补入
    let relaxed = TopUpExtender::new().extend(&members, &secondary, &varios(&cfg, false));
    assert_eq!(relaxed.len(), 2);
}

#[test]
fn test_rejects_additions_that_break_recovery() {
    let cfg = SolverConfig::default();
    let members: Vec<_> = (0..3).map(|i| lot(&format!("M{}", i), 100.0, 22.0, 90.0)).collect();
    // (300 × 90 + 100 × 60) / 400 = 82.5 < 85
    let secondary = vec![lot("LOW", 100.0, 22.0, 60.0)];

    assert!(TopUpExtender::new()
        .extend(&members, &secondary, &varios(&cfg, true))
        .is_empty());
}

#[test]
fn test_prefers_lot_closest_to_target() {
    let cfg = SolverConfig::default();
    let members: Vec<_> = (0..4).map(|i| lot(&format!("M{}", i), 100.0, 22.0, 90.0)).collect();
    let secondary = vec![
        lot("SMALL", 20.0, 22.0, 90.0),
        lot("EXACT", 150.0, 22.0, 90.0),
        lot("MID", 90.0, 22.0, 90.0),
    ];

    let added = TopUpExtender::new().extend(&members, &secondary, &varios(&cfg, true));
    let codes: Vec<&str> = added.iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, vec!["EXACT"]);
}
