// ==========================================
// 矿石配矿堆料系统 - 引擎编排器
// ==========================================
// 用途: 在同一批次池上独立计算三个视图，并汇总低回收率未使用批次
// 视图1: 单个 varios 堆（优先档裁剪 + 次级补料，必要时全池兜底）
// 视图2: 连续 batch 堆，直到余量不足或无可行解
// 视图3: 1 个 varios + 1 个大 batch 吸收余量（失败时回退为连续 batch）
// 红线: 视图之间互不影响；同一视图内批次不重复
// ==========================================

use crate::config::{MassWindow, SolverConfig};
use crate::domain::{
    Lot, Pile, PileBasis, PileRow, PileSummary, PileType, RawLotRecord, RejectRow, ViewKind,
    TOLERANCE,
};
use crate::engine::constraints::PileConstraints;
use crate::engine::greedy_builder::{GreedyBuilder, GreedyOutcome, GreedySearchParams};
use crate::engine::lot_preparation::{batch_candidates, LotPreparer, PreparedPool};
use crate::engine::reject::RejectClassifier;
use crate::engine::strategy::{first_success, varios_strategies};
use crate::engine::top_up::TopUpExtender;
use crate::engine::trim_builder::TrimBuilder;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// 同一堆换种子重试时的步长
const SEED_RETRY_STRIDE: u64 = 7919;
/// varios 堆编号
const VARIOS_PILE_CODE: u32 = 1;
/// 混合视图中 batch 堆的起始编号
const MIXED_BATCH_FIRST_CODE: u32 = 2;

// ==========================================
// ViewResult - 单个视图结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ViewResult {
    pub kind: ViewKind,
    pub piles: Vec<Pile>,
}

impl ViewResult {
    pub fn new(kind: ViewKind, piles: Vec<Pile>) -> Self {
        Self { kind, piles }
    }

    pub fn is_empty(&self) -> bool {
        self.piles.is_empty()
    }

    /// 视图内使用的全部批次编号
    pub fn used_codes(&self) -> HashSet<String> {
        self.piles.iter().flat_map(|p| p.codes()).collect()
    }

    /// 结果表行（按堆顺序展开）
    pub fn rows(&self) -> Vec<PileRow> {
        self.piles.iter().flat_map(|p| p.to_rows()).collect()
    }

    pub fn summaries(&self) -> Vec<PileSummary> {
        self.piles.iter().map(|p| p.summary()).collect()
    }
}

// ==========================================
// AllocationResult - 编排结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    pub varios: ViewResult,
    pub batch_series: ViewResult,
    pub mixed: ViewResult,
    pub rejects: Vec<RejectRow>,
}

impl AllocationResult {
    pub fn empty(rejects: Vec<RejectRow>) -> Self {
        Self {
            varios: ViewResult::new(ViewKind::Varios, Vec::new()),
            batch_series: ViewResult::new(ViewKind::BatchSeries, Vec::new()),
            mixed: ViewResult::new(ViewKind::Mixed, Vec::new()),
            rejects,
        }
    }

    pub fn views(&self) -> [&ViewResult; 3] {
        [&self.varios, &self.batch_series, &self.mixed]
    }

    pub fn view(&self, kind: ViewKind) -> &ViewResult {
        match kind {
            ViewKind::Varios => &self.varios,
            ViewKind::BatchSeries => &self.batch_series,
            ViewKind::Mixed => &self.mixed,
        }
    }

    /// 任一视图使用过的批次编号
    pub fn used_codes(&self) -> HashSet<String> {
        self.views().iter().flat_map(|v| v.used_codes()).collect()
    }
}

// ==========================================
// AllocationOrchestrator - 引擎编排器
// ==========================================
pub struct AllocationOrchestrator {
    config: SolverConfig,
    preparer: LotPreparer,
    trimmer: TrimBuilder,
    greedy: GreedyBuilder,
    top_up: TopUpExtender,
    rejects: RejectClassifier,
}

impl AllocationOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - config: 已解析且一致的求解配置
    pub fn new(config: SolverConfig) -> Self {
        Self {
            preparer: LotPreparer::new(),
            trimmer: TrimBuilder::new(),
            greedy: GreedyBuilder::new(GreedySearchParams::from(&config.knobs)),
            top_up: TopUpExtender::new(),
            rejects: RejectClassifier::new(config.reject_rec_ceiling),
            config,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// 从导入记录开始的完整流程
    #[instrument(skip(self, raw), fields(raw_count = raw.len()))]
    pub fn run(&self, raw: &[RawLotRecord]) -> AllocationResult {
        let pool = self.preparer.prepare(raw, &self.config);
        self.run_prepared(&pool)
    }

    /// 在已准备好的批次池上计算三个视图 + 低回收率报告
    #[instrument(skip(self, pool), fields(
        eligible = pool.eligible.len(),
        primary = pool.primary.len(),
        secondary = pool.secondary.len()
    ))]
    pub fn run_prepared(&self, pool: &PreparedPool) -> AllocationResult {
        if pool.is_empty() {
            info!("无准入批次，三个视图均为空");
            let rejects = self.rejects.classify(&pool.base, &HashSet::new());
            return AllocationResult::empty(rejects);
        }

        // ==========================================
        // 视图1: varios
        // ==========================================
        debug!("视图1: varios");
        let varios_piles: Vec<Pile> = self.build_varios(pool).into_iter().collect();
        let varios = ViewResult::new(ViewKind::Varios, varios_piles);

        // ==========================================
        // 视图2: 连续 batch
        // ==========================================
        debug!("视图2: 连续 batch");
        let series = self.build_batch_series(
            pool.primary.clone(),
            pool.secondary.clone(),
            1,
            self.config.seeds.batch_base,
        );
        let batch_series = ViewResult::new(ViewKind::BatchSeries, series);

        // ==========================================
        // 视图3: 混合
        // ==========================================
        debug!("视图3: 混合");
        let mixed = ViewResult::new(ViewKind::Mixed, self.build_mixed(pool));

        // ==========================================
        // 低回收率未使用批次
        // ==========================================
        let mut result = AllocationResult {
            varios,
            batch_series,
            mixed,
            rejects: Vec::new(),
        };
        result.rejects = self.rejects.classify(&pool.base, &result.used_codes());

        for view in result.views() {
            let rows: usize = view.piles.iter().map(|p| p.len()).sum();
            let mass: f64 = view.piles.iter().map(|p| p.totals().dry_mass).sum();
            info!(view = %view.kind, piles = view.piles.len(), rows, mass, "视图完成");
        }
        result
    }

    // ==========================================
    // varios: 优先档裁剪 → 次级补料；失败且存在次级档时全池兜底
    // ==========================================
    fn build_varios(&self, pool: &PreparedPool) -> Option<Pile> {
        let cfg = &self.config;
        let strategies = varios_strategies(cfg);

        let preferred = first_success(&strategies, |s| {
            self.trimmer.build(&pool.primary, &s.varios_constraints(cfg))
        });

        if let Some(outcome) = preferred {
            let mut lots = outcome.value;
            let added = self.top_up.extend(
                &lots,
                &pool.secondary,
                &outcome.strategy.varios_constraints(cfg),
            );
            lots.extend(added);
            info!(strategy = %outcome.strategy, lot_count = lots.len(), "varios 堆完成");
            return Some(Pile::new(
                PileType::Varios,
                VARIOS_PILE_CODE,
                outcome.strategy.basis(),
                lots,
            ));
        }

        if pool.secondary.is_empty() {
            info!("varios 不可行");
            return None;
        }

        debug!("优先档不可行，使用全部准入批次兜底");
        let fallback = first_success(&strategies, |s| {
            self.trimmer.build(&pool.eligible, &s.varios_constraints(cfg))
        });
        match fallback {
            Some(outcome) => {
                info!(strategy = %outcome.strategy, lot_count = outcome.value.len(), "varios 堆完成（全池兜底）");
                Some(Pile::new(
                    PileType::Varios,
                    VARIOS_PILE_CODE,
                    outcome.strategy.basis(),
                    outcome.value,
                ))
            }
            None => {
                info!("varios 不可行");
                None
            }
        }
    }

    // ==========================================
    // 连续 batch: 每个堆换种子重试，成功后移除成员并补料
    // ==========================================
    fn build_batch_series(
        &self,
        primary: Vec<Lot>,
        secondary: Vec<Lot>,
        first_code: u32,
        seed_base: u64,
    ) -> Vec<Pile> {
        let cfg = &self.config;
        let constraints = PileConstraints::for_batch(cfg, true);

        let mut remaining = batch_candidates(&primary, cfg);
        let mut secondary = batch_candidates(&secondary, cfg);
        let mut piles = Vec::new();
        let mut pile_idx: u32 = 1;

        loop {
            let remaining_mass: f64 = remaining.iter().map(|l| l.dry_mass).sum();
            if remaining_mass < cfg.batch.window.min - TOLERANCE {
                debug!(remaining_mass, "剩余干吨不足 batch 下限");
                break;
            }

            let seed = seed_base.wrapping_add(pile_idx as u64);
            let outcome = match self.build_batch_with_retries(&remaining, &constraints, seed) {
                Some(o) => o,
                None => {
                    debug!(pile_idx, "无可行 batch，停止");
                    break;
                }
            };

            let mut lots = outcome.lots;
            let used: HashSet<String> = lots.iter().map(|l| l.code.clone()).collect();
            remaining.retain(|l| !used.contains(&l.code));
            secondary.retain(|l| !used.contains(&l.code));

            let top_up_constraints = constraints.with_reagents_enforced(outcome.enforce_reagents);
            let added = self.top_up.extend(&lots, &secondary, &top_up_constraints);
            if !added.is_empty() {
                let added_codes: HashSet<&str> = added.iter().map(|l| l.code.as_str()).collect();
                secondary.retain(|l| !added_codes.contains(l.code.as_str()));
                lots.extend(added);
            }

            let code = first_code + pile_idx - 1;
            info!(pile_code = code, lot_count = lots.len(), "batch 堆完成");
            let basis = PileBasis::new(cfg.batch.band, outcome.enforce_reagents);
            piles.push(Pile::new(PileType::Batch, code, basis, lots));
            pile_idx += 1;
        }

        piles
    }

    /// 单个 batch 堆: 种子 seed + k × 7919，k < seed_retries
    fn build_batch_with_retries(
        &self,
        pool: &[Lot],
        constraints: &PileConstraints,
        seed: u64,
    ) -> Option<GreedyOutcome> {
        let retries = self.config.knobs.seed_retries.max(1) as u64;
        (0..retries).find_map(|k| {
            let attempt_seed = seed.wrapping_add(k.wrapping_mul(SEED_RETRY_STRIDE));
            self.greedy.build(pool, constraints, attempt_seed)
        })
    }

    // ==========================================
    // 混合: varios → 单个大 batch 吸收余量 → 回退连续 batch
    // ==========================================
    fn build_mixed(&self, pool: &PreparedPool) -> Vec<Pile> {
        let cfg = &self.config;
        let mut piles = Vec::new();

        let mut primary = pool.primary.clone();
        let mut secondary = pool.secondary.clone();

        if let Some(varios) = self.build_varios(pool) {
            let used = varios.codes();
            primary.retain(|l| !used.contains(&l.code));
            secondary.retain(|l| !used.contains(&l.code));
            piles.push(varios);
        }

        if let Some(absorbing) = self.build_absorbing_batch(&primary) {
            piles.push(absorbing);
            return piles;
        }

        debug!("大 batch 吸收失败，回退为连续 batch");
        piles.extend(self.build_batch_series(
            primary,
            secondary,
            MIXED_BATCH_FIRST_CODE,
            cfg.seeds.mix_batch,
        ));
        piles
    }

    /// 单个大 batch: 上限 = min(剩余干吨, varios 上限)，下限 = max(吸收比例 × 剩余, batch 下限)
    fn build_absorbing_batch(&self, primary: &[Lot]) -> Option<Pile> {
        let cfg = &self.config;
        let rest = batch_candidates(primary, cfg);
        let rest_mass: f64 = rest.iter().map(|l| l.dry_mass).sum();
        if rest_mass <= 0.0 {
            return None;
        }

        let max = rest_mass.min(cfg.varios.window.max);
        let min = (cfg.mixed_absorb_ratio * rest_mass).max(cfg.batch.window.min);
        if min > max + TOLERANCE {
            debug!(rest_mass, min, max, "余量不适合单个大 batch");
            return None;
        }

        let constraints =
            PileConstraints::for_batch(cfg, true).with_window(MassWindow::new(min, max, max));
        let outcome = self.greedy.build(&rest, &constraints, cfg.seeds.mix_batch)?;

        info!(
            lot_count = outcome.lots.len(),
            mass = outcome.totals.dry_mass,
            rest_mass,
            "大 batch 吸收完成"
        );
        let basis = PileBasis::new(cfg.batch.band, outcome.enforce_reagents);
        Some(Pile::new(PileType::Batch, MIXED_BATCH_FIRST_CODE, basis, outcome.lots))
    }
}
