// ==========================================
// 矿石配矿堆料系统 - batch 随机贪心构建器
// ==========================================
// 职责: 多次随机贪心构建，每步加入单个批次或一对批次，保留最优可行解
// 输入: 候选批次 + 堆约束 + 种子
// 输出: 最优可行堆（含最终药剂模式）；不可行时 None
// 红线: 随机数只来自显式种子；最坏工作量 = 尝试次数 × 最大步数
// 阶段: 强制药剂 → 放宽药剂（种子偏移）
// ==========================================

use crate::config::SearchKnobs;
use crate::domain::{BlendTotals, Lot, TOLERANCE};
use crate::engine::constraints::PileConstraints;
use crate::engine::lot_priority::LotPrioritySorter;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;
use tracing::{debug, info, instrument, trace};

// ===== 打分权重 =====
const W_FILL: f64 = 18.0;
const W_GRADE_PEN: f64 = 250.0;
const W_REC_PEN: f64 = 90.0;
const W_LOW_REC: f64 = 25.0;
const W_REAGENT_STRICT: f64 = 120.0;
const W_REAGENT_RELAXED: f64 = 18.0;
const W_ADD_MASS: f64 = 0.15;
const W_ADD_FINE: f64 = 0.001;
const W_GRADE_BONUS: f64 = 8.0;
/// 药剂未知的候选
const UNKNOWN_REAGENT_SCORE: f64 = -1e15;
/// 质量非法的候选
const INVALID_SCORE: f64 = -1e18;

// ==========================================
// GreedySearchParams - 搜索预算
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedySearchParams {
    pub n_iters_hard: usize,
    pub n_iters_soft: usize,
    pub max_steps: usize,
    pub cand_sample: usize,
    pub reseeds: usize,
    pub pair_topk: usize,
    pub pair_pool: usize,
    pub relaxed_seed_offset: u64,
}

impl From<&SearchKnobs> for GreedySearchParams {
    fn from(k: &SearchKnobs) -> Self {
        Self {
            n_iters_hard: k.n_iters_hard,
            n_iters_soft: k.n_iters_soft,
            max_steps: k.max_steps,
            cand_sample: k.cand_sample,
            reseeds: k.reseeds,
            pair_topk: k.pair_topk,
            pair_pool: k.pair_pool,
            relaxed_seed_offset: k.relaxed_seed_offset,
        }
    }
}

/// 构建结果
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyOutcome {
    /// 按加入顺序
    pub lots: Vec<Lot>,
    pub totals: BlendTotals,
    /// 成功时所处阶段是否强制药剂
    pub enforce_reagents: bool,
}

/// 单步选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Single(usize),
    Pair(usize, usize),
}

/// 尝试间比较键（越小越好）
///
/// 低于下限的缺口 → 与目标距离 → 金属量大 → 品位高 → 干吨大 → 回收率高
#[derive(Debug, Clone, Copy)]
struct AttemptKey {
    under: f64,
    gap: f64,
    fine: f64,
    grade: f64,
    mass: f64,
    recovery: f64,
}

impl AttemptKey {
    fn new(totals: &BlendTotals, constraints: &PileConstraints) -> Self {
        let w = &constraints.window;
        Self {
            under: w.deficit(totals.dry_mass),
            gap: w.target_gap(totals.dry_mass),
            fine: totals.fine_content,
            grade: totals.grade().unwrap_or(f64::NEG_INFINITY),
            mass: totals.dry_mass,
            recovery: totals.recovery().unwrap_or(f64::NEG_INFINITY),
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        self.under
            .total_cmp(&other.under)
            .then_with(|| self.gap.total_cmp(&other.gap))
            .then_with(|| other.fine.total_cmp(&self.fine))
            .then_with(|| other.grade.total_cmp(&self.grade))
            .then_with(|| other.mass.total_cmp(&self.mass))
            .then_with(|| other.recovery.total_cmp(&self.recovery))
    }
}

/// 单阶段结果
struct PhaseRun {
    best: Option<GreedyOutcome>,
    /// 全部尝试消耗的步数
    steps: usize,
}

/// 单阶段的预计算数据
struct PhaseContext<'a> {
    lots: Vec<&'a Lot>,
    parts: Vec<BlendTotals>,
    low_rec: Vec<bool>,
    constraints: PileConstraints,
}

// ==========================================
// GreedyBuilder - 随机贪心构建器
// ==========================================
pub struct GreedyBuilder {
    params: GreedySearchParams,
}

impl GreedyBuilder {
    pub fn new(params: GreedySearchParams) -> Self {
        Self { params }
    }

    /// 构建一个 batch 堆
    ///
    /// 先强制药剂（n_iters_hard 次尝试），结果干吨未达下限时放宽药剂
    /// （n_iters_soft 次尝试，种子 + relaxed_seed_offset）。
    /// `constraints.enforce_reagents` 由两阶段各自覆盖。
    #[instrument(skip(self, pool, constraints), fields(
        pool_size = pool.len(),
        mass_min = constraints.window.min,
        mass_max = constraints.window.max
    ))]
    pub fn build(
        &self,
        pool: &[Lot],
        constraints: &PileConstraints,
        seed: u64,
    ) -> Option<GreedyOutcome> {
        if pool.is_empty() {
            return None;
        }

        let phases = [
            (true, self.params.n_iters_hard, seed),
            (
                false,
                self.params.n_iters_soft,
                seed.wrapping_add(self.params.relaxed_seed_offset),
            ),
        ];

        for (enforce, n_iters, phase_seed) in phases {
            let phase_constraints = constraints.with_reagents_enforced(enforce);
            match self.solve_phase(pool, &phase_constraints, n_iters, phase_seed).best {
                Some(outcome) if outcome.totals.dry_mass >= constraints.window.min - TOLERANCE => {
                    info!(
                        enforce_reagents = enforce,
                        lot_count = outcome.lots.len(),
                        mass = outcome.totals.dry_mass,
                        grade = outcome.totals.grade().unwrap_or_default(),
                        recovery = outcome.totals.recovery().unwrap_or_default(),
                        "batch 构建成功"
                    );
                    return Some(outcome);
                }
                Some(outcome) => {
                    debug!(
                        enforce_reagents = enforce,
                        mass = outcome.totals.dry_mass,
                        "最优解未达干吨下限"
                    );
                }
                None => debug!(enforce_reagents = enforce, "本阶段无可行解"),
            }
        }

        None
    }

    /// 单阶段: n_iters 次独立尝试，取比较键最小的可行解
    fn solve_phase(
        &self,
        pool: &[Lot],
        constraints: &PileConstraints,
        n_iters: usize,
        seed: u64,
    ) -> PhaseRun {
        let sorter = LotPrioritySorter::new(constraints.rec_min);
        let mut lots: Vec<&Lot> = pool.iter().filter(|l| constraints.admits_lot(l)).collect();
        if lots.is_empty() {
            return PhaseRun { best: None, steps: 0 };
        }
        lots.sort_by(|a, b| sorter.compare(a, b));

        let ctx = PhaseContext {
            parts: lots.iter().map(|l| BlendTotals::of_lot(l)).collect(),
            low_rec: lots
                .iter()
                .map(|l| l.recovery_pct < constraints.rec_min)
                .collect(),
            lots,
            constraints: *constraints,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut best: Option<(AttemptKey, Vec<usize>, BlendTotals)> = None;
        let mut feasible = 0usize;
        let mut total_steps = 0usize;

        for attempt in 0..n_iters {
            let (picked, steps) = self.run_attempt(&ctx, &mut rng);
            total_steps += steps;
            if picked.is_empty() {
                continue;
            }

            let totals = BlendTotals::from_lots(picked.iter().map(|&j| ctx.lots[j]));
            if !self.accept(&totals, constraints) {
                trace!(attempt, mass = totals.dry_mass, "尝试不满足硬约束");
                continue;
            }
            feasible += 1;

            let key = AttemptKey::new(&totals, constraints);
            let better = best
                .as_ref()
                .map_or(true, |(best_key, _, _)| key.cmp(best_key) == Ordering::Less);
            if better {
                trace!(attempt, mass = totals.dry_mass, gap = key.gap, "更新最优解");
                best = Some((key, picked, totals));
            }
        }

        debug!(
            enforce_reagents = constraints.enforce_reagents,
            n_iters,
            feasible,
            steps = total_steps,
            "阶段搜索结束"
        );

        PhaseRun {
            best: best.map(|(_, picked, totals)| GreedyOutcome {
                lots: picked.iter().map(|&j| ctx.lots[j].clone()).collect(),
                totals,
                enforce_reagents: constraints.enforce_reagents,
            }),
            steps: total_steps,
        }
    }

    /// 精确重算后的硬约束（干吨下限不在此判定，由比较键与阶段出口处理）
    fn accept(&self, totals: &BlendTotals, constraints: &PileConstraints) -> bool {
        totals.dry_mass > 0.0
            && totals.dry_mass <= constraints.window.max + TOLERANCE
            && constraints.quality_ok(totals)
    }

    /// 一次随机贪心构建，返回已选批次下标（加入顺序）与消耗的步数
    fn run_attempt(&self, ctx: &PhaseContext<'_>, rng: &mut ChaCha8Rng) -> (Vec<usize>, usize) {
        let n = ctx.lots.len();
        let window = ctx.constraints.window;
        let fill_to = window.effective_target();

        let mut used = vec![false; n];
        let mut picked = Vec::new();
        let mut cur = BlendTotals::default();

        let mut order = permutation(n, rng);
        let mut ptr = 0usize;
        let mut reseeds_left = self.params.reseeds;
        let mut steps = 0usize;

        while steps < self.params.max_steps {
            if cur.dry_mass >= window.max - TOLERANCE {
                break;
            }
            steps += 1;

            let cap = window.max - cur.dry_mass;
            let need = (fill_to - cur.dry_mass).max(0.0);

            // 按扫描顺序循环抽样候选，每步最多扫描一整圈
            let mut cand = Vec::with_capacity(self.params.cand_sample);
            let mut scanned = 0usize;
            while scanned < n && cand.len() < self.params.cand_sample {
                let j = order[ptr];
                ptr = (ptr + 1) % n;
                scanned += 1;
                if used[j] {
                    continue;
                }
                let m = ctx.lots[j].dry_mass;
                if m <= 0.0 || m > cap + TOLERANCE {
                    continue;
                }
                cand.push(j);
            }

            // 整圈都没有放得下的未用批次
            if cand.is_empty() {
                if reseeds_left > 0 {
                    order = permutation(n, rng);
                    ptr = 0;
                    reseeds_left -= 1;
                    continue;
                }
                break;
            }

            let (first, second) = match self.choose(ctx, &cand, &cur, cap, need) {
                Choice::Single(j) => (j, None),
                Choice::Pair(a, b) => (a, Some(b)),
            };
            for j in std::iter::once(first).chain(second) {
                used[j] = true;
                picked.push(j);
                cur += ctx.parts[j];
            }

            if cur.dry_mass >= fill_to - TOLERANCE {
                break;
            }
        }

        (picked, steps)
    }

    /// 单步选择: 最高分单批次，或得分更高的批次对
    fn choose(
        &self,
        ctx: &PhaseContext<'_>,
        cand: &[usize],
        cur: &BlendTotals,
        cap: f64,
        need: f64,
    ) -> Choice {
        let scores: Vec<f64> = cand
            .iter()
            .map(|&j| self.score(ctx, cur, &ctx.parts[j], ctx.low_rec[j] as u8 as f64, need))
            .collect();

        // 首个最大值
        let mut best_pos = 0usize;
        for (pos, &s) in scores.iter().enumerate().skip(1) {
            if s > scores[best_pos] {
                best_pos = pos;
            }
        }
        let mut best_choice = Choice::Single(cand[best_pos]);
        let mut best_score = scores[best_pos];

        let k = self.params.pair_topk.min(cand.len());
        let pool = self.params.pair_pool.min(cand.len());
        if k < 2 || pool < 2 {
            return best_choice;
        }

        let mut ranked: Vec<usize> = (0..cand.len()).collect();
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        for &pos in ranked.iter().take(k) {
            let j = cand[pos];
            for &partner in cand.iter().take(pool) {
                if partner == j {
                    continue;
                }
                if ctx.lots[j].dry_mass + ctx.lots[partner].dry_mass > cap + TOLERANCE {
                    continue;
                }

                let add = ctx.parts[j] + ctx.parts[partner];
                let low = (ctx.low_rec[j] as u8 + ctx.low_rec[partner] as u8) as f64;
                let sc = self.score(ctx, cur, &add, low, need);
                if sc > best_score {
                    best_score = sc;
                    best_choice = Choice::Pair(j, partner);
                }
            }
        }

        best_choice
    }

    /// 候选得分（加入后）
    ///
    /// 填充目标缺口 + 品位奖励 − 品位/回收率/低回收率/药剂罚分 + 少量质量与金属量奖励
    fn score(
        &self,
        ctx: &PhaseContext<'_>,
        cur: &BlendTotals,
        add: &BlendTotals,
        low_count: f64,
        need: f64,
    ) -> f64 {
        let c = &ctx.constraints;
        let add_mass = add.dry_mass;
        let next = *cur + *add;

        if add_mass <= 0.0 || next.dry_mass <= 0.0 {
            return INVALID_SCORE;
        }
        if add.unknown_reagent_lots > 0 {
            return UNKNOWN_REAGENT_SCORE;
        }

        let new_grade = next.grade().unwrap_or_default();
        let g_pen = c.band.edge_penalty(next.grade(), c.edge);
        let rec_pen = c.recovery_deficit(&next);
        let reagent_weight = if c.enforce_reagents {
            W_REAGENT_STRICT
        } else {
            W_REAGENT_RELAXED
        };
        let reag_pen = reagent_weight * c.reagent_distance(&next);

        W_FILL * add_mass.min(need) - W_GRADE_PEN * g_pen - W_REC_PEN * rec_pen
            - W_LOW_REC * low_count
            - reag_pen
            + W_ADD_MASS * add_mass
            + W_ADD_FINE * add.fine_content
            + W_GRADE_BONUS * new_grade
    }
}

/// 扫描顺序: 下标的随机排列
fn permutation(n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}
