// ==========================================
// 矿石配矿堆料系统 - 回退策略
// ==========================================
// 用途:
// - varios 按"品位带 × 药剂模式"的有序列表逐个尝试，取首个成功者；
// - 获胜策略的品位带与药剂模式继续用于补料，保证补料后约束一致。

use crate::config::{GradeBand, SolverConfig};
use crate::domain::PileBasis;
use crate::engine::constraints::PileConstraints;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// 单个回退策略
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    pub band: GradeBand,
    pub enforce_reagents: bool,
}

impl FallbackStrategy {
    pub fn new(band: GradeBand, enforce_reagents: bool) -> Self {
        Self {
            band,
            enforce_reagents,
        }
    }

    /// 获胜后记录在堆上的成堆依据
    pub fn basis(&self) -> PileBasis {
        PileBasis::new(self.band, self.enforce_reagents)
    }

    /// 对应的 varios 约束
    pub fn varios_constraints(&self, cfg: &SolverConfig) -> PileConstraints {
        PileConstraints::for_varios(cfg, self.band, self.enforce_reagents)
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.enforce_reagents {
            "药剂强制"
        } else {
            "药剂放宽"
        };
        write!(f, "品位({}, {}] {}", self.band.min, self.band.max, mode)
    }
}

/// 首个成功的策略及其结果
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome<T> {
    pub strategy: FallbackStrategy,
    pub value: T,
}

/// varios 策略列表: 全部品位带先强制药剂，再全部品位带放宽药剂
pub fn varios_strategies(cfg: &SolverConfig) -> Vec<FallbackStrategy> {
    [true, false]
        .into_iter()
        .flat_map(|enforce| {
            cfg.varios
                .grade_tries
                .iter()
                .map(move |band| FallbackStrategy::new(*band, enforce))
        })
        .collect()
}

/// 按顺序尝试，返回首个成功者
pub fn first_success<T, F>(strategies: &[FallbackStrategy], mut run: F) -> Option<StrategyOutcome<T>>
where
    F: FnMut(&FallbackStrategy) -> Option<T>,
{
    strategies.iter().find_map(|strategy| match run(strategy) {
        Some(value) => Some(StrategyOutcome {
            strategy: *strategy,
            value,
        }),
        None => {
            debug!(strategy = %strategy, "策略不可行，尝试下一个");
            None
        }
    })
}
