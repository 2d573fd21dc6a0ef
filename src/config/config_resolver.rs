// ==========================================
// 矿石配矿堆料系统 - 配置解析器
// ==========================================
// 职责: 调用方覆写 JSON + 默认值 → 已校验的 SolverConfig
// 支持: 扁平键 / 分组键 (filters/varios/batch/reagents/knobs/seeds)
//       旧版湿吨键名 (*_tmh_*) 自动映射为干吨键名
// 红线: 非法值回退默认值，不报错；只有 JSON 本身不可解析才返回错误
// ==========================================

use crate::config::error::ConfigResult;
use crate::config::solver_config::{AdmissionFloor, GradeBand, MassWindow, SolverConfig};
use crate::domain::RecoveryBand;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 批次过滤
    pub const LOT_REC_MIN: &str = "lot_rec_min";
    pub const PILE_REC_MIN: &str = "pile_rec_min";
    pub const PREFERRED_LOT_REC_MIN: &str = "preferred_lot_rec_min";
    pub const LOT_TMS_MIN: &str = "lot_tms_min";
    pub const ADMISSION_FLOOR: &str = "admission_floor";
    pub const ZONES: &str = "zones";

    // varios
    pub const VAR_TMS_MIN: &str = "var_tms_min";
    pub const VAR_TMS_TARGET: &str = "var_tms_target";
    pub const VAR_TMS_MAX: &str = "var_tms_max";
    pub const VAR_G_TRIES: &str = "var_g_tries";

    // batch
    pub const BAT_TMS_MIN: &str = "bat_tms_min";
    pub const BAT_TMS_TARGET: &str = "bat_tms_target";
    pub const BAT_TMS_MAX: &str = "bat_tms_max";
    pub const BAT_LOT_G_MIN: &str = "bat_lot_g_min";
    pub const BAT_PILE_G_MIN: &str = "bat_pile_g_min";
    pub const BAT_PILE_G_MAX: &str = "bat_pile_g_max";

    // 品位边界策略（两种堆共用）
    pub const GRADE_LOWER_EXCLUSIVE: &str = "grade_lower_exclusive";
    pub const GRADE_UPPER_INCLUSIVE: &str = "grade_upper_inclusive";

    // 药剂
    pub const REAG_MIN: &str = "reag_min";
    pub const REAG_MAX: &str = "reag_max";

    // 搜索参数
    pub const BATCH_N_ITERS_HARD: &str = "batch_n_iters_hard";
    pub const BATCH_N_ITERS_SOFT: &str = "batch_n_iters_soft";
    pub const BATCH_MAX_STEPS: &str = "batch_max_steps";
    pub const BATCH_CAND_SAMPLE: &str = "batch_cand_sample";
    pub const BATCH_RESEEDS: &str = "batch_reseeds";
    pub const BATCH_PAIR_TOPK: &str = "batch_pair_topk";
    pub const BATCH_PAIR_POOL: &str = "batch_pair_pool";
    pub const BATCH_RELAXED_SEED_OFFSET: &str = "batch_relaxed_seed_offset";
    pub const BATCH_SEED_RETRIES: &str = "batch_seed_retries";

    // 种子
    pub const SEED_BATCH_BASE: &str = "seed_batch_base";
    pub const SEED_MIX_BATCH: &str = "seed_mix_batch";

    // 视图/报告
    pub const MIXED_ABSORB_RATIO: &str = "mixed_absorb_ratio";
    pub const REJECT_REC_CEILING: &str = "reject_rec_ceiling";
}

use config_keys::*;

/// 旧版键名 → 新键名
const LEGACY_KEYS: [(&str, &str); 7] = [
    ("lot_tmh_min", LOT_TMS_MIN),
    ("var_tmh_max", VAR_TMS_MAX),
    ("var_tmh_target", VAR_TMS_TARGET),
    ("var_tmh_min", VAR_TMS_MIN),
    ("bat_tmh_max", BAT_TMS_MAX),
    ("bat_tmh_target", BAT_TMS_TARGET),
    ("bat_tmh_min", BAT_TMS_MIN),
];

/// 各分组允许出现的键
const SECTION_KEYS: [(&str, &[&str]); 6] = [
    (
        "filters",
        &[LOT_REC_MIN, PILE_REC_MIN, PREFERRED_LOT_REC_MIN, LOT_TMS_MIN, ADMISSION_FLOOR],
    ),
    (
        "varios",
        &[VAR_TMS_MIN, VAR_TMS_TARGET, VAR_TMS_MAX, VAR_G_TRIES],
    ),
    (
        "batch",
        &[
            BAT_TMS_MIN,
            BAT_TMS_TARGET,
            BAT_TMS_MAX,
            BAT_LOT_G_MIN,
            BAT_PILE_G_MIN,
            BAT_PILE_G_MAX,
        ],
    ),
    ("reagents", &[REAG_MIN, REAG_MAX]),
    (
        "knobs",
        &[
            BATCH_N_ITERS_HARD,
            BATCH_N_ITERS_SOFT,
            BATCH_MAX_STEPS,
            BATCH_CAND_SAMPLE,
            BATCH_RESEEDS,
            BATCH_PAIR_TOPK,
            BATCH_PAIR_POOL,
            BATCH_RELAXED_SEED_OFFSET,
            BATCH_SEED_RETRIES,
        ],
    ),
    ("seeds", &[SEED_BATCH_BASE, SEED_MIX_BATCH]),
];

// ==========================================
// ConfigResolver - 配置解析器
// ==========================================
pub struct ConfigResolver;

impl ConfigResolver {
    /// 从 JSON 文本解析（空文本 = 全部默认）
    pub fn resolve_str(raw: &str) -> ConfigResult<SolverConfig> {
        if raw.trim().is_empty() {
            return Ok(SolverConfig::default());
        }
        let payload: Value = serde_json::from_str(raw)?;
        Ok(Self::resolve(&payload))
    }

    /// 从 JSON 文件解析
    pub fn resolve_file<P: AsRef<Path>>(path: P) -> ConfigResult<SolverConfig> {
        let raw = std::fs::read_to_string(path)?;
        Self::resolve_str(&raw)
    }

    /// 合并覆写与默认值，并做夹紧
    ///
    /// 非对象的 payload 视为"无覆写"
    pub fn resolve(payload: &Value) -> SolverConfig {
        let mut cfg = SolverConfig::default();

        let obj = match payload.as_object() {
            Some(o) => o,
            None => return cfg,
        };

        let overrides = Self::flatten(obj);
        debug!(override_count = overrides.len(), "配置覆写已展开");

        Self::apply(&mut cfg, &overrides);
        Self::clamp(&mut cfg);
        cfg
    }

    // ==========================================
    // 展开: 扁平键 + 分组键 + 旧版键名
    // ==========================================
    fn flatten(obj: &Map<String, Value>) -> Map<String, Value> {
        let mut flat = Map::new();

        let mut absorb = |src: &Map<String, Value>, allowed: Option<&[&str]>| {
            let mut section = src.clone();
            for (legacy, key) in LEGACY_KEYS {
                if !section.contains_key(key) {
                    if let Some(v) = section.get(legacy).cloned() {
                        section.insert(key.to_string(), v);
                    }
                }
            }
            for (k, v) in section {
                if allowed.map_or(true, |keys| keys.contains(&k.as_str())) {
                    flat.insert(k, v);
                }
            }
        };

        absorb(obj, None);
        for (section, keys) in SECTION_KEYS {
            if let Some(Value::Object(inner)) = obj.get(section) {
                absorb(inner, Some(keys));
            }
        }

        // 区域别名: 顶层 zones/zonas，filters 内 zones/zonas/zona
        let mut zones = obj.get(ZONES).or_else(|| obj.get("zonas")).cloned();
        if let Some(Value::Object(f)) = obj.get("filters") {
            if let Some(z) = f.get(ZONES).or_else(|| f.get("zonas")).or_else(|| f.get("zona")) {
                zones = Some(z.clone());
            }
        }
        flat.remove(ZONES);
        if let Some(z) = zones {
            flat.insert(ZONES.to_string(), z);
        }

        flat
    }

    // ==========================================
    // 应用覆写
    // ==========================================
    fn apply(cfg: &mut SolverConfig, o: &Map<String, Value>) {
        let f = &mut cfg.filters;
        set_f64(o, LOT_REC_MIN, &mut f.lot_rec_min);
        set_f64(o, PILE_REC_MIN, &mut f.pile_rec_min);
        set_f64(o, LOT_TMS_MIN, &mut f.lot_mass_min);
        if let Some(v) = o.get(PREFERRED_LOT_REC_MIN) {
            if v.is_null() {
                f.preferred_lot_rec_min = None;
            } else if let Some(x) = to_f64(v) {
                f.preferred_lot_rec_min = Some(x);
            } else {
                warn!(key = PREFERRED_LOT_REC_MIN, value = %v, "配置值无效，使用默认值");
            }
        }
        if let Some(v) = o.get(ADMISSION_FLOOR) {
            match v.as_str().map(|s| s.trim().to_lowercase()) {
                Some(s) if s == "lot_only" => f.admission_floor = AdmissionFloor::LotOnly,
                Some(s) if s == "min_of_lot_and_pile" => {
                    f.admission_floor = AdmissionFloor::MinOfLotAndPile
                }
                _ => warn!(key = ADMISSION_FLOOR, value = %v, "配置值无效，使用默认值"),
            }
        }
        if let Some(v) = o.get(ZONES) {
            f.zones = parse_zone_list(v);
        }

        let w = cfg.varios.window;
        cfg.varios.window = window_from(o, (VAR_TMS_MIN, VAR_TMS_TARGET, VAR_TMS_MAX), w);
        if let Some(v) = o.get(VAR_G_TRIES) {
            match parse_grade_tries(v) {
                Some(tries) => cfg.varios.grade_tries = tries,
                None => warn!(key = VAR_G_TRIES, value = %v, "品位带列表无效，使用默认值"),
            }
        }

        let w = cfg.batch.window;
        cfg.batch.window = window_from(o, (BAT_TMS_MIN, BAT_TMS_TARGET, BAT_TMS_MAX), w);
        set_f64(o, BAT_LOT_G_MIN, &mut cfg.batch.lot_grade_min);
        let mut band = cfg.batch.band;
        set_f64(o, BAT_PILE_G_MIN, &mut band.min);
        set_f64(o, BAT_PILE_G_MAX, &mut band.max);
        cfg.batch.band = GradeBand::new(band.min, band.max);

        for edge in [&mut cfg.varios.edge, &mut cfg.batch.edge] {
            set_bool(o, GRADE_LOWER_EXCLUSIVE, &mut edge.lower_exclusive);
            set_bool(o, GRADE_UPPER_INCLUSIVE, &mut edge.upper_inclusive);
        }

        set_f64(o, REAG_MIN, &mut cfg.reagents.lo);
        set_f64(o, REAG_MAX, &mut cfg.reagents.hi);

        let k = &mut cfg.knobs;
        set_usize(o, BATCH_N_ITERS_HARD, &mut k.n_iters_hard);
        set_usize(o, BATCH_N_ITERS_SOFT, &mut k.n_iters_soft);
        set_usize(o, BATCH_MAX_STEPS, &mut k.max_steps);
        set_usize(o, BATCH_CAND_SAMPLE, &mut k.cand_sample);
        set_usize(o, BATCH_RESEEDS, &mut k.reseeds);
        set_usize(o, BATCH_PAIR_TOPK, &mut k.pair_topk);
        set_usize(o, BATCH_PAIR_POOL, &mut k.pair_pool);
        set_u64(o, BATCH_RELAXED_SEED_OFFSET, &mut k.relaxed_seed_offset);
        set_usize(o, BATCH_SEED_RETRIES, &mut k.seed_retries);

        set_u64(o, SEED_BATCH_BASE, &mut cfg.seeds.batch_base);
        set_u64(o, SEED_MIX_BATCH, &mut cfg.seeds.mix_batch);

        set_f64(o, MIXED_ABSORB_RATIO, &mut cfg.mixed_absorb_ratio);
        set_f64(o, REJECT_REC_CEILING, &mut cfg.reject_rec_ceiling);
    }

    // ==========================================
    // 夹紧: 保证下游拿到的配置自洽
    // ==========================================
    fn clamp(cfg: &mut SolverConfig) {
        if cfg.reagents.lo > cfg.reagents.hi {
            std::mem::swap(&mut cfg.reagents.lo, &mut cfg.reagents.hi);
        }

        for w in [&mut cfg.varios.window, &mut cfg.batch.window] {
            *w = MassWindow::new(w.min.max(0.0), w.target, w.max.max(0.0));
        }

        if cfg.varios.grade_tries.is_empty() {
            cfg.varios.grade_tries = SolverConfig::default().varios.grade_tries;
        }
        if cfg.batch.lot_grade_min < 0.0 {
            cfg.batch.lot_grade_min = 0.0;
        }
        if cfg.filters.lot_mass_min < 0.0 {
            cfg.filters.lot_mass_min = 0.0;
        }
        if !(cfg.mixed_absorb_ratio > 0.0 && cfg.mixed_absorb_ratio <= 1.0) {
            cfg.mixed_absorb_ratio = SolverConfig::default().mixed_absorb_ratio;
        }
        if cfg.reject_rec_ceiling > RecoveryBand::TOP_EDGE {
            warn!(
                value = cfg.reject_rec_ceiling,
                max = RecoveryBand::TOP_EDGE,
                "低回收率报告上限超出分档范围，已夹紧"
            );
            cfg.reject_rec_ceiling = RecoveryBand::TOP_EDGE;
        }

        let k = &mut cfg.knobs;
        k.n_iters_hard = k.n_iters_hard.max(1);
        k.n_iters_soft = k.n_iters_soft.max(1);
        k.max_steps = k.max_steps.max(1);
        k.cand_sample = k.cand_sample.max(1);
    }
}

// ==========================================
// 数值转换辅助
// ==========================================

fn to_f64(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    x.is_finite().then_some(x)
}

fn to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|x| x.is_finite()).map(|x| x.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn set_f64(o: &Map<String, Value>, key: &str, slot: &mut f64) {
    if let Some(v) = o.get(key) {
        match to_f64(v) {
            Some(x) => *slot = x,
            None => warn!(key, value = %v, "配置值无效，使用默认值"),
        }
    }
}

fn set_usize(o: &Map<String, Value>, key: &str, slot: &mut usize) {
    if let Some(v) = o.get(key) {
        match to_i64(v) {
            Some(x) => *slot = x.max(0) as usize,
            None => warn!(key, value = %v, "配置值无效，使用默认值"),
        }
    }
}

fn set_u64(o: &Map<String, Value>, key: &str, slot: &mut u64) {
    if let Some(v) = o.get(key) {
        match to_i64(v) {
            Some(x) if x >= 0 => *slot = x as u64,
            _ => warn!(key, value = %v, "种子必须为非负整数，使用默认值"),
        }
    }
}

fn set_bool(o: &Map<String, Value>, key: &str, slot: &mut bool) {
    if let Some(v) = o.get(key) {
        match v {
            Value::Bool(b) => *slot = *b,
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => *slot = true,
                "false" | "0" | "no" => *slot = false,
                _ => warn!(key, value = %v, "配置值无效，使用默认值"),
            },
            _ => warn!(key, value = %v, "配置值无效，使用默认值"),
        }
    }
}

fn window_from(o: &Map<String, Value>, keys: (&str, &str, &str), base: MassWindow) -> MassWindow {
    let (mut min, mut target, mut max) = (base.min, base.target, base.max);
    set_f64(o, keys.0, &mut min);
    set_f64(o, keys.1, &mut target);
    set_f64(o, keys.2, &mut max);
    MassWindow { min, target, max }
}

/// 解析单个品位带: [a, b] 或 {"gmin": a, "gmax": b}
fn parse_band(v: &Value) -> Option<GradeBand> {
    let (a, b) = match v {
        Value::Array(items) if items.len() == 2 => (to_f64(&items[0])?, to_f64(&items[1])?),
        Value::Object(m) => (to_f64(m.get("gmin")?)?, to_f64(m.get("gmax")?)?),
        _ => return None,
    };
    Some(GradeBand::new(a, b))
}

/// 品位带列表: [[a,b],..] / [a,b] / {"gmin","gmax"}
fn parse_grade_tries(v: &Value) -> Option<Vec<GradeBand>> {
    if let Value::Array(items) = v {
        let is_nested = items.iter().any(|i| i.is_array() || i.is_object());
        if !is_nested {
            return parse_band(v).map(|b| vec![b]);
        }
        let bands: Vec<GradeBand> = items.iter().filter_map(parse_band).collect();
        return (!bands.is_empty()).then_some(bands);
    }
    parse_band(v).map(|b| vec![b])
}

/// 区域列表: 数组或逗号分隔字符串；空列表 = 全部区域
///
/// 大小写不敏感去重，保留首次出现的写法
pub fn parse_zone_list(v: &Value) -> Option<Vec<String>> {
    let raw: Vec<String> = match v {
        Value::Null | Value::Object(_) => return None,
        Value::Array(items) => items
            .iter()
            .map(|i| match i {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        other => vec![other.to_string()],
    };

    let mut seen = HashSet::new();
    let zones: Vec<String> = raw
        .into_iter()
        .filter(|z| !z.is_empty())
        .filter(|z| seen.insert(z.to_lowercase()))
        .collect();

    (!zones.is_empty()).then_some(zones)
}
