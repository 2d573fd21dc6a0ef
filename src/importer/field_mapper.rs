// ==========================================
// 矿石配矿堆料系统 - 字段映射器
// ==========================================
// 职责: 源表头 → RawLotRecord 字段 + 类型转换
// 红线: 数值无法解析记为 None，不拒绝整行（由批次准备判定）
// ==========================================

use crate::domain::RawLotRecord;
use crate::importer::file_parser::RawRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::trace;

// ==========================================
// 列名别名
// ==========================================
// 第一个为源表（西语）列名，其余为兼容别名
const CODE: &[&str] = &["codigo", "code", "lot_code", "lote"];
const ZONE: &[&str] = &["zona", "zone"];
const WET_MASS: &[&str] = &["tmh", "wet_mass", "wet_tons"];
const MOISTURE: &[&str] = &["humedad_pct", "humedad", "moisture_pct", "moisture"];
const DRY_MASS: &[&str] = &["tms", "dry_mass", "dry_tons"];
const GRADE_OZ_TC: &[&str] = &["au_oz_tc", "grade_oz_tc"];
const GRADE: &[&str] = &["au_gr_ton", "au_g_t", "grade", "grade_g_t"];
const FINE: &[&str] = &["au_fino", "fine_content", "au_fine"];
const AG_GRADE_OZ_TC: &[&str] = &["ag_oz_tc"];
const AG_GRADE: &[&str] = &["ag_gr_ton", "ag_g_t"];
const AG_FINE: &[&str] = &["ag_fino", "ag_fine"];
const IMPURITY: &[&str] = &["cu_pct", "cu", "impurity_pct"];
const REAGENT_A: &[&str] = &["nacn_kg_t", "nacn", "reagent_a"];
const REAGENT_B: &[&str] = &["naoh_kg_t", "naoh", "reagent_b"];
const RECOVERY: &[&str] = &["rec_pct", "rec", "recovery_pct", "recovery"];
const LOADED_AT: &[&str] = &["loaded_at", "fecha_carga", "load_time"];

pub struct LotFieldMapper;

impl LotFieldMapper {
    /// 行记录 → RawLotRecord（row_number 从 1 开始，不含表头）
    pub fn map_row(&self, row: &RawRow, row_number: usize) -> RawLotRecord {
        let record = RawLotRecord {
            code: self.get_string(row, CODE),
            zone: self.get_string(row, ZONE),

            wet_mass: self.parse_f64(row, WET_MASS),
            moisture_pct: self.parse_f64(row, MOISTURE),
            dry_mass: self.parse_f64(row, DRY_MASS),

            grade_oz_tc: self.parse_f64(row, GRADE_OZ_TC),
            grade: self.parse_f64(row, GRADE),
            fine_content: self.parse_f64(row, FINE),

            ag_grade_oz_tc: self.parse_f64(row, AG_GRADE_OZ_TC),
            ag_grade: self.parse_f64(row, AG_GRADE),
            ag_fine_content: self.parse_f64(row, AG_FINE),

            impurity_pct: self.parse_f64(row, IMPURITY),
            reagent_a: self.parse_f64(row, REAGENT_A),
            reagent_b: self.parse_f64(row, REAGENT_B),
            recovery_pct: self.parse_f64(row, RECOVERY),

            loaded_at: self.parse_datetime(row, LOADED_AT),
            row_number,
        };
        trace!(row = row_number, code = ?record.code, "行映射完成");
        record
    }

    /// 提取字符串字段，按别名顺序取第一个非空值（表头大小写不敏感）
    fn get_string(&self, row: &RawRow, aliases: &[&str]) -> Option<String> {
        for alias in aliases {
            let hit = row.get(*alias).or_else(|| {
                row.iter()
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case(alias))
                    .map(|(_, v)| v)
            });
            if let Some(v) = hit {
                let trimmed = v.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }

    fn parse_f64(&self, row: &RawRow, aliases: &[&str]) -> Option<f64> {
        self.get_string(row, aliases)
            .and_then(|value| parse_locale_number(&value))
    }

    fn parse_datetime(&self, row: &RawRow, aliases: &[&str]) -> Option<DateTime<Utc>> {
        self.get_string(row, aliases)
            .and_then(|value| parse_loaded_at(&value))
    }
}

/// 解析本地化数值
///
/// 兼容小数逗号与千位分隔符:
/// - `"1.234,5"` / `"1,234.5"` → 1234.5（最后出现的分隔符为小数点）
/// - `"12,5"` → 12.5（单个逗号视为小数点）
/// - `"1,234,567"` / `"1.234.567"` → 1234567（多个同类分隔符视为千位）
///
/// 非有限值与无法解析的文本返回 None
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\'')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) | (0, 1) => cleaned,
        (1, 0) => cleaned.replace(',', "."),
        (_, 0) => cleaned.replace(',', ""),
        (0, _) => cleaned.replace('.', ""),
        _ => {
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 解析装载时间（RFC3339 / `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DD`，无时区按 UTC）
pub fn parse_loaded_at(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}
