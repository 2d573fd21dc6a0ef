// ==========================================
// 矿石配矿堆料系统 - 批次暂存表仓储
// ==========================================
// 表: stg_lots_daily
// 红线: Repository 不含业务逻辑（最新装载筛选由批次准备完成）
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::RawLotRecord;
use crate::importer::parse_loaded_at;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SELECT_LOT_COLUMNS: &str = "codigo, zona, tmh, humedad_pct, tms, au_oz_tc, au_gr_ton, \
     au_fino, ag_oz_tc, ag_gr_ton, ag_fino, cu_pct, nacn_kg_t, naoh_kg_t, rec_pct, loaded_at";

// ==========================================
// LotRepository - 批次暂存表仓储
// ==========================================
pub struct LotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LotRepository {
    /// 打开数据库并确保表结构存在
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例（调用方负责建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入暂存表
    ///
    /// # 返回
    /// - Ok(usize): 写入行数（缺少编号的记录跳过）
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn insert_batch(&self, records: &[RawLotRecord]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        let mut skipped = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO stg_lots_daily (
                    codigo, zona, tmh, humedad_pct, tms, au_oz_tc, au_gr_ton, au_fino,
                    ag_oz_tc, ag_gr_ton, ag_fino, cu_pct, nacn_kg_t, naoh_kg_t, rec_pct, loaded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            )?;
            for rec in records {
                let Some(code) = rec.code.as_deref() else {
                    skipped += 1;
                    continue;
                };
                stmt.execute(params![
                    code,
                    rec.zone,
                    rec.wet_mass,
                    rec.moisture_pct,
                    rec.dry_mass,
                    rec.grade_oz_tc,
                    rec.grade,
                    rec.fine_content,
                    rec.ag_grade_oz_tc,
                    rec.ag_grade,
                    rec.ag_fine_content,
                    rec.impurity_pct,
                    rec.reagent_a,
                    rec.reagent_b,
                    rec.recovery_pct,
                    rec.loaded_at.map(|t| t.to_rfc3339()),
                ])?;
                count += 1;
            }
        }
        tx.commit()?;

        if skipped > 0 {
            warn!(skipped, "缺少编号的记录未写入暂存表");
        }
        info!(count, "暂存表写入完成");
        Ok(count)
    }

    /// 读取暂存表全部记录（按写入顺序，row_number 从 1 开始）
    pub fn load_all(&self) -> RepositoryResult<Vec<RawLotRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM stg_lots_daily ORDER BY rowid", SELECT_LOT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_staged_row)?;

        let mut records = Vec::new();
        for (idx, row) in rows.enumerate() {
            let mut rec = finish_record(row?)?;
            rec.row_number = idx + 1;
            records.push(rec);
        }
        debug!(count = records.len(), "暂存表读取完成");
        Ok(records)
    }

    /// 清空暂存表
    pub fn clear(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM stg_lots_daily", [])?)
    }

    /// 最新一次装载中的区域列表
    ///
    /// 无任何装载时间时取全表；大小写不敏感去重（保留首次出现的写法），按字母序排序
    pub fn zones_latest_load(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT zona FROM stg_lots_daily
            WHERE zona IS NOT NULL AND TRIM(zona) <> ''
              AND (
                loaded_at IS NULL AND (SELECT MAX(loaded_at) FROM stg_lots_daily) IS NULL
                OR loaded_at = (SELECT MAX(loaded_at) FROM stg_lots_daily)
              )
            ORDER BY rowid
            "#,
        )?;
        let zones = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for zone in zones {
            let zone = zone?.trim().to_string();
            if seen.insert(zone.to_lowercase()) {
                out.push(zone);
            }
        }
        out.sort_by_key(|z| z.to_lowercase());
        Ok(out)
    }
}

/// 暂存表行（loaded_at 仍为文本）
pub(crate) struct StagedRow {
    pub record: RawLotRecord,
    pub loaded_at: Option<String>,
}

pub(crate) fn map_staged_row(row: &Row<'_>) -> rusqlite::Result<StagedRow> {
    Ok(StagedRow {
        record: RawLotRecord {
            code: row.get(0)?,
            zone: row.get(1)?,
            wet_mass: row.get(2)?,
            moisture_pct: row.get(3)?,
            dry_mass: row.get(4)?,
            grade_oz_tc: row.get(5)?,
            grade: row.get(6)?,
            fine_content: row.get(7)?,
            ag_grade_oz_tc: row.get(8)?,
            ag_grade: row.get(9)?,
            ag_fine_content: row.get(10)?,
            impurity_pct: row.get(11)?,
            reagent_a: row.get(12)?,
            reagent_b: row.get(13)?,
            recovery_pct: row.get(14)?,
            loaded_at: None,
            row_number: 0,
        },
        loaded_at: row.get(15)?,
    })
}

/// 解析装载时间文本，补全记录
pub(crate) fn finish_record(staged: StagedRow) -> RepositoryResult<RawLotRecord> {
    let mut record = staged.record;
    if let Some(text) = staged.loaded_at.filter(|t| !t.trim().is_empty()) {
        let ts = parse_loaded_at(&text).ok_or_else(|| RepositoryError::FieldValueError {
            field: "loaded_at".to_string(),
            message: format!("无法解析装载时间: {}", text),
        })?;
        record.loaded_at = Some(ts);
    }
    Ok(record)
}
