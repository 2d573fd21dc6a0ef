// ==========================================
// 矿石配矿堆料系统 - 分配结果仓储
// ==========================================
// 表: res_pile_1 / res_pile_2 / res_pile_3 / stg_lots_daily_rec / solve_run
// 语义: 每次求解整表替换（删除 + 分块插入，同一事务）
// ==========================================

use crate::config::SolverConfig;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::{PileRow, PileType, RawLotRecord, RecoveryBand, RejectRow, ViewKind};
use crate::engine::AllocationResult;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::lot_repo::{finish_record, map_staged_row};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// 每条 INSERT 语句的最大行数
pub const INSERT_CHUNK_ROWS: usize = 500;

/// 求解记录（solve_run）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRun {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub config_json: String,
    pub lots_in: usize,
    pub res_pile_1_rows: usize,
    pub res_pile_2_rows: usize,
    pub res_pile_3_rows: usize,
    pub rec_rows: usize,
}

pub struct ResultRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ResultRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存一次求解的全部结果并记录 solve_run
    ///
    /// 三张结果表与低回收率表在同一事务内整表替换，失败时全部回滚
    #[instrument(skip(self, result, config))]
    pub fn save_result(
        &self,
        result: &AllocationResult,
        config: &SolverConfig,
        lots_in: usize,
    ) -> RepositoryResult<SolveRun> {
        let mut counts = [0usize; 3];
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        for (slot, view) in result.views().iter().enumerate() {
            counts[slot] = replace_pile_rows(&tx, view.kind, &view.rows())?;
        }
        let rec_rows = replace_reject_rows(&tx, &result.rejects)?;

        let run = SolveRun {
            run_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            config_json: serde_json::to_string(config)?,
            lots_in,
            res_pile_1_rows: counts[0],
            res_pile_2_rows: counts[1],
            res_pile_3_rows: counts[2],
            rec_rows,
        };
        tx.execute(
            r#"
            INSERT INTO solve_run (
                run_id, created_at, config_json, lots_in,
                res_pile_1_rows, res_pile_2_rows, res_pile_3_rows, rec_rows
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                run.run_id,
                run.created_at.to_rfc3339(),
                run.config_json,
                run.lots_in as i64,
                run.res_pile_1_rows as i64,
                run.res_pile_2_rows as i64,
                run.res_pile_3_rows as i64,
                run.rec_rows as i64,
            ],
        )?;
        tx.commit()?;

        info!(
            run_id = %run.run_id,
            res_pile_1 = run.res_pile_1_rows,
            res_pile_2 = run.res_pile_2_rows,
            res_pile_3 = run.res_pile_3_rows,
            rec = run.rec_rows,
            "求解结果已落库"
        );
        Ok(run)
    }

    /// 单独替换某个视图的结果表
    pub fn replace_view(&self, view: ViewKind, rows: &[PileRow]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let n = replace_pile_rows(&tx, view, rows)?;
        tx.commit()?;
        Ok(n)
    }

    /// 读取某个视图的结果表（按堆号、写入顺序）
    pub fn load_view(&self, view: ViewKind) -> RepositoryResult<Vec<PileRow>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY pile_code, rowid",
            PileRow::COLUMNS.join(", "),
            view.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                PileRow {
                    pile_code: 0,
                    pile_type: PileType::Batch,
                    code: row.get(2)?,
                    zone: row.get(3)?,
                    wet_mass: row.get(4)?,
                    moisture_pct: row.get(5)?,
                    dry_mass: row.get(6)?,
                    grade_oz_tc: row.get(7)?,
                    grade: row.get(8)?,
                    fine_content: row.get(9)?,
                    ag_grade_oz_tc: row.get(10)?,
                    ag_grade: row.get(11)?,
                    ag_fine_content: row.get(12)?,
                    impurity_pct: row.get(13)?,
                    reagent_a: row.get(14)?,
                    reagent_b: row.get(15)?,
                    recovery_pct: row.get(16)?,
                },
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (code, pile_type, mut pile_row) = row?;
            pile_row.pile_code = u32::try_from(code).map_err(|_| RepositoryError::FieldValueError {
                field: "pile_code".to_string(),
                message: format!("堆号越界: {}", code),
            })?;
            pile_row.pile_type = match pile_type.as_str() {
                "varios" => PileType::Varios,
                "batch" => PileType::Batch,
                other => {
                    return Err(RepositoryError::FieldValueError {
                        field: "pile_type".to_string(),
                        message: format!("未知堆类型: {}", other),
                    })
                }
            };
            out.push(pile_row);
        }
        Ok(out)
    }

    /// 读取低回收率未使用批次表
    pub fn load_rejects(&self) -> RepositoryResult<Vec<(String, RecoveryBand)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT codigo, rec_class FROM stg_lots_daily_rec ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (code, label) = row?;
            let band = [RecoveryBand::From80To85, RecoveryBand::From70To80, RecoveryBand::Below70]
                .into_iter()
                .find(|b| b.label() == label)
                .ok_or_else(|| RepositoryError::FieldValueError {
                    field: "rec_class".to_string(),
                    message: format!("未知回收率分档: {}", label),
                })?;
            out.push((code, band));
        }
        Ok(out)
    }

    /// 暂存表中未被该视图使用的批次
    ///
    /// 排序: 区域、编号升序，同编号按装载时间降序
    pub fn unused_lots(&self, view: ViewKind) -> RepositoryResult<Vec<RawLotRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT s.codigo, s.zona, s.tmh, s.humedad_pct, s.tms, s.au_oz_tc, s.au_gr_ton,
                   s.au_fino, s.ag_oz_tc, s.ag_gr_ton, s.ag_fino, s.cu_pct, s.nacn_kg_t,
                   s.naoh_kg_t, s.rec_pct, s.loaded_at
            FROM stg_lots_daily s
            WHERE s.codigo NOT IN (SELECT r.codigo FROM {} r)
            ORDER BY s.zona, s.codigo, s.loaded_at DESC
            "#,
            view.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_staged_row)?;

        let mut out = Vec::new();
        for (idx, row) in rows.enumerate() {
            let mut rec = finish_record(row?)?;
            rec.row_number = idx + 1;
            out.push(rec);
        }
        debug!(view = %view, unused = out.len(), "未使用批次查询完成");
        Ok(out)
    }

    /// 最近的求解记录
    pub fn latest_run(&self) -> RepositoryResult<Option<SolveRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, created_at, config_json, lots_in,
                   res_pile_1_rows, res_pile_2_rows, res_pile_3_rows, rec_rows
            FROM solve_run ORDER BY created_at DESC, rowid DESC LIMIT 1
            "#,
        )?;
        let mut rows = stmt.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let created_at: String = row.get(1)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| RepositoryError::FieldValueError {
                field: "created_at".to_string(),
                message: e.to_string(),
            })?
            .with_timezone(&Utc);
        let count = |idx: usize| -> rusqlite::Result<usize> {
            row.get::<_, i64>(idx).map(|v| v.max(0) as usize)
        };

        Ok(Some(SolveRun {
            run_id: row.get(0)?,
            created_at,
            config_json: row.get(2)?,
            lots_in: count(3)?,
            res_pile_1_rows: count(4)?,
            res_pile_2_rows: count(5)?,
            res_pile_3_rows: count(6)?,
            rec_rows: count(7)?,
        }))
    }
}

// ==========================================
// 整表替换
// ==========================================

fn replace_pile_rows(tx: &Transaction<'_>, view: ViewKind, rows: &[PileRow]) -> RepositoryResult<usize> {
    let table = view.table_name();
    tx.execute(&format!("DELETE FROM {}", table), [])?;
    let n = insert_chunked(tx, table, &PileRow::COLUMNS, rows.iter().map(pile_row_values).collect())?;
    debug!(table, rows = n, "结果表替换完成");
    Ok(n)
}

fn replace_reject_rows(tx: &Transaction<'_>, rows: &[RejectRow]) -> RepositoryResult<usize> {
    tx.execute("DELETE FROM stg_lots_daily_rec", [])?;
    insert_chunked(
        tx,
        "stg_lots_daily_rec",
        &RejectRow::COLUMNS,
        rows.iter().map(reject_row_values).collect(),
    )
}

/// 分块多值插入（每块最多 INSERT_CHUNK_ROWS 行）
fn insert_chunked(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[&str],
    rows: Vec<Vec<Value>>,
) -> RepositoryResult<usize> {
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let mut inserted = 0;

    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            vec![placeholders.as_str(); chunk.len()].join(", ")
        );
        inserted += tx.execute(&sql, params_from_iter(chunk.iter().flatten()))?;
    }
    Ok(inserted)
}

fn real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

fn text(v: Option<&str>) -> Value {
    v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null)
}

fn pile_row_values(row: &PileRow) -> Vec<Value> {
    vec![
        Value::Integer(i64::from(row.pile_code)),
        Value::Text(row.pile_type.as_str().to_string()),
        Value::Text(row.code.clone()),
        text(row.zone.as_deref()),
        real(row.wet_mass),
        real(row.moisture_pct),
        Value::Real(row.dry_mass),
        real(row.grade_oz_tc),
        Value::Real(row.grade),
        Value::Real(row.fine_content),
        real(row.ag_grade_oz_tc),
        real(row.ag_grade),
        real(row.ag_fine_content),
        real(row.impurity_pct),
        real(row.reagent_a),
        real(row.reagent_b),
        Value::Real(row.recovery_pct),
    ]
}

fn reject_row_values(row: &RejectRow) -> Vec<Value> {
    vec![
        Value::Text(row.code.clone()),
        text(row.zone.as_deref()),
        real(row.wet_mass),
        real(row.moisture_pct),
        Value::Real(row.dry_mass),
        real(row.grade_oz_tc),
        Value::Real(row.grade),
        Value::Real(row.fine_content),
        real(row.ag_grade_oz_tc),
        real(row.ag_grade),
        real(row.ag_fine_content),
        real(row.impurity_pct),
        real(row.reagent_a),
        real(row.reagent_b),
        Value::Real(row.recovery_pct),
        Value::Text(row.recovery_band.label().to_string()),
        text(row.loaded_at.map(|t| t.to_rfc3339()).as_deref()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Lot, Pile, PileBasis};
    use crate::engine::ViewResult;

    fn repo() -> ResultRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ResultRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn lot(code: &str, rec: f64) -> Lot {
        Lot {
            code: code.to_string(),
            zone: Some("Z1".to_string()),
            wet_mass: None,
            moisture_pct: None,
            dry_mass: 40.0,
            effective_mass: 40.0,
            grade_oz_tc: None,
            grade: 21.0,
            fine_content: 840.0,
            ag_grade_oz_tc: None,
            ag_grade: None,
            ag_fine_content: None,
            impurity_pct: None,
            reagent_a: Some(5.0),
            reagent_b: None,
            recovery_pct: rec,
            loaded_at: None,
        }
    }

    #[test]
    fn test_save_result_replaces_tables() {
        let repo = repo();
        let config = SolverConfig::default();

        let mut result = AllocationResult::empty(vec![RejectRow::from_lot(
            &lot("R", 75.0),
            RecoveryBand::From70To80,
        )]);
        result.varios = ViewResult::new(
            ViewKind::Varios,
            vec![Pile::new(
                PileType::Varios,
                1,
                PileBasis::new(config.varios.grade_tries[0], true),
                vec![lot("A", 90.0), lot("B", 88.0)],
            )],
        );

        let run = repo.save_result(&result, &config, 3).unwrap();
        assert_eq!(run.res_pile_1_rows, 2);
        assert_eq!(run.res_pile_2_rows, 0);
        assert_eq!(run.rec_rows, 1);

        let rows = repo.load_view(ViewKind::Varios).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pile_type, PileType::Varios);
        assert_eq!(rows[0].reagent_b, None);
        assert_eq!(repo.load_rejects().unwrap(), vec![("R".to_string(), RecoveryBand::From70To80)]);

        // 第二次求解整表替换
        let empty = AllocationResult::empty(Vec::new());
        repo.save_result(&empty, &config, 0).unwrap();
        assert!(repo.load_view(ViewKind::Varios).unwrap().is_empty());
        assert!(repo.load_rejects().unwrap().is_empty());

        let latest = repo.latest_run().unwrap().unwrap();
        assert_eq!(latest.lots_in, 0);
    }

    #[test]
    fn test_chunked_insert_over_chunk_size() {
        let repo = repo();
        let lots: Vec<Lot> = (0..1203).map(|i| lot(&format!("L{:04}", i), 90.0)).collect();
        let rows: Vec<PileRow> = lots
            .iter()
            .map(|l| PileRow::from_lot(l, PileType::Batch, 1))
            .collect();

        assert_eq!(repo.replace_view(ViewKind::BatchSeries, &rows).unwrap(), 1203);
        assert_eq!(repo.load_view(ViewKind::BatchSeries).unwrap().len(), 1203);
    }
}
