// ==========================================
// 矿石配矿堆料系统 - SQLite 连接与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一建表（暂存表、结果表、求解日志）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 覆盖默认数据库路径的环境变量
pub const DB_PATH_ENV: &str = "ORE_BLENDING_APS_DB_PATH";

/// 批次列（暂存表与结果表共用，顺序与 CSV 输出一致）
const LOT_COLUMNS_DDL: &str = r#"
    codigo TEXT NOT NULL,
    zona TEXT,
    tmh REAL,
    humedad_pct REAL,
    tms REAL,
    au_oz_tc REAL,
    au_gr_ton REAL,
    au_fino REAL,
    ag_oz_tc REAL,
    ag_gr_ton REAL,
    ag_fino REAL,
    cu_pct REAL,
    nacn_kg_t REAL,
    naoh_kg_t REAL,
    rec_pct REAL
"#;

/// 配置 SQLite 连接的统一 PRAGMA
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    let mut ddl = String::new();

    ddl.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS stg_lots_daily ({}, loaded_at TEXT);\n",
        LOT_COLUMNS_DDL
    ));
    for table in ["res_pile_1", "res_pile_2", "res_pile_3"] {
        ddl.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (pile_code INTEGER NOT NULL, pile_type TEXT NOT NULL, {});\n",
            table, LOT_COLUMNS_DDL
        ));
    }
    ddl.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS stg_lots_daily_rec ({}, rec_class TEXT NOT NULL, loaded_at TEXT);\n",
        LOT_COLUMNS_DDL
    ));
    ddl.push_str(
        r#"
        CREATE TABLE IF NOT EXISTS solve_run (
            run_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            config_json TEXT NOT NULL,
            lots_in INTEGER NOT NULL,
            res_pile_1_rows INTEGER NOT NULL,
            res_pile_2_rows INTEGER NOT NULL,
            res_pile_3_rows INTEGER NOT NULL,
            rec_rows INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE INDEX IF NOT EXISTS idx_stg_lots_daily_loaded_at ON stg_lots_daily(loaded_at);
        "#,
    );

    conn.execute_batch(&ddl)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 获取默认数据库路径
///
/// # 返回
/// - 设置了 `ORE_BLENDING_APS_DB_PATH` 时使用该值
/// - 否则: 用户数据目录/ore-blending-aps/ore_blending_aps.db
/// - 取不到用户数据目录时: ./ore_blending_aps.db
pub fn get_default_db_path() -> String {
    if let Some(path) = db_path_from_env() {
        return path;
    }

    let mut path = PathBuf::from("./ore_blending_aps.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("ore-blending-aps");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("ore_blending_aps.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 环境变量中显式指定的数据库路径（空白视为未设置）
pub fn db_path_from_env() -> Option<String> {
    std::env::var(DB_PATH_ENV)
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
                 ('stg_lots_daily','res_pile_1','res_pile_2','res_pile_3','stg_lots_daily_rec','solve_run')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }
}
