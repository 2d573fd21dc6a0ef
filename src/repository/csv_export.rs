// ==========================================
// 矿石配矿堆料系统 - 结果 CSV 导出
// ==========================================
// 输出: res_pile_1.csv / res_pile_2.csv / res_pile_3.csv / stg_lots_daily_rec.csv
// 红线: 空表也写出表头
// ==========================================

use crate::domain::{PileRow, RejectRow, ViewKind};
use crate::engine::AllocationResult;
use crate::repository::error::RepositoryResult;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// 低回收率表文件名
pub const REJECT_TABLE: &str = "stg_lots_daily_rec";

/// 写出表头 + 行（表头取自显式列清单，行按字段顺序序列化）
pub fn write_table<W: Write, T: Serialize>(
    writer: W,
    columns: &[&str],
    rows: &[T],
) -> RepositoryResult<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(columns)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_pile_rows<W: Write>(writer: W, rows: &[PileRow]) -> RepositoryResult<()> {
    write_table(writer, &PileRow::COLUMNS, rows)
}

pub fn write_reject_rows<W: Write>(writer: W, rows: &[RejectRow]) -> RepositoryResult<()> {
    write_table(writer, &RejectRow::COLUMNS, rows)
}

/// 将全部结果写入目录，返回写出的文件路径
pub fn export_result(result: &AllocationResult, out_dir: &Path) -> RepositoryResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    for kind in ViewKind::ALL {
        let path = out_dir.join(format!("{}.csv", kind.table_name()));
        let rows = result.view(kind).rows();
        write_pile_rows(fs::File::create(&path)?, &rows)?;
        info!(file = %path.display(), rows = rows.len(), "结果表已写出");
        written.push(path);
    }

    let path = out_dir.join(format!("{}.csv", REJECT_TABLE));
    write_reject_rows(fs::File::create(&path)?, &result.rejects)?;
    info!(file = %path.display(), rows = result.rejects.len(), "低回收率表已写出");
    written.push(path);

    Ok(written)
}
