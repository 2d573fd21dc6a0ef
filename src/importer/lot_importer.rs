// ==========================================
// 矿石配矿堆料系统 - 批次导入器
// ==========================================
// 流程: 解析 → 映射 → RawLotRecord 列表
// 红线: 导入器不做过滤与去重（最新装载、重复编号由批次准备处理）
// ==========================================

use crate::domain::RawLotRecord;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::LotFieldMapper;
use crate::importer::file_parser::{RawRow, UniversalFileParser};
use std::path::Path;
use tracing::{info, instrument, warn};

/// 编号列的可接受表头
const CODE_HEADERS: [&str; 4] = ["codigo", "code", "lot_code", "lote"];

/// 导入统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub missing_code: usize,
    pub missing_dry_mass: usize,
    pub missing_recovery: usize,
}

pub struct LotImporter {
    parser: UniversalFileParser,
    mapper: LotFieldMapper,
}

impl Default for LotImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl LotImporter {
    pub fn new() -> Self {
        Self {
            parser: UniversalFileParser,
            mapper: LotFieldMapper,
        }
    }

    /// 从 CSV / Excel 文件导入
    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub fn import_file<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> ImportResult<(Vec<RawLotRecord>, ImportSummary)> {
        let rows = self.parser.parse(file_path.as_ref())?;
        info!(total_rows = rows.len(), "文件解析完成");
        self.import_rows(&rows)
    }

    /// 从已解析的行记录导入
    pub fn import_rows(&self, rows: &[RawRow]) -> ImportResult<(Vec<RawLotRecord>, ImportSummary)> {
        if let Some(first) = rows.first() {
            let has_code = first
                .keys()
                .any(|k| CODE_HEADERS.iter().any(|h| k.trim().eq_ignore_ascii_case(h)));
            if !has_code {
                return Err(ImportError::MissingColumn("codigo".to_string()));
            }
        }

        let mut summary = ImportSummary {
            total_rows: rows.len(),
            ..ImportSummary::default()
        };

        let records: Vec<RawLotRecord> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| self.mapper.map_row(row, idx + 1))
            .inspect(|rec| {
                if rec.code.is_none() {
                    summary.missing_code += 1;
                }
                if rec.dry_mass.is_none() {
                    summary.missing_dry_mass += 1;
                }
                if rec.recovery_pct.is_none() {
                    summary.missing_recovery += 1;
                }
            })
            .collect();

        if summary.missing_code > 0 {
            warn!(missing_code = summary.missing_code, "存在缺少编号的行，将在批次准备中剔除");
        }
        info!(
            records = records.len(),
            missing_dry_mass = summary.missing_dry_mass,
            missing_recovery = summary.missing_recovery,
            "批次映射完成"
        );
        Ok((records, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_import_csv_file() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "codigo,zona,tms,au_gr_ton,rec_pct").unwrap();
        writeln!(file, "A,Z1,50,21.5,90").unwrap();
        writeln!(file, ",Z1,40,22,88").unwrap();
        writeln!(file, "C,Z2,x,22,").unwrap();

        let (records, summary) = LotImporter::new().import_file(file.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].row_number, 1);
        assert_eq!(records[2].row_number, 3);
        assert_eq!(summary.missing_code, 1);
        assert_eq!(summary.missing_dry_mass, 1);
        assert_eq!(summary.missing_recovery, 1);
    }

    #[test]
    fn test_missing_code_column() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "zona,tms").unwrap();
        writeln!(file, "Z1,50").unwrap();

        let result = LotImporter::new().import_file(file.path());
        assert!(matches!(result, Err(ImportError::MissingColumn(_))));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "codigo,tms").unwrap();

        let (records, summary) = LotImporter::new().import_file(file.path()).unwrap();
        assert!(records.is_empty());
        assert_eq!(summary.total_rows, 0);
    }
}
