// ==========================================
// 矿石配矿堆料系统 - 导入层
// ==========================================
// 职责: 外部批次表（Excel / CSV）→ RawLotRecord
// ==========================================

pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod lot_importer;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use field_mapper::{parse_loaded_at, parse_locale_number, LotFieldMapper};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRow, UniversalFileParser};
pub use lot_importer::{ImportSummary, LotImporter};
