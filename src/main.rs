// ==========================================
// 矿石配矿堆料系统 - 命令行入口
// ==========================================
// 用法:
//   ore-blending-aps <lots.csv|lots.xlsx> [overrides.json] [out_dir]
//
// 设置 ORE_BLENDING_APS_DB_PATH 时同时写入 SQLite（暂存表 + 结果表 + 求解日志）
// 设置 ORE_BLENDING_APS_LOG_JSON 时日志按 JSON 行输出
// ==========================================

use anyhow::{bail, Context, Result};
use ore_blending_aps::db::db_path_from_env;
use ore_blending_aps::repository::export_result;
use ore_blending_aps::{
    logging, AllocationOrchestrator, AllocationResult, ConfigResolver, LotImporter,
    LotRepository, ResultRepository, SolverConfig, APP_NAME, VERSION,
};
use std::path::PathBuf;
use tracing::info;

/// 切换 JSON 日志的环境变量
const LOG_JSON_ENV: &str = "ORE_BLENDING_APS_LOG_JSON";

fn main() -> Result<()> {
    if std::env::var_os(LOG_JSON_ENV).is_some() {
        logging::init_json();
    } else {
        logging::init();
    }

    let mut args = std::env::args().skip(1);
    let Some(lots_path) = args.next().map(PathBuf::from) else {
        bail!("用法: ore-blending-aps <lots.csv|lots.xlsx> [overrides.json] [out_dir]");
    };
    let overrides_path = args.next().map(PathBuf::from);
    let out_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    info!("==================================================");
    info!("{} v{}", APP_NAME, VERSION);
    info!("==================================================");

    // 1. 配置
    let config = match &overrides_path {
        Some(path) => ConfigResolver::resolve_file(path)
            .with_context(|| format!("配置覆盖解析失败: {}", path.display()))?,
        None => SolverConfig::default(),
    };
    config.validate().context("配置不一致")?;

    // 2. 导入
    let (records, summary) = LotImporter::new()
        .import_file(&lots_path)
        .with_context(|| format!("批次文件导入失败: {}", lots_path.display()))?;
    info!(rows = summary.total_rows, "批次导入完成");

    // 3. 求解
    let orchestrator = AllocationOrchestrator::new(config);
    let result = orchestrator.run(&records);
    report(&result);

    // 4. 输出
    let files = export_result(&result, &out_dir)
        .with_context(|| format!("结果写出失败: {}", out_dir.display()))?;
    for file in &files {
        println!("{}", file.display());
    }

    // 5. 落库（可选）
    if let Some(db_path) = db_path_from_env() {
        let lot_repo = LotRepository::new(&db_path).context("打开暂存表失败")?;
        lot_repo.clear()?;
        lot_repo.insert_batch(&records)?;

        let result_repo = ResultRepository::new(&db_path).context("打开结果表失败")?;
        let run = result_repo.save_result(&result, orchestrator.config(), records.len())?;
        info!(db = %db_path, run_id = %run.run_id, "结果已写入数据库");
    }

    Ok(())
}

/// 汇总日志（每个视图每个堆一行）
fn report(result: &AllocationResult) {
    for view in result.views() {
        if view.is_empty() {
            info!(view = %view.kind, "视图无可行堆");
            continue;
        }
        for s in view.summaries() {
            info!(
                view = %view.kind,
                pile_type = %s.pile_type,
                pile_code = s.pile_code,
                lots = s.lot_count,
                tms = s.dry_mass,
                grade = ?s.grade,
                rec = ?s.recovery_pct,
                nacn = ?s.reagent_a,
                naoh = ?s.reagent_b,
                "堆汇总"
            );
        }
    }
    info!(rejects = result.rejects.len(), "低回收率未使用批次");
}
