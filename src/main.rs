// ==========================================
// 诊所管理系统 - 患者批量导入 CLI
// ==========================================
// 用法: clinic-import <文件> [策略] [--db 路径] [--report 输出.csv] [--json-logs]
// 策略: create（默认）/ update_by_id / update_by_reference / merge
// Ctrl-C: 置位取消标记，刷新已入队批次后输出部分结果
// ==========================================

use clap::Parser;
use clinic_import::db::default_db_path;
use clinic_import::importer::{CancelFlag, TracingProgress};
use clinic_import::{logging, ImportApi, APP_NAME, VERSION};
use tracing::{info, warn};

const PROGRESS_LOG_EVERY: usize = 100;

#[derive(Parser, Debug, PartialEq)]
#[command(name = "clinic-import", version, about = "诊所管理系统 - 患者批量导入")]
struct CliArgs {
    /// 导入文件（.csv / .xlsx / .xls / .json）
    file: String,

    /// 冲突策略: create / update_by_id / update_by_reference / merge
    #[arg(default_value = "create")]
    policy: String,

    /// 数据库路径（缺省: CLINIC_IMPORT_DB_PATH 或系统数据目录）
    #[arg(long = "db")]
    db_path: Option<String>,

    /// 导出逐行报告到 CSV
    #[arg(long = "report")]
    report_path: Option<String>,

    /// JSON 格式日志
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    info!("==================================================");
    info!("{}", APP_NAME);
    info!("系统版本: {}", VERSION);
    info!("==================================================");

    let db_path = args.db_path.clone().unwrap_or_else(default_db_path);
    info!("使用数据库: {}", db_path);

    // Ctrl-C → 取消标记
    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在取消导入");
            handle.cancel();
        }
    });

    let api = ImportApi::new(db_path);
    let progress = TracingProgress::new(PROGRESS_LOG_EVERY);
    let summary = api
        .import_patients(&args.file, &args.policy, &progress, &cancel)
        .await?;

    let mut output = serde_json::to_value(&summary)?;
    if let Some(report_path) = &args.report_path {
        api.export_report(&summary, report_path)?;
        info!("报告已导出: {}", report_path);
        if let Some(map) = output.as_object_mut() {
            map.remove("reportRows");
        }
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
