// ==========================================
// 铁路罐车检修排程系统 - 命令行入口
// ==========================================
// 用法: railcar-shopping [db_path] <command>
//   init                                    建库并写入默认引擎配置
//   drain-outbox                            处理一轮发件箱 (日志处理者)
//   capacity-init <月份,...> [默认产能]     幂等初始化全部在用厂修的台账
// ==========================================

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use railcar_shopping::app::{get_default_db_path, AppState};
use railcar_shopping::engine::LoggingSideEffectHandler;

const USAGE: &str = "用法: railcar-shopping [db_path] <init | drain-outbox | capacity-init <YYYY-MM,...> [default_capacity]>";

fn is_command(arg: &str) -> bool {
    matches!(arg, "init" | "drain-outbox" | "capacity-init")
}

#[tokio::main]
async fn main() -> Result<()> {
    railcar_shopping::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", railcar_shopping::APP_NAME, railcar_shopping::VERSION);
    tracing::info!("==================================================");

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.first() {
        Some(first) if !is_command(first) => args.remove(0),
        _ => get_default_db_path(),
    };
    tracing::info!(db_path = %db_path, "使用数据库");

    let command = args.first().cloned().ok_or_else(|| anyhow!(USAGE))?;
    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    match command.as_str() {
        "init" => {
            tracing::info!(
                config_version = state.config.config_version,
                "数据库与引擎配置已就绪"
            );
        }
        "drain-outbox" => {
            let worker = state.outbox_worker(Arc::new(LoggingSideEffectHandler));
            let stats = worker.drain_once().await.context("发件箱处理失败")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "capacity-init" => {
            let months: Vec<String> = args
                .get(1)
                .ok_or_else(|| anyhow!(USAGE))?
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            let default_capacity = match args.get(2) {
                Some(raw) => Some(
                    raw.parse::<i64>()
                        .with_context(|| format!("无效的默认产能: {}", raw))?,
                ),
                None => None,
            };
            let inserted = state
                .capacity_api
                .initialize_capacity(&[], &months, default_capacity)?;
            println!("新建台账记录: {}", inserted);
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}
