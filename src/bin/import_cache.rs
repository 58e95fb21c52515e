// 哈希缓存表维护工具：安装/卸载缓存表，按键或前缀清理缓存记录。
//
// Usage:
//   cargo run --bin import_cache -- install <db_path>
//   cargo run --bin import_cache -- uninstall <db_path>
//   cargo run --bin import_cache -- clear <db_path> <source|transformed> <prefix> <hash_key>
//   cargo run --bin import_cache -- clear-prefix <db_path> <source|transformed> <prefix>

use anyhow::{anyhow, bail, Context};
use import_pipeline::db::{
    install_cache_schema, install_config_schema, open_sqlite_connection, uninstall_cache_schema,
};
use import_pipeline::domain::types::CacheStage;
use import_pipeline::logging;
use import_pipeline::repository::{HashCacheRepository, SqliteHashCacheRepository};
use tracing::info;

const USAGE: &str = "usage: import_cache <install|uninstall> <db_path>\n       import_cache clear <db_path> <source|transformed> <prefix> <hash_key>\n       import_cache clear-prefix <db_path> <source|transformed> <prefix>";

fn next_arg(args: &mut impl Iterator<Item = String>, name: &str) -> anyhow::Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("缺少参数 <{}>\n{}", name, USAGE))
}

fn parse_stage(raw: &str) -> anyhow::Result<CacheStage> {
    raw.parse::<CacheStage>().map_err(|e| anyhow!(e))
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let command = next_arg(&mut args, "command")?;
    let db_path = next_arg(&mut args, "db_path")?;

    match command.as_str() {
        "install" => {
            let conn = open_sqlite_connection(&db_path)
                .with_context(|| format!("无法打开数据库: {}", db_path))?;
            install_cache_schema(&conn).context("缓存表安装失败")?;
            install_config_schema(&conn).context("配置表安装失败")?;
            info!(db_path = %db_path, "缓存表安装完成");
        }
        "uninstall" => {
            let conn = open_sqlite_connection(&db_path)
                .with_context(|| format!("无法打开数据库: {}", db_path))?;
            uninstall_cache_schema(&conn).context("缓存表卸载失败")?;
            info!(db_path = %db_path, "缓存表卸载完成");
        }
        "clear" => {
            let stage = parse_stage(&next_arg(&mut args, "stage")?)?;
            let prefix = next_arg(&mut args, "prefix")?;
            let hash_key = next_arg(&mut args, "hash_key")?;

            let repo = SqliteHashCacheRepository::new(&db_path, stage)?;
            let removed = repo.clear(&prefix, &hash_key)?;
            println!("removed={}", removed);
        }
        "clear-prefix" => {
            let stage = parse_stage(&next_arg(&mut args, "stage")?)?;
            let prefix = next_arg(&mut args, "prefix")?;

            let repo = SqliteHashCacheRepository::new(&db_path, stage)?;
            let removed = repo.clear_prefix(&prefix)?;
            println!("removed={}", removed);
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}
