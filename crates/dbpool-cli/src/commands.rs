//! Command implementations

use anyhow::{Context, Result, bail};
use dbpool_connection::DatabasePools;
use dbpool_core::Connection;

use crate::Command;
use crate::output;

pub async fn run(pools: &DatabasePools, command: &Command, json: bool) -> Result<()> {
    match command {
        Command::List => list(pools, json),
        Command::Query { name, sql } => query(pools, name, sql, json).await,
        Command::Exec { name, sql } => exec(pools, name, sql, json).await,
        Command::Check => check(pools, json).await,
    }
}

fn list(pools: &DatabasePools, json: bool) -> Result<()> {
    let registry = pools.registry()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&registry.to_json()?)?);
        return Ok(());
    }

    let mut rows = Vec::new();
    for name in registry.names()? {
        let pool = registry.get(&name)?;
        rows.push(output::PoolRow::from_pool(&pool));
    }
    println!("{}", output::pools_table(&rows));
    Ok(())
}

async fn query(pools: &DatabasePools, name: &str, sql: &str, json: bool) -> Result<()> {
    let conn = pools
        .connection(name)
        .await
        .with_context(|| format!("failed to connect to '{}'", name))?;
    let result = conn.query(sql, &[]).await;
    conn.close().await?;
    let result = result.with_context(|| format!("query failed on '{}'", name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output::rows_json(&result))?);
    } else {
        println!("{}", output::rows_table(&result));
        println!("({} rows)", result.row_count());
    }
    Ok(())
}

async fn exec(pools: &DatabasePools, name: &str, sql: &str, json: bool) -> Result<()> {
    let conn = pools
        .connection(name)
        .await
        .with_context(|| format!("failed to connect to '{}'", name))?;
    let outcome = match conn.execute(sql, &[]).await {
        Ok(result) => conn.commit().await.map(|()| result),
        Err(e) => Err(e),
    };
    conn.close().await?;
    let result = outcome.with_context(|| format!("statement failed on '{}'", name))?;

    if json {
        let value = serde_json::json!({
            "affected_rows": result.affected_rows,
            "last_insert_id": result.last_insert_id,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{} rows affected", result.affected_rows);
    }
    Ok(())
}

async fn check(pools: &DatabasePools, json: bool) -> Result<()> {
    let mut report = Vec::new();
    for name in pools.names()? {
        let status = match pools.connection(&name).await {
            Ok(conn) => conn.close().await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = &status {
            tracing::warn!(target = %name, error = %e, "target check failed");
        }
        report.push((name, status));
    }

    if json {
        let value: Vec<serde_json::Value> = report
            .iter()
            .map(|(name, status)| match status {
                Ok(()) => serde_json::json!({ "name": name, "ok": true }),
                Err(e) => serde_json::json!({ "name": name, "ok": false, "error": e }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", output::check_table(&report));
    }

    let failed = report.iter().filter(|(_, status)| status.is_err()).count();
    if failed > 0 {
        bail!("{} of {} targets failed", failed, report.len());
    }
    Ok(())
}
