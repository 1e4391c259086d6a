//! `hrmigrate dispatch` command implementation

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use std::sync::Arc;
use tracing::info;

use hrmigrate_server::config::MigrationConfig;
use hrmigrate_server::db::{create_pool, DbConfig, EnvConnectParams};
use hrmigrate_server::migration::{
    BatchInvoker, DispatchReport, Dispatcher, ErrorReporter, HttpInvoker, LocalInvoker, PgLoader,
    Pipeline,
};

use super::open_storage;
use crate::error::{CliError, Result};
use crate::DispatchArgs;

/// Longest response body shown per batch in the summary table
const BODY_PREVIEW_CHARS: usize = 80;

/// Environment settings overridden by whatever flags were given
pub fn effective_config(args: &DispatchArgs, base: MigrationConfig) -> Result<MigrationConfig> {
    let config = MigrationConfig {
        batch_size: args.batch_size.unwrap_or(base.batch_size),
        concurrency: args.concurrency.unwrap_or(base.concurrency),
        bucket: args.bucket.clone().unwrap_or(base.bucket),
        ..base
    };
    config.validate().map_err(CliError::config)?;
    Ok(config)
}

pub async fn run(args: DispatchArgs) -> Result<()> {
    let base = MigrationConfig::from_env().map_err(CliError::config)?;
    let config = effective_config(&args, base)?;
    let store = open_storage().await?;

    // In-process runs own a pool for the whole file; remote runs need none
    let mut pool = None;
    let invoker: Arc<dyn BatchInvoker> = match args.endpoint.as_deref() {
        Some(endpoint) => {
            info!(endpoint, "Dispatching to remote server");
            Arc::new(HttpInvoker::new(endpoint)?)
        },
        None => {
            let db = create_pool(&EnvConnectParams, &DbConfig::from_env()?).await?;
            let pipeline = Pipeline::new(
                Arc::new(PgLoader::new(db.clone())),
                ErrorReporter::with_prefix(store.clone(), config.error_prefix.clone()),
            );
            pool = Some(db);
            Arc::new(LocalInvoker::new(pipeline))
        },
    };

    let dispatcher = Dispatcher::new(invoker, store, config.dispatch_config());
    let result = dispatcher
        .dispatch_object(&config.bucket, &args.key, args.table.as_deref())
        .await;

    if let Some(pool) = pool {
        pool.close().await;
    }

    print_report(&result?);
    Ok(())
}

fn preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

pub fn report_table(report: &DispatchReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Batch", "Size", "Status", "Outcome", "Response"]);
    for entry in &report.entries {
        let outcome = if entry.is_passed() { "Passed" } else { "Failed" };
        table.add_row(vec![
            entry.batch_id.to_string(),
            entry.batch_size.to_string(),
            entry.invocation_status.to_string(),
            outcome.to_string(),
            preview(&entry.response_body),
        ]);
    }
    table
}

fn print_report(report: &DispatchReport) {
    println!("{} {}", "Table:".cyan().bold(), report.table);
    println!("{}", report_table(report));

    let summary = format!(
        "{} batches: {} succeeded, {} failed",
        report.entries.len(),
        report.succeeded(),
        report.failed()
    );
    if report.failed() == 0 {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    println!(
        "Audit log: s3://{}/{}",
        report.audit_artifact.bucket, report.audit_artifact.key
    );
}
