use clap::Parser;
use geotax_etl::domain::ports::OrderRepository;
use geotax_etl::utils::error::ErrorSeverity;
use geotax_etl::utils::{logger, monitor::ResourceMonitor, validation::Validate};
use geotax_etl::{
    load_tax_table, Cli, Command, CsvOrderRepository, EtlError, GeometryStore, ImportOutcome,
    JurisdictionResolver, MemoryOrderRepository, OrderEngine, Result, TomlConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match TomlConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            tracing::error!(path = %cli.config.display(), "❌ Failed to load configuration: {}", e);
            exit_with(&e);
        }
    };

    // 初始化日誌
    if config.logging.json {
        logger::init_json_logger(&config.logging.level);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting geotax-etl");
    if cli.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    if let Err(e) = run(cli, config).await {
        tracing::error!(
            "❌ geotax-etl failed: {} (Severity: {:?})",
            e,
            e.severity()
        );
        exit_with(&e);
    }
}

async fn run(cli: Cli, config: TomlConfig) -> Result<()> {
    let mut monitor = ResourceMonitor::new(cli.monitor);
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let store = GeometryStore::from_file(&config.data.boundaries)?;
    let taxes = load_tax_table(&config.data.jurisdictions)?;
    let resolver = Arc::new(JurisdictionResolver::new(store, taxes));
    monitor.log_phase("reference data loaded");

    if let Command::Resolve {
        longitude,
        latitude,
    } = cli.command
    {
        let name = resolver.jurisdiction_name(longitude, latitude);
        match resolver.resolve(longitude, latitude) {
            Some(tax) => {
                println!("📍 {}", name.unwrap_or_default());
                println!("{}", serde_json::to_string_pretty(tax)?);
            }
            None => println!("📍 No taxed jurisdiction contains ({}, {})", longitude, latitude),
        }
        return Ok(());
    }

    let (repository, output): (Arc<dyn OrderRepository>, Option<PathBuf>) = if cli.dry_run {
        tracing::info!("🧪 Dry run: orders are kept in memory only");
        let memory: Arc<dyn OrderRepository> = Arc::new(MemoryOrderRepository::new());
        (memory, None)
    } else {
        let store = CsvOrderRepository::open(&config.output.path)?;
        let path = store.path().to_path_buf();
        let csv: Arc<dyn OrderRepository> = Arc::new(store);
        (csv, Some(path))
    };
    let engine = OrderEngine::new(resolver, repository, config.engine_settings());

    if let Command::Show { id } = cli.command {
        let order = engine.get_order(id).await?;
        println!("{}", serde_json::to_string_pretty(&order)?);
        return Ok(());
    }

    if let Some(query) = cli.command.list_query() {
        let page = engine.list_orders(query).await?;
        println!("{}", serde_json::to_string_pretty(&page)?);
        println!(
            "📄 page {} ({} of {} orders)",
            query.page,
            page.orders.len(),
            page.total
        );
        return Ok(());
    }

    if let Some(request) = cli.command.create_request() {
        let order = engine.create_order(request).await?;
        println!("✅ Order {} {}", order.id, order.status.as_str());
        println!("{}", serde_json::to_string_pretty(&order)?);
        return Ok(());
    }

    if let Command::Import { file } = &cli.command {
        let handle = engine.submit_import_file(file)?;
        let summary = handle.await.map_err(|e| EtlError::PersistenceError {
            message: format!("import task failed: {}", e),
        })?;
        monitor.log_phase("import finished");

        match summary.outcome {
            ImportOutcome::Completed => println!("✅ Import completed"),
            ImportOutcome::TimedOut => println!("⏱️ Import stopped at the deadline"),
            ImportOutcome::ReadFailed => println!("⚠️ Import stopped on a read error"),
        }
        println!(
            "📊 processed: {}, failed: {}, batches: {} ok / {} failed, elapsed: {:?}",
            summary.processed,
            summary.failed,
            summary.batches_flushed,
            summary.batches_failed,
            summary.elapsed
        );
        match &output {
            Some(path) => println!("📁 Output saved to: {}", path.display()),
            None => println!("🧪 Dry run: nothing was written"),
        }
    }

    Ok(())
}

fn exit_with(e: &EtlError) -> ! {
    eprintln!("❌ {}", e);
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0, // 警告，但成功
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
