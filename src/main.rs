use clap::Parser;
use geodata_harvest::core::sources::DataSource;
use geodata_harvest::utils::error::ErrorSeverity;
use geodata_harvest::utils::logger;
use geodata_harvest::{CliArgs, HarvestConfig, Harvester};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting geodata-harvest");
    tracing::info!("📁 Loading settings from: {}", args.config.display());

    // 載入並驗證設定
    let mut config = match HarvestConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if let Some(outpath) = &args.outpath {
        config.outpath = outpath.clone();
        tracing::info!("🔧 Output path overridden to: {}", outpath.display());
    }

    tracing::info!("✅ Settings loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be downloaded");
        perform_dry_run(&config)?;
        return Ok(());
    }

    if args.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let harvester = Harvester::new_with_monitoring(config, args.monitor);

    match harvester.run(None).await {
        Ok(summary) => {
            let failures: Vec<_> = summary
                .fetched
                .failures()
                .chain(summary.masked.failures())
                .collect();
            for (label, reason) in &failures {
                tracing::warn!("⚠️ {}: {}", label, reason);
            }

            println!("✅ Harvest completed!");
            println!(
                "📁 {} file(s) written to {}",
                summary.fetched.fetched_paths().len(),
                harvester.config().outpath.display()
            );
            if harvester.config().data_mask {
                println!("🎭 {} file(s) masked", summary.masked.fetched_paths().len());
            }
            if !failures.is_empty() {
                println!("⚠️ {} item(s) failed, see the log for details", failures.len());
            }
            if args.monitor {
                for phase in &summary.phases {
                    println!("⏱️ {}: {:?}", phase.phase, phase.elapsed);
                }
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Harvest failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &HarvestConfig, args: &CliArgs) {
    println!("📋 Configuration Summary:");
    println!("  Property: {}", config.property_name);
    println!("  Bounding box: {}", config.target_bbox.to_query_value());
    println!("  Output: {}", config.outpath.display());
    println!("  Target CRS: {}", config.target_crs);
    println!(
        "  Sources: {}",
        config.target_sources.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    println!(
        "  Buffer: {}, Mask: {}, Resample: {}",
        config.add_buffer, config.data_mask, config.resample
    );
    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

fn perform_dry_run(config: &HarvestConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Dry Run Analysis:");

    for source in config.data_sources()? {
        println!();
        println!("📡 {} ({} layer(s))", source.name(), source.layer_count());
        match &source {
            DataSource::Soil { layers } => {
                for layer in layers {
                    let url = config
                        .sources
                        .soil
                        .layer_url(&layer.layer)
                        .unwrap_or("<unknown layer>");
                    println!(
                        "  {} {}-{}cm -> {}",
                        layer.layer, layer.depth_min, layer.depth_max, url
                    );
                }
                if config.get_confidence_intervals {
                    println!("  ✅ 5th/95th percentile layers included");
                }
            }
            DataSource::Elevation { layers } => {
                println!("  {:?} -> {}", layers, config.sources.elevation.url);
            }
            DataSource::ElevationGlobal { layers } => {
                println!(
                    "  {:?} -> {} {:?}",
                    layers,
                    config.sources.elevation_global.stac_url,
                    config.sources.elevation_global.collections
                );
            }
            DataSource::Radiometric { layers } => {
                for layer in layers {
                    println!("  {} -> {}", layer, config.sources.radiometric.url);
                }
            }
        }
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during an actual run.");
    Ok(())
}
