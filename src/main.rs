use imagenio::{
    logger::{self, LogLevel, LoggerConfig},
    AppConfig, ModelClients,
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let config = AppConfig::from_env()?;

    let mut logger_config = if config.json_logs {
        LoggerConfig::production()
    } else {
        LoggerConfig::development().with_level(LogLevel::Info)
    };
    if let Some(level) = config.log_level.as_deref().and_then(LogLevel::parse) {
        logger_config = logger_config.with_level(level);
    }
    logger::init_with_config(logger_config)?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    logger::log_startup_info(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        &config.host,
        config.port,
    );
    logger::log_config_info(&config);

    log::info!("🔄 Creating model clients...");
    let clients = match ModelClients::new(&config).await {
        Ok(clients) => clients,
        Err(e) => {
            log::error!("❌ Failed to initialize model clients: {}", e);
            return Err(e.into());
        }
    };

    imagenio::server::run(&config, clients).await?;
    Ok(())
}
