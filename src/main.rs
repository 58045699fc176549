use learnhub::{jobs, server, AppContext, LmsResult, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> LmsResult<()> {
    // Load configuration first so the log format can follow it
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| "learnhub=debug,tower_http=debug".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __                          __          __
   / /   ___  ____ __________  / /_  __  __/ /_
  / /   / _ \/ __ `/ ___/ __ \/ __ \/ / / / __ \
 / /___/  __/ /_/ / /  / / / / / / / /_/ / /_/ /
/_____/\___/\__,_/_/  /_/ /_/_/ /_/\__,_/_.___/

        Course progression service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
