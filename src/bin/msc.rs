use anyhow::Result;
use std::sync::Arc;
use monroe_sentinel::{config::Settings, run, AppContext};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let ctx: Arc<AppContext> = AppContext::bootstrap(settings)?;
    run(ctx).await
}
