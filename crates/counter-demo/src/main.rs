use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use counter_demo::CounterPage;
use fault_relay::{
    compose, with_error_boundary, with_monitoring, with_toast, ErrorBoundary, Pipeline,
    PipelineConfig,
};
use parking_lot::Mutex;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Counter demo starting...");

    let config = match PipelineConfig::load(Path::new(".")).await {
        Ok(config) => config.with_env(),
        Err(e) => {
            log::warn!("Failed to load config, using defaults: {}", e);
            PipelineConfig::from_env()
        }
    };
    let toast_duration = config.toast_duration();

    let pipeline = Pipeline::local(config);
    let page = CounterPage::new(&pipeline);
    let boundary = Arc::new(Mutex::new(
        ErrorBoundary::new(pipeline.reporter.clone()).with_component("Home"),
    ));

    let app = compose(vec![
        with_monitoring(pipeline.reporter.clone()),
        with_toast(pipeline.notifier.clone()),
        with_error_boundary(boundary, None),
    ])(Box::new(page.clone()));

    // Click past the upper bound, then exercise the other handlers
    for _ in 0..11 {
        page.increment();
    }
    page.decrement();
    page.toggle_dark_mode();
    page.reset();

    match app.render() {
        Ok(markup) => log::info!("Rendered:\n{}", markup),
        Err(e) => log::error!("Render failed: {}", e),
    }

    tokio::time::sleep(toast_duration + Duration::from_millis(100)).await;
    log::info!(
        "{} toast(s) visible after expiry; state {:?}",
        pipeline.notifier.len(),
        page.state()
    );
}
