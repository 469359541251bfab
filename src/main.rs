#[tokio::main]
async fn main() {
    if let Err(e) = healthpal_lib::run().await {
        tracing::error!("HealthPal failed to start: {e}");
        eprintln!("healthpal: {e}");
        std::process::exit(1);
    }
}
