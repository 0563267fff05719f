#[tokio::main]
async fn main() {
    if let Err(err) = sm_api::run().await {
        tracing::error!(error = %err, "sm-api failed");
        eprintln!("sm-api failed: {err}");
        std::process::exit(1);
    }
}
