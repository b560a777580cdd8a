use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    trafficmeter_cli::cli::app::run().await
}
