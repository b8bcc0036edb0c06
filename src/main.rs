#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gabarito::run().await {
        eprintln!("gabarito fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
