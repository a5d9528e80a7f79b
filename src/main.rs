#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = medcbt::run().await {
        eprintln!("medcbt fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
