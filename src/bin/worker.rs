#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = medcbt::run_worker().await {
        eprintln!("medcbt-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
