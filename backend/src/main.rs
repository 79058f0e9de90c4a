#[tokio::main]
async fn main() -> anyhow::Result<()> {
    client::start_client().await?;

    Ok(())
}
