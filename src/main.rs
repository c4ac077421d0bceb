use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    oemseal::run().await
}
