#[tokio::main]
async fn main() -> anyhow::Result<()> {
    talentgate_lib::run().await
}
