#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    baholash_server::run().await
}
