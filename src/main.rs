use skytap_provider::{init_logging, serve, BoxError, SkytapProvider};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "starting Skytap provider");
    serve(SkytapProvider::new()).await
}
