use std::sync::Arc;

use subscription_flag::store::MemoryStore;
use subscription_flag::widget::{SyncPolicy, Widget};
use subscription_flag::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Expects `cargo run --bin flag-service` on the default port.
    let client = Client::builder()
        .with_base_url("http://localhost:3001")
        .build()?;
    println!("{}", client.debug_info());

    let store = Arc::new(MemoryStore::new());
    let mut widget = Widget::new(client, store).with_policy(SyncPolicy::ServerAuthoritative);

    widget.mount().await;
    println!("{}\n", widget.render());

    for _ in 0..2 {
        widget.handle_subscribe().await;
        println!("{}\n", widget.render());
    }

    Ok(())
}
