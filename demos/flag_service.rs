use subscription_flag::server::{serve, FlagState};
use subscription_flag::Client;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // An ephemeral service with its own flag, driven through the client.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, FlagState::new(), async move {
        let _ = shutdown_rx.await;
    }));

    let client = Client::builder().with_base_url(&base_url).build()?;
    println!("status: {}", client.status().await?);
    for _ in 0..3 {
        println!("toggle -> {}", client.toggle().await?);
    }
    println!("set(true) -> {}", client.set(true).await?);

    let _ = shutdown_tx.send(());
    server.await??;
    Ok(())
}
