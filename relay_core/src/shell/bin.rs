// Binary entry point for relay
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = relay_core::shell::run().await {
        eprintln!("relay fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
