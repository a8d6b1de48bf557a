//! Caller - start a plugin container and talk to it over RPC.
//!
//! This example demonstrates:
//! - Creating a client for an image and a daemon endpoint
//! - Calling methods with typed arguments and replies
//! - Reading what the container logged on stderr during each call
//! - Handling a remote error for a method the plugin does not have
//!
//! # Running
//!
//! The image must run a JSON-RPC server on its stdin/stdout that exposes
//! `Plugin.SayHi`. Point `DOCKER_HOST` (and `DOCKER_CERT_PATH` for TLS) at
//! the daemon:
//!
//! ```sh
//! DOCKER_HOST=tcp://192.168.99.100:2376 \
//! DOCKER_CERT_PATH=~/.docker/machine/certs \
//! RUST_LOG=dockerpc=debug \
//!     cargo run --example caller -- docker-plugin:latest
//! ```

use dockerpc::Client;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let image = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "docker-plugin:latest".to_string());

    let mut client = Client::from_env("XXX-test", image)?;

    if let Err(e) = client.start().await {
        eprintln!("start failed: {}", e);
        client.close().await?;
        return Err(e.into());
    }

    for name in ["jen", "bob"] {
        match client.call::<_, String>("Plugin.SayHi", &name).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => eprintln!("Plugin.SayHi({}) failed: {}", name, e),
        }
        eprint!("{}", client.std_error_lossy());
    }

    // Not implemented by the plugin: shows how remote errors surface.
    if let Err(e) = client.call::<_, String>("Plugin.SayHi2", &"jen").await {
        eprintln!("Plugin.SayHi2 failed: {}", e);
    }
    eprint!("{}", client.std_error_lossy());

    client.close().await?;
    Ok(())
}
