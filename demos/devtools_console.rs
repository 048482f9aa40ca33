//! Connects to a DevTools endpoint, sends one command and prints responses.
//!
//! ```bash
//! chromium --headless --remote-debugging-port=9222
//! cargo run --example devtools_console -- ws://127.0.0.1:9222/devtools/browser/<id>
//! ```
//!
//! Set `RUST_LOG=devtools_transport=debug` to see the session lifecycle.

use std::env;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use devtools_transport::{BoxError, Session, SessionOutcome, on_ready};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9222/devtools/browser".to_owned());

    let session = Session::builder().build()?;
    let handle = session.handle();

    println!("=== DevTools console ===");
    println!("Session: {}", session.id());
    println!("Endpoint: {url}");

    let ready = on_ready({
        let handle = handle.clone();
        move |_token: CancellationToken| async move {
            let command = json!({ "id": 1, "method": "Browser.getVersion" });
            handle.send(command.to_string())?;
            Ok::<(), BoxError>(())
        }
    });

    let handler = {
        let handle = handle.clone();
        move |message: String, _token: CancellationToken| {
            let handle = handle.clone();
            async move {
                let value: serde_json::Value = serde_json::from_str(&message)?;
                println!("{value:#}");

                if value.get("id").is_some() {
                    handle.request_close();
                }
                Ok::<(), BoxError>(())
            }
        }
    };

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    let outcome = session.connect(&url, handler, Some(ready), token).await?;

    match outcome {
        SessionOutcome::ClosedLocally => println!("Closed"),
        SessionOutcome::ClosedRemotely => println!("Closed by remote"),
        SessionOutcome::Cancelled => println!("Interrupted"),
    }

    Ok(())
}
