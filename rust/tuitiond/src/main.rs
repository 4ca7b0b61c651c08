use std::io::{self, BufRead, Write};

use anyhow::Context;
use tracing::{error, info, warn};

use tuitiond::config::Config;
use tuitiond::ipc;

fn init_logging(config: &Config) -> anyhow::Result<()> {
    // stdout carries IPC responses; logs go to stderr.
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level(config.log_level)
        .with_file(true)
        .with_line_number(true)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_logging(&config)?;
    info!("tuitiond {} starting, api {}", env!("CARGO_PKG_VERSION"), config.api_url);

    let mut state = ipc::AppState::new(config)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                let method = req.method.clone();
                let resp = ipc::handle_request(&mut state, req);
                if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
                    warn!("{} failed: {}", method, resp["error"]);
                }
                resp
            }
            // No id to echo back.
            Err(e) => serde_json::json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };

        let out = serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
        if writeln!(stdout, "{}", out).and_then(|_| stdout.flush()).is_err() {
            break;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}
