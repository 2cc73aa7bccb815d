use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing::{info, warn};

use edutrackd::config::{Cli, Command, Config};
use edutrackd::{db, http, ipc};

fn init_tracing(to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if to_stderr {
        // stdout carries protocol lines.
        builder.with_writer(io::stderr).init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.config.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing(false);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(cli.config))
        }
        Command::Stdio => {
            init_tracing(true);
            run_stdio(&cli.config);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let conn = db::open_db(&config.data_dir)?;
    info!(data_dir = %config.data_dir.display(), "database ready");

    let listen = config.listen.clone();
    let state = http::AppState::new(db::Db::new(conn), config);
    let app = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("EduTrack listening on {}", listen);
    axum::serve(listener, app).await?;
    Ok(())
}

fn run_stdio(config: &Config) {
    let mut state = ipc::AppState::new(config.summary_options());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to answer to.
                warn!(error = %e, "unparseable request line");
                serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
