//! Reference file server.
//!
//! Every directory below `--root` acts as one target.
//!
//! Run:
//!   mkdir -p data/box
//!   cargo run -p webssh-example-fileserver -- --port 8080 --root data --prefix webssh
//!
//! Then:
//!   curl 'localhost:8080/webssh/check?sshInfo=box'
//!   curl -F sshInfo=box -F path=/tmp -F file=@notes.txt localhost:8080/webssh/file/upload
//!   curl 'localhost:8080/webssh/file/progress?id=t1'

use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webssh_example_fileserver::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("webssh_example_fileserver=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port: u16 = parse_arg(&args, "--port").unwrap_or(8080);
    let root = parse_arg_string(&args, "--root").unwrap_or_else(|| "data".to_string());

    let mut config = ServerConfig::new(root);
    if let Some(prefix) = parse_arg_string(&args, "--prefix") {
        config.prefix = prefix;
    }
    if let Some(limit) = parse_arg(&args, "--max-upload") {
        config.max_upload = limit;
    }
    if let Some(ms) = parse_arg(&args, "--chunk-delay-ms") {
        config.chunk_delay = Duration::from_millis(ms);
    }

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    webssh_example_fileserver::run(addr, config).await
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
