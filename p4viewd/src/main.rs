use std::path::PathBuf;

use p4viewd::daemon::{DaemonConfig, DaemonRuntime, format_entries, scan_once};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run,
    Help,
    Scan(PathBuf),
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => mode = CliMode::Help,
            "--scan" => {
                let Some(dir) = args.next() else {
                    anyhow::bail!("--scan requires a directory");
                };
                mode = CliMode::Scan(PathBuf::from(dir));
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: p4viewd [--scan <dir>]");
        println!("  --scan <dir>   Print the version of every file under <dir> and exit");
        return Ok(());
    }
    let config = DaemonConfig::from_env()?;
    if let CliMode::Scan(dir) = mode {
        let dir = std::path::absolute(&dir)?;
        for line in format_entries(&scan_once(&config, &dir).await?) {
            println!("{line}");
        }
        return Ok(());
    }
    let daemon = DaemonRuntime::bootstrap(config).await?;
    daemon.run().await
}
