use clap::Parser;
use client::{Client, ClientConfig, Settings};

mod cli;
mod commands;
mod render;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = cli::Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut settings);
    let config = ClientConfig::resolve(&settings)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "alirantunai={level},client={level}",
            level = config.log_level
        ))
        .with_writer(std::io::stderr)
        .init();

    let client = Client::builder().config(config).build()?;
    tracing::debug!("using {}", client.api().base_url());

    if let Err(err) = commands::run(&client, cli.command).await {
        tracing::debug!("command failed: {err}");
        eprintln!("{}", render::error_line(&err));
        std::process::exit(1);
    }
    Ok(())
}
