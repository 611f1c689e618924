use anyhow::{Context, Result};
use std::sync::Arc;
use tailor::ai::HttpTailoringService;
use tailor::api::ApiClient;
use tailor::config::{Config, SettingsBackend};
use tailor::resumes::{CachedResumeStore, HttpResumeStore};
use tailor::settings::{HttpSettingStore, LocalSettingStore, SettingStore};
use tailor::shell::{Reply, Shell, parse_command};
use tailor::storage::{DEFAULT_DATA_DIR, FileStore};
use tailor::transcript::TranscriptCache;
use tailor::{Collaborators, Reconciler};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn build_reconciler(config: &Config, initial_query: Option<String>) -> Reconciler {
    let api = ApiClient::new(config.api_url.clone());
    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(|| DEFAULT_DATA_DIR.clone());

    let settings: Arc<dyn SettingStore> = match config.settings_backend {
        SettingsBackend::Remote => Arc::new(HttpSettingStore::new(api.clone())),
        SettingsBackend::Local => Arc::new(LocalSettingStore::new(Arc::new(FileStore::new(
            &data_dir, "settings",
        )))),
    };
    let transcripts = TranscriptCache::with_prefix(
        Arc::new(FileStore::new(&data_dir, "transcripts")),
        config.transcript_prefix.clone(),
    );

    Reconciler::new(
        Collaborators {
            resumes: Arc::new(CachedResumeStore::new(HttpResumeStore::new(api.clone()))),
            settings,
            transcripts,
            tailor: Arc::new(HttpTailoringService::new(api)),
        },
        initial_query,
    )
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(api = %config.api_url, "starting tailor v{}", env!("CARGO_PKG_VERSION"));

    let initial_query = std::env::args().nth(1);
    let reconciler = Arc::new(build_reconciler(&config, initial_query));
    if let Err(err) = reconciler.initialize().await {
        eprintln!("could not open the initial resume: {err}");
    }

    let shell = Shell::new(reconciler);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = read_line(&mut lines, &shell.prompt()).await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        let reply = match shell.execute(command).await {
            Reply::NeedsName => match read_line(&mut lines, "name for this resume: ").await? {
                Some(name) => {
                    shell
                        .execute(tailor::shell::Command::SaveAs(name))
                        .await
                }
                None => break,
            },
            other => other,
        };

        match reply {
            Reply::Text(text) => println!("{text}"),
            Reply::NeedsName => println!("a name is required to save"),
            Reply::Quit => break,
        }
    }

    Ok(())
}
