//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use transferit_client::{TransferClient, TransferOptions, TransferSummary};
use transferit_server::{TransferServer, TransferService};
use transferit_transfer::{SessionSnapshot, TransferCoordinator, TransferId};

use crate::Command;
use crate::config::Config;

pub async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Serve => serve(config).await,
        Command::Upload {
            file,
            transfer_id,
            chunk_size,
        } => upload(config, &file, transfer_id.as_deref(), chunk_size).await,
        Command::Download {
            transfer_id,
            output,
        } => download(config, &parse_id(&transfer_id)?, &output).await,
        Command::Status { transfer_id } => status(config, &parse_id(&transfer_id)?).await,
    }
}

/// Runs the server until Ctrl-C.
async fn serve(config: Config) -> anyhow::Result<()> {
    let coordinator = Arc::new(TransferCoordinator::new(config.coordinator_config()));
    let server = TransferServer::new(
        config.server_config(),
        TransferService::new(Arc::clone(&coordinator)),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        max_chunk_size = config.transfer.max_chunk_size,
        "starting transferit server"
    );

    let mut task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.run().await }
    });

    tokio::select! {
        result = &mut task => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    server.shutdown();
    task.await??;
    tracing::info!(
        transfers = coordinator.active_transfers(),
        "server shut down cleanly"
    );
    Ok(())
}

async fn upload(
    config: Config,
    file: &Path,
    transfer_id: Option<&str>,
    chunk_size: Option<usize>,
) -> anyhow::Result<()> {
    let client = connect(&config).await?;
    let id = match transfer_id {
        Some(raw) => parse_id(raw)?,
        None => client
            .init_upload()
            .await
            .context("starting transfer")?,
    };
    // The downloader needs this id.
    println!("{id}");

    let opts = TransferOptions {
        chunk_size: chunk_size.unwrap_or(config.transfer.chunk_size),
        retry: config.retry_config(),
        on_progress: None,
    };
    let summary = transferit_client::upload_file(&client, &id, file, &opts)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;
    report("uploaded", &summary);

    client.close().await;
    Ok(())
}

async fn download(config: Config, id: &TransferId, output: &Path) -> anyhow::Result<()> {
    let client = connect(&config).await?;
    let opts = TransferOptions {
        retry: config.retry_config(),
        ..TransferOptions::default()
    };
    let summary = transferit_client::download_file(&client, id, output, &opts)
        .await
        .with_context(|| format!("downloading {id} into {}", output.display()))?;
    report("downloaded", &summary);

    client.close().await;
    Ok(())
}

async fn status(config: Config, id: &TransferId) -> anyhow::Result<()> {
    let client = connect(&config).await?;
    let snapshot = client
        .transfer_status(id)
        .await
        .with_context(|| format!("querying {id}"))?;
    println!("{}", format_status(id, &snapshot));

    client.close().await;
    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<TransferClient> {
    let url = config.server_url();
    TransferClient::connect(&url)
        .await
        .with_context(|| format!("connecting to {url}"))
}

fn parse_id(raw: &str) -> anyhow::Result<TransferId> {
    raw.parse()
        .with_context(|| format!("invalid transfer id {raw:?}"))
}

fn report(verb: &str, summary: &TransferSummary) {
    tracing::info!(
        chunks = summary.chunks,
        bytes = summary.bytes,
        elapsed = ?summary.elapsed,
        "{verb} {} bytes",
        summary.bytes
    );
}

fn format_status(id: &TransferId, s: &SessionSnapshot) -> String {
    let number = |n: Option<u64>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
    format!(
        "transfer:       {id}\n\
         pending chunk:  {}\n\
         last confirmed: {}\n\
         uploaded:       {} chunks, {} bytes",
        number(s.pending_chunk_number),
        number(s.last_consumed_number),
        s.uploaded_chunks,
        s.uploaded_bytes,
    )
}
