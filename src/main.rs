use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use apple_ring::structures::cancel::CancelToken;
use apple_ring::structures::config::{Cli, RingConfig};
use apple_ring::structures::delivery::{ConsoleSink, DeliverySink, FanoutSink, JsonLinesSink};
use apple_ring::structures::error::{ConfigError, RingError};
use apple_ring::structures::prompt::{next_line, spawn_line_reader, LinePrompt, Prompt, RandomPrompt};
use apple_ring::structures::ring::{Ring, RingReport};

fn run(cli: Cli, cancel: CancelToken) -> Result<RingReport, RingError> {
    let config = match &cli.config {
        Some(path) => RingConfig::load(path)?,
        None => RingConfig::default(),
    }
    .merge_cli(&cli);

    let input: Box<dyn BufRead + Send> = match &cli.input {
        Some(path) => {
            let file = File::open(path).map_err(|source| ConfigError::OpenFile { path: path.clone(), source })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };
    let lines = spawn_line_reader(input)?;

    let ring_size = config.resolve_ring_size(cli.nodes.as_deref(), || {
        print!("Input the desired number of nodes for the network: ");
        let _ = io::stdout().flush();
        next_line(&lines, &cancel)
    })?;
    let ring = Ring::new(ring_size)?
        .transport(config.transport)
        .channel_capacity(config.channel_capacity);

    let mut sinks: Vec<Arc<dyn DeliverySink>> = vec![Arc::new(ConsoleSink)];
    if let Some(path) = &config.deliveries {
        let sink = JsonLinesSink::create(path).map_err(|source| ConfigError::OpenFile { path: path.clone(), source })?;
        sinks.push(Arc::new(sink));
    }
    let sink: Arc<dyn DeliverySink> = Arc::new(FanoutSink::new(sinks));

    let prompt: Box<dyn Prompt> = match cli.random {
        Some(count) => {
            info!("Sending {} random messages around a ring of {}", count, ring.ring_size());
            Box::new(RandomPrompt::new(count, cli.seed))
        }
        None => Box::new(LinePrompt::new(lines, cancel.clone(), Box::new(io::stdout()))),
    };
    ring.run(prompt, sink, cancel)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if watcher.is_cancelled() {
                warn!("Second interrupt, exiting without waiting for the ring");
                std::process::exit(130);
            }
            info!("Interrupt received, the ring will shut down after the current lap");
            watcher.cancel();
        }
    });

    let code = match tokio::task::spawn_blocking(move || run(cli, cancel)).await {
        Ok(Ok(report)) => {
            for node in &report.nodes {
                info!(
                    "Node {}: {:?}, received {}, sent {}, delivered {}",
                    node.id, node.exit, node.tokens_received, node.tokens_sent, node.deliveries
                );
            }
            if report.is_clean() { 0 } else { 1 }
        }
        Ok(Err(e)) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            1
        }
        Err(e) => {
            error!("Ring session aborted: {}", e);
            1
        }
    };
    // the stdin reader thread may still be blocked on a read
    std::process::exit(code);
}
