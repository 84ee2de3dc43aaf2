//! AVT Sender - packetize a byte stream
//!
//! Reads stdin or a file in fixed-size chunks and sends each chunk as one
//! media packet on a single stream.

use anyhow::Context;
use avt::io::time::now_ns;
use avt::{Address, Session, Stream};
use avt_cli::config::{Config, OutputConfig, StreamConfig, TagMode};
use avt_cli::send::send_all;
use avt_cli::stats::format_bytes;
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "avt-send")]
#[command(about = "AVT stream sender", long_about = None)]
struct Args {
    /// Input source: file path or '-' for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// TOML configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output address (file:<path>, udp://<ip:port>, null:)
    #[arg(short, long)]
    output: Option<String>,

    /// Additional UDP destination (repeatable)
    #[arg(short, long)]
    destination: Vec<String>,

    /// Codec name
    #[arg(long)]
    codec: Option<String>,

    /// Stream id
    #[arg(long)]
    stream_id: Option<u16>,

    /// Input bytes per media packet
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Maximum payload bytes per packet
    #[arg(long)]
    max_payload: Option<usize>,

    /// Integrity tag (zero, digest)
    #[arg(long)]
    tag: Option<String>,

    /// Print an example configuration and exit
    #[arg(long)]
    example_config: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => {
                let address = self
                    .output
                    .clone()
                    .context("an output address is required without a config file")?;
                Config {
                    output: OutputConfig {
                        address,
                        destinations: Vec::new(),
                        producer_name: "avt-send".to_string(),
                        max_payload: None,
                        tag: TagMode::Zero,
                    },
                    stream: StreamConfig {
                        id: 1,
                        codec: "rawvideo".to_string(),
                        timebase: [1, 1_000_000_000],
                        bitrate: 0,
                        chunk_size: 4096,
                        frame_duration: 20_000_000,
                    },
                }
            }
        };

        if let Some(output) = &self.output {
            config.output.address = output.clone();
        }
        config.output.destinations.extend(self.destination.iter().cloned());
        if let Some(codec) = &self.codec {
            config.stream.codec = codec.clone();
        }
        if let Some(id) = self.stream_id {
            config.stream.id = id;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.stream.chunk_size = chunk_size;
        }
        if self.max_payload.is_some() {
            config.output.max_payload = self.max_payload;
        }
        if let Some(tag) = &self.tag {
            config.output.tag = match tag.as_str() {
                "zero" => TagMode::Zero,
                "digest" => TagMode::Digest,
                other => anyhow::bail!("unknown tag mode {:?}", other),
            };
        }
        config.validate()?;
        Ok(config)
    }
}

fn open_input(input: &str) -> anyhow::Result<Box<dyn Read>> {
    if input == "-" {
        tracing::info!("Reading from stdin");
        Ok(Box::new(io::stdin()))
    } else {
        tracing::info!("Reading from {}", input);
        Ok(Box::new(BufReader::new(File::open(input)?)))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if args.example_config {
        print!("{}", toml::to_string_pretty(&Config::example())?);
        return Ok(());
    }

    let config = args.config()?;
    let address: Address = config.output.address.parse()?;
    tracing::info!("AVT Sender starting, output {}", address);

    let mut session = Session::open(&address, config.output.options())?;
    for destination in &config.output.destinations {
        session.output().add_destination(&destination.parse()?)?;
    }
    session.time_sync(now_ns())?;

    let mut stream = Stream::new(config.stream.id, config.stream.codec_id()?);
    stream.timebase = config.stream.timebase();
    stream.bitrate = config.stream.bitrate;
    session.register(stream)?;

    let mut reader = open_input(&args.input)?;
    let start_time = Instant::now();
    let summary = send_all(session, &config.stream, reader.as_mut())?;
    tracing::info!(
        "Done: {} packets, {} in {:.2}s",
        summary.packets,
        format_bytes(summary.bytes),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
