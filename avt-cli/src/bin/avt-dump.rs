//! AVT Dump - print the packets of a stream
//!
//! Reads a packet stream from a file or UDP address and prints one line per
//! control packet and per complete payload.

use avt::io::UdpIo;
use avt::session::{Input, InputEvent, NoopProtocol};
use avt::Address;
use avt_cli::config::TagMode;
use avt_cli::stats::{describe, display_input_stats};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "avt-dump")]
#[command(about = "AVT stream dumper", long_about = None)]
struct Args {
    /// Input address (file:<path>, udp://<ip:port>)
    input: String,

    /// Integrity tag to verify (zero accepts anything)
    #[arg(long, default_value = "zero")]
    tag: String,

    /// Write reassembled payloads of this stream to a file
    #[arg(long, requires = "output")]
    stream: Option<u16>,

    /// File receiving the payloads selected with --stream
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep reading after a packet fails its integrity check
    #[arg(long)]
    keep_going: bool,

    /// Socket receive buffer size for UDP input
    #[arg(long, default_value = "4194304")]
    recv_buffer: usize,
}

fn open(args: &Args) -> anyhow::Result<Input> {
    let address: Address = args.input.parse()?;
    let tag = match args.tag.as_str() {
        "zero" => TagMode::Zero,
        "digest" => TagMode::Digest,
        other => anyhow::bail!("unknown tag mode {:?}", other),
    };

    match address {
        Address::Udp(addr) => {
            let socket = UdpIo::open(addr, avt::io::OpenMode::Read)?;
            socket.set_recv_buffer_size(args.recv_buffer)?;
            tracing::info!("Listening on {}", socket.local_addr()?);
            let protocol = NoopProtocol::new(Box::new(socket));
            Ok(Input::with_protocol(Box::new(protocol), tag.tag()))
        }
        other => Ok(Input::open(&other, tag.tag())?),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut input = open(&args)?;
    let mut sink = match &args.output {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut payload_bytes = 0u64;
    let start_time = Instant::now();
    loop {
        let event = match input.next_event() {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) if args.keep_going => {
                tracing::warn!("Skipping packet: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match event {
            InputEvent::Control(header) => println!("{}", describe(&header)),
            InputEvent::Payload(done) => {
                println!("{} payload={}", describe(&done.header), done.payload.len());
                payload_bytes += done.payload.len() as u64;
                if let Some(out) = sink.as_mut() {
                    if Some(done.header.stream_id()) == args.stream {
                        out.write_all(&done.payload)?;
                    }
                }
            }
        }
    }

    if let Some(mut out) = sink {
        out.flush()?;
    }
    display_input_stats(&input.stats(), payload_bytes, start_time.elapsed());
    input.close()?;
    Ok(())
}
