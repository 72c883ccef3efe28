use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use positioned_io::ReadAt;
use souris::http::HttpReader;
use souris::{Archive, Writer};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "souris")]
#[command(about = "Append-only log archive tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new archive from a list of files
    Create {
        archive: PathBuf,
        files: Vec<PathBuf>,
    },
    /// Append files to an existing archive
    Append {
        archive: PathBuf,
        files: Vec<PathBuf>,
    },
    /// Dump blocks from a local archive
    Read {
        archive: PathBuf,
        /// First block index to dump
        start: Option<u64>,
        /// Stop before this block index
        end: Option<u64>,
        /// Dump newest blocks first
        #[arg(long)]
        reverse: bool,
    },
    /// Serve an archive over HTTP with byte-range support
    Serve {
        archive: PathBuf,
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
    /// Dump blocks from an archive served over HTTP
    Client {
        url: String,
        start: Option<u64>,
        end: Option<u64>,
        /// Dump newest blocks first
        #[arg(long)]
        reverse: bool,
    },
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Commands::Create { archive, files } => {
            let mut w = Writer::create_path(&archive)?;
            let written = add_files(&mut w, &files)?;
            w.commit()?;
            eprintln!("wrote {written} blocks to {}", archive.display());
        }
        Commands::Append { archive, files } => {
            let mut w = Writer::append_path(&archive)?;
            let written = add_files(&mut w, &files)?;
            w.commit()?;
            eprintln!("appended {written} blocks to {}", archive.display());
        }
        Commands::Read {
            archive,
            start,
            end,
            reverse,
        } => {
            let ar = Archive::open(&archive)?;
            dump(&ar, start, end, reverse)?;
        }
        Commands::Serve { archive, addr } => {
            let bytes = std::fs::read(&archive)
                .with_context(|| format!("read {}", archive.display()))?;
            souris::serve::run(addr, bytes, logger())?;
        }
        Commands::Client {
            url,
            start,
            end,
            reverse,
        } => {
            let reader = HttpReader::open(&url)?;
            let ar = Archive::new(reader)?;
            dump(&ar, start, end, reverse)?;
            eprintln!("bytes read: {}", ar.get_ref().bytes_read());
        }
    }
    Ok(())
}

fn logger() -> slog::Logger {
    use slog::Drain;
    slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}

fn add_files<W: positioned_io::WriteAt>(w: &mut Writer<W>, files: &[PathBuf]) -> Result<usize> {
    let mut written = 0;
    for path in files {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        w.add(file)?;
        written += 1;
    }
    Ok(written)
}

fn dump<R: ReadAt>(ar: &Archive<R>, start: Option<u64>, end: Option<u64>, reverse: bool) -> Result<()> {
    let start = start.unwrap_or(0);

    let print = |info: souris::BlockInfo, rd: &mut dyn Read| -> Result<()> {
        let mut payload = Vec::new();
        rd.read_to_end(&mut payload)?;
        let tag: String = info.hash_tag().iter().map(|b| format!("{b:02x}")).collect();
        println!("{}\t{}\t{}", info.index(), tag, STANDARD_NO_PAD.encode(&payload));
        Ok(())
    };

    if reverse {
        let take = ar.count().saturating_sub(start);
        for (info, mut rd) in ar.rev(take) {
            if let Some(end) = end {
                if info.index() >= end {
                    continue;
                }
            }
            print(info, &mut rd)?;
        }
    } else {
        for (info, mut rd) in ar.iter(start) {
            if let Some(end) = end {
                if info.index() >= end {
                    break;
                }
            }
            print(info, &mut rd)?;
        }
    }

    if let Some(err) = ar.take_err() {
        bail!(err);
    }
    Ok(())
}
