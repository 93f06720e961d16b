use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use exhume_ewf::error::Error;
use exhume_ewf::handle::Handle;
use exhume_ewf::read;

#[derive(Parser)]
#[command(name = "exhume_ewf", author, version, about = "Read, write, and verify EWF/EnCase forensic disk images.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print media values and acquisition metadata for an image.
    Info {
        /// Path to any one segment file belonging to the image (e.g. `case.E01`).
        path: PathBuf,
    },
    /// Read the whole image chunk-by-chunk and report CRC-error sectors.
    Verify {
        path: PathBuf,
    },
    /// Copy the full decoded byte stream out to a plain file.
    Export {
        path: PathBuf,
        out: PathBuf,
    },
    /// Acquire a raw source device into a fresh EWF image.
    Acquire {
        source: PathBuf,
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            exit_code_for(&e)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Error> {
    match command {
        Commands::Info { path } => cmd_info(path),
        Commands::Verify { path } => cmd_verify(path),
        Commands::Export { path, out } => cmd_export(path, out),
        Commands::Acquire { source, out } => cmd_acquire(source, out),
    }
}

fn cmd_info(path: PathBuf) -> Result<ExitCode, Error> {
    let paths = read::discover_siblings(&path)?;
    let handle = Handle::open_read(&paths)?;
    let media = handle.get_media_values();

    println!("segment files:   {}", paths.len());
    println!("format:          {}", media.format.tag());
    println!("media size:      {} bytes", media.media_size);
    println!("chunk size:      {} bytes", media.chunk_size);
    println!("sectors/chunk:   {}", media.sectors_per_chunk);
    println!("bytes/sector:    {}", media.bytes_per_sector);
    println!("number of chunks: {}", media.number_of_chunks);

    for key in ["MD5", "SHA1", "c", "e", "n", "t"] {
        if let Ok(value) = handle.get_hash_values(key) {
            println!("{key}: {value}");
        }
    }

    Ok(ExitCode::from(0))
}

fn cmd_verify(path: PathBuf) -> Result<ExitCode, Error> {
    let paths = read::discover_siblings(&path)?;
    let mut handle = Handle::open_read(&paths)?;
    let total = handle.get_media_values().media_size;

    let mut buf = vec![0u8; 1 << 20];
    let mut done = 0u64;
    while done < total {
        let n = handle.read(&mut buf)?;
        if n == 0 {
            break;
        }
        done += n as u64;
        if done % (64 << 20) < buf.len() as u64 {
            info!("verified {done}/{total} bytes");
        }
    }

    let crc_errors = handle.crc_error_count();
    if crc_errors > 0 {
        error!("{crc_errors} sector range(s) failed checksum verification");
        return Ok(ExitCode::from(4));
    }
    println!("OK: {total} bytes verified, no checksum errors");
    Ok(ExitCode::from(0))
}

fn cmd_export(path: PathBuf, out: PathBuf) -> Result<ExitCode, Error> {
    let paths = read::discover_siblings(&path)?;
    let mut handle = Handle::open_read(&paths)?;
    let total = handle.get_media_values().media_size;

    let mut out_file = File::create(&out).map_err(|e| Error::io(format!("creating {}", out.display()), e))?;
    let mut buf = vec![0u8; 1 << 20];
    let mut done = 0u64;
    while done < total {
        let n = handle.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out_file
            .write_all(&buf[..n])
            .map_err(|e| Error::io(format!("writing {}", out.display()), e))?;
        done += n as u64;
        if done % (64 << 20) < buf.len() as u64 {
            info!("exported {done}/{total} bytes");
        }
    }

    println!("wrote {done} bytes to {}", out.display());
    Ok(ExitCode::from(0))
}

fn cmd_acquire(_source: PathBuf, _out: PathBuf) -> Result<ExitCode, Error> {
    Err(Error::InvalidArgument(
        "acquire is not implemented: raw source-device acquisition needs a bad-sector-retry \
         collaborator this crate does not provide; use an external imaging tool and import the \
         result with open_write/open_write_resume instead"
            .into(),
    ))
}

fn exit_code_for(e: &Error) -> ExitCode {
    match e {
        Error::Io { .. } => ExitCode::from(2),
        Error::InvalidFormat(_) | Error::Corrupt(_) => ExitCode::from(3),
        Error::ChecksumMismatch { .. } => ExitCode::from(4),
        Error::LimitExceeded(_) | Error::InvalidChunk(_) | Error::InvalidArgument(_) | Error::NotFound(_) => {
            ExitCode::from(1)
        }
    }
}
