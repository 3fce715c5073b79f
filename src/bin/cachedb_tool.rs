use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cachedb::{CommitOutcome, Mode, Session};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(name = "cachedb-tool")]
#[command(about = "Inspect and extend cachedb store files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the header and every index entry
    Info {
        db: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List keys in creation order
    Keys { db: PathBuf },
    /// Write the value stored under KEY to stdout
    Get { db: PathBuf, key: String },
    /// Add a value read from FILE (or stdin) under KEY
    Put {
        db: PathBuf,
        key: String,
        file: Option<PathBuf>,
        /// Metadata stored alongside the record
        #[arg(long)]
        metadata: Option<String>,
        /// Recreate the store instead of extending it
        #[arg(long)]
        create: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Info { db, json } => show_info(&db, json),
        Command::Keys { db } => {
            let session = Session::open(&db, Mode::Read)
                .with_context(|| format!("open {}", db.display()))?;
            let mut out = std::io::stdout().lock();
            for entry in session.info().entries {
                out.write_all(&entry.key)?;
                out.write_all(b"\n")?;
            }
            Ok(())
        }
        Command::Get { db, key } => {
            let mut session = Session::open(&db, Mode::Read)
                .with_context(|| format!("open {}", db.display()))?;
            match session.get(key.as_bytes())? {
                Some(value) => {
                    std::io::stdout().lock().write_all(&value)?;
                    Ok(())
                }
                None => bail!("key {key:?} not found in {}", db.display()),
            }
        }
        Command::Put {
            db,
            key,
            file,
            metadata,
            create,
        } => {
            let value = match file {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().lock().read_to_end(&mut buf)?;
                    buf
                }
            };
            let mode = if create { Mode::Create } else { Mode::Write };
            let mut session =
                Session::open(&db, mode).with_context(|| format!("open {}", db.display()))?;
            if !session.add(key.as_bytes(), &value, metadata.as_deref().map(str::as_bytes))? {
                bail!("key {key:?} already exists in {}", db.display());
            }
            match session.close()? {
                CommitOutcome::Committed { records } => {
                    info!("committed {records} record(s) to {}", db.display());
                    Ok(())
                }
                CommitOutcome::ConflictLoss { .. } => {
                    bail!("{} was replaced concurrently; nothing written", db.display())
                }
                other => bail!("unexpected close outcome {other:?}"),
            }
        }
    }
}

fn show_info(db: &Path, json: bool) -> Result<()> {
    let session =
        Session::open(db, Mode::Read).with_context(|| format!("open {}", db.display()))?;
    let header = session
        .header()
        .with_context(|| format!("{} has no header", db.display()))?;
    let info = session.info();

    if json {
        let entries: Vec<_> = info
            .entries
            .iter()
            .zip(info.lookup.iter())
            .map(|(entry, (_, slot))| {
                serde_json::json!({
                    "ordinal": slot.ordinal,
                    "key": String::from_utf8_lossy(&entry.key),
                    "offset": slot.offset,
                    "compressed_len": entry.compressed_len,
                    "uncompressed_len": entry.uncompressed_len,
                    "metadata": entry.metadata.as_ref().map(|m| String::from_utf8_lossy(m).into_owned()),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "path": db.display().to_string(),
            "index_compressed_len": header.index_zlen,
            "index_len": header.index_len,
            "records": entries,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!(
        "{}: {} records, index {} -> {} bytes",
        db.display(),
        info.entries.len(),
        header.index_zlen,
        header.index_len
    );
    println!("{:>8} {:>12} {:>10} {:>10}  key", "ordinal", "offset", "zlen", "len");
    for (entry, (_, slot)) in info.entries.iter().zip(info.lookup.iter()) {
        println!(
            "{:>8} {:>12} {:>10} {:>10}  {}",
            slot.ordinal,
            slot.offset,
            entry.compressed_len,
            entry.uncompressed_len,
            String::from_utf8_lossy(&entry.key)
        );
    }
    Ok(())
}
