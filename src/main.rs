//! mnema CLI - store, recall, and annotate content-addressed data

use anyhow::Context;
use clap::{Parser, Subcommand};
use mnema::{extract, ingest, sniff, Cid, ContentKind, DataService};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnema")]
#[command(about = "A content-addressable store with a triple-based knowledge base")]
#[command(version)]
struct Cli {
    /// Root directory of the store
    #[arg(short, long, env = "MNEMA_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the data in a file (or a whole directory tree)
    Know {
        /// File to store; with --recursive, a directory
        path: PathBuf,
        /// Walk the directory and store every regular file in it
        #[arg(short, long)]
        recursive: bool,
    },

    /// Write the data stored under a CID to stdout
    Recall {
        /// The content identifier
        cid: String,
    },

    /// Remove the data stored under a CID
    Forget {
        /// The content identifier
        cid: String,
    },

    /// Check whether a CID is stored
    Exists {
        /// The content identifier
        cid: String,
    },

    /// Re-hash stored data and verify it still matches its CID
    Confirm {
        /// The content identifier
        cid: String,
    },

    /// List every stored CID
    List {
        /// Only list payloads of this kind
        #[arg(short, long)]
        kind: Option<ContentKind>,
    },

    /// Unpack a stored archive and store all of its contents
    Extract {
        /// CID of a zip, tar, or gzip payload
        cid: String,
    },

    /// Record a fact about a CID
    Believe {
        /// Subject CID
        subject: String,
        property: String,
        value: String,
    },

    /// Query recorded facts
    Inquire {
        /// Filter by subject CID
        #[arg(short, long)]
        subject: Option<String>,
        /// Filter by property
        #[arg(short, long)]
        property: Option<String>,
        /// Filter by value
        #[arg(short = 'v', long)]
        value: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = DataService::open(&cli.root)
        .with_context(|| format!("cannot open store at {}", cli.root.display()))?;

    match cli.command {
        Commands::Know { path, recursive } => {
            if recursive {
                let report = ingest::ingest_path(&service, &path, true)?;
                eprintln!("new files: {}", report.stored);
                eprintln!("already stored files: {}", report.duplicates);
            } else {
                let (cid, is_new) = ingest::ingest_file(&service, &path)?;
                if is_new {
                    println!("Stored as {}", cid);
                } else {
                    println!("Already stored as {}", cid);
                }
            }
        }

        Commands::Recall { cid } => {
            let cid = parse_cid(&cid)?;
            let mut reader = service.recall_stream(&cid)?;
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            std::io::copy(&mut reader, &mut handle)?;
            handle.flush()?;
        }

        Commands::Forget { cid } => {
            let cid = parse_cid(&cid)?;
            service.forget(&cid)?;
        }

        Commands::Exists { cid } => {
            let cid = parse_cid(&cid)?;
            if service.known(&cid)? {
                println!("known");
            } else {
                println!("unknown");
                std::process::exit(1);
            }
        }

        Commands::Confirm { cid } => {
            let cid = parse_cid(&cid)?;
            if service.confirm(&cid)? {
                println!("identity confirmed");
            } else {
                eprintln!("error: stored data no longer matches {}", cid);
                std::process::exit(1);
            }
        }

        Commands::List { kind } => {
            for cid in service.cids() {
                let cid = cid?;
                if let Some(kind) = kind {
                    let mut reader = service.recall_stream(&cid)?;
                    if sniff::sniff(&mut reader)? != Some(kind) {
                        continue;
                    }
                }
                println!("{}", cid);
            }
        }

        Commands::Extract { cid } => {
            let cid = parse_cid(&cid)?;
            let report = extract::extract(&service, &cid)?;
            eprintln!("new files: {}", report.stored);
            eprintln!("already stored files: {}", report.duplicates);
        }

        Commands::Believe {
            subject,
            property,
            value,
        } => {
            let subject = parse_cid(&subject)?.digest()?;
            let (id, is_new) = service.believe(&subject, &property, &value)?;
            let id_cid = Cid::from_digest(&id);
            if is_new {
                println!("Recorded as {}", id_cid);
            } else {
                println!("Already recorded as {}", id_cid);
            }
        }

        Commands::Inquire {
            subject,
            property,
            value,
        } => {
            let subject = match subject {
                Some(s) => Some(parse_cid(&s)?.digest()?),
                None => None,
            };
            let triples =
                service.inquire(subject.as_ref(), property.as_deref(), value.as_deref())?;
            for t in triples {
                println!(
                    "{}\t{}\t{}\t{}",
                    Cid::from_digest(&t.id),
                    Cid::from_digest(&t.subject),
                    t.property,
                    t.value
                );
            }
        }
    }

    Ok(())
}

fn parse_cid(s: &str) -> anyhow::Result<Cid> {
    s.parse::<Cid>()
        .with_context(|| format!("invalid content identifier: {}", s))
}
