//! ChunkMap CLI Client
//!
//! Command-line interface for interacting with a ChunkMap server.

use std::error::Error;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use chunkmap::network::Client;
use chunkmap::protocol::Target;
use chunkmap::{ChunkPos, ColumnPos, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};

/// ChunkMap CLI
#[derive(Parser, Debug)]
#[command(name = "chunkmap-cli")]
#[command(about = "CLI for the ChunkMap chunk store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:25566")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

/// A chunk (x y z) or, with --column, a column (x z)
#[derive(ClapArgs, Debug)]
struct Position {
    /// Address a column instead of a chunk
    #[arg(long)]
    column: bool,

    /// Coordinates: x y z for chunks, x z for columns
    #[arg(num_args = 2..=3, allow_negative_numbers = true, required = true)]
    coords: Vec<i32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a blob is stored
    Contains {
        #[command(flatten)]
        pos: Position,
    },

    /// Fetch a blob
    Get {
        #[command(flatten)]
        pos: Position,

        /// Write the blob here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Store a blob
    Save {
        #[command(flatten)]
        pos: Position,

        /// Read the blob from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Commit after saving
        #[arg(long)]
        commit: bool,
    },

    /// List stored positions
    List {
        /// List columns instead of chunks
        #[arg(long)]
        column: bool,
    },

    /// Make all pending writes durable
    Commit,
}

impl Position {
    fn target(&self) -> std::result::Result<Target, String> {
        match (self.column, self.coords.as_slice()) {
            (false, [x, y, z]) => Ok(Target::Chunk(ChunkPos::new(*x, *y, *z))),
            (true, [x, z]) => Ok(Target::Column(ColumnPos::new(*x, *z))),
            (false, _) => Err("a chunk needs three coordinates: x y z".to_string()),
            (true, _) => Err("a column needs two coordinates: x z".to_string()),
        }
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> std::result::Result<(), Box<dyn Error>> {
    let mut client = Client::connect(&args.server)?;

    match args.command {
        Commands::Contains { pos } => {
            let found = match pos.target()? {
                Target::Chunk(p) => client.contains_chunk(p),
                Target::Column(p) => client.contains_column(p),
            }?;
            println!("{}", found);
        }
        Commands::Get { pos, out } => {
            let data = match pos.target()? {
                Target::Chunk(p) => client.get_chunk(p),
                Target::Column(p) => client.get_column(p),
            }?;
            match (data, out) {
                (None, _) => return Err("not found".into()),
                (Some(data), Some(path)) => fs::write(path, data)?,
                (Some(data), None) => std::io::stdout().write_all(&data)?,
            }
        }
        Commands::Save { pos, file, commit } => {
            let target = pos.target()?;
            let data = read_input(file)?;
            let len = data.len();
            match target {
                Target::Chunk(p) => client.save_chunk(p, data),
                Target::Column(p) => client.save_column(p, data),
            }?;
            if commit {
                client.commit()?;
            }
            println!("saved {} bytes", len);
        }
        Commands::List { column } => {
            if column {
                for pos in client.list_columns()? {
                    println!("{} {}", pos.x, pos.z);
                }
            } else {
                for pos in client.list_chunks()? {
                    println!("{} {} {}", pos.x, pos.y, pos.z);
                }
            }
        }
        Commands::Commit => {
            client.commit()?;
            println!("committed");
        }
    }

    client.close()?;
    Ok(())
}

fn read_input(file: Option<PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => Ok(fs::read(path)?),
        None => {
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}
