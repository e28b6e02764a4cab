//! jsonkv CLI Client
//!
//! Command-line interface for interacting with a jsonkv server.

use clap::{Parser, Subcommand};
use jsonkv::client::Client;
use jsonkv::{Document, KvError};

/// jsonkv CLI
#[derive(Parser, Debug)]
#[command(name = "jsonkv-cli")]
#[command(about = "CLI for the jsonkv document store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:10001")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a document
    Get {
        /// The document key
        key: String,
    },

    /// Replace a document with the given JSON
    Put {
        /// The document key
        key: String,

        /// The new document (JSON)
        json: String,
    },

    /// Overwrite top-level fields of a document
    Assign {
        /// The document key
        key: String,

        /// Fields to overwrite (JSON object)
        json: String,
    },

    /// Deep-merge into a document
    Patch {
        /// The document key
        key: String,

        /// Partial document to merge (JSON object)
        json: String,
    },

    /// Fetch a document, waiting for it to be written if absent
    Poll {
        /// The document key
        key: String,
    },

    /// Wait for the next write to a document
    Watch {
        /// The document key
        key: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), KvError> {
    let mut client = Client::connect(&args.server).await?;

    match args.command {
        Commands::Get { key } => print_document(&client.get(&key).await?)?,
        Commands::Put { key, json } => {
            client.put(&key, parse_json(&json)?).await?;
            println!("OK");
        }
        Commands::Assign { key, json } => {
            client.assign(&key, parse_json(&json)?).await?;
            println!("OK");
        }
        Commands::Patch { key, json } => {
            client.patch(&key, parse_json(&json)?).await?;
            println!("OK");
        }
        Commands::Poll { key } => print_long_poll(client.poll(&key).await?)?,
        Commands::Watch { key } => print_long_poll(client.watch(&key).await?)?,
    }

    Ok(())
}

fn parse_json(raw: &str) -> Result<Document, KvError> {
    serde_json::from_str(raw).map_err(|e| KvError::Serialization(format!("invalid JSON argument: {e}")))
}

fn print_document(document: &Document) -> Result<(), KvError> {
    println!("{}", serde_json::to_string_pretty(document)?);
    Ok(())
}

fn print_long_poll(outcome: Option<Document>) -> Result<(), KvError> {
    match outcome {
        Some(document) => print_document(&document),
        None => {
            println!("(timed out, no update)");
            Ok(())
        }
    }
}
