use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser};

use ctokenizers::{Encoding, FromPretrainedParameters, Tokenizer};

/// Where to load the tokenizer from (exactly one required).
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Pretrained name looked up in the local tokenizer cache.
    #[arg(long, value_name = "NAME")]
    pretrained: Option<String>,

    /// A tokenizer.json file.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

/// Encode text, print every token and decode the ids again.
#[derive(Parser)]
#[command(name = "tokenize", version)]
struct Cli {
    #[command(flatten)]
    source: Source,

    /// Revision of a pretrained tokenizer.
    #[arg(long, requires = "pretrained")]
    revision: Option<String>,

    /// Second sequence, encoded as a pair with TEXT.
    #[arg(long, value_name = "TEXT")]
    pair: Option<String>,

    /// Do not insert special tokens.
    #[arg(long)]
    no_special_tokens: bool,

    /// Keep special tokens when decoding.
    #[arg(long)]
    keep_special_tokens: bool,

    /// Print the encoding as JSON.
    #[arg(long)]
    json: bool,

    text: String,
}

fn load(source: &Source, revision: Option<&str>) -> Result<Tokenizer> {
    if let Some(name) = &source.pretrained {
        let mut params = FromPretrainedParameters::default();
        if let Some(revision) = revision {
            params.revision = revision.to_owned();
        }
        Tokenizer::from_pretrained(name, Some(params))
            .with_context(|| format!("Failed to load pretrained tokenizer {name}"))
    } else if let Some(path) = &source.file {
        Tokenizer::from_file(path)
            .with_context(|| format!("Failed to load tokenizer: {}", path.display()))
    } else {
        anyhow::bail!("No tokenizer source specified")
    }
}

fn print_encoding(encoding: &Encoding) {
    println!("Tokens:");
    for i in 0..encoding.len() {
        println!(
            "  {} (ID: {}, Type: {}, Special: {}, Attention: {})",
            encoding.get_tokens()[i],
            encoding.get_ids()[i],
            encoding.get_type_ids()[i],
            encoding.get_special_tokens_mask()[i],
            encoding.get_attention_mask()[i],
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let tokenizer = load(&cli.source, cli.revision.as_deref())?;
    let add_special_tokens = !cli.no_special_tokens;
    let encoding = match &cli.pair {
        Some(pair) => tokenizer.encode_pair(&cli.text, pair, add_special_tokens),
        None => tokenizer.encode(&cli.text, add_special_tokens),
    }
    .context("Failed to encode input")?;
    let decoded = tokenizer
        .decode(encoding.get_ids(), !cli.keep_special_tokens)
        .context("Failed to decode ids")?;

    if cli.json {
        let output = serde_json::json!({ "encoding": encoding, "decoded": decoded });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_encoding(&encoding);
        println!();
        println!("Decoded text: {decoded}");
    }
    Ok(())
}
