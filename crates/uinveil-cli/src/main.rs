//! uinveil CLI
//!
//! Mints and checks signed URLs offline, using the same configuration file
//! as the daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod display;

use crate::commands::Session;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: ~/.config/uinveil/config.toml)
    #[arg(long, global = true, env = "UINVEIL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt plaintext into a cipher token
    Encode {
        /// Plaintext, usually a materials JSON object
        plaintext: String,
    },

    /// Decrypt a cipher token
    Decode {
        /// Cipher token
        token: String,
    },

    /// Print the canonical form of a JSON document
    Canon {
        /// JSON document
        json: String,
    },

    /// Sign materials for a license
    Sign {
        /// License id
        #[arg(long)]
        license: String,

        /// Materials JSON object
        materials: String,

        /// Extra parameters as a query string
        #[arg(long)]
        extra: Option<String>,
    },

    /// Show every parameter set produced while signing
    Collect {
        /// License id
        #[arg(long)]
        license: String,

        /// Materials JSON object
        materials: String,

        /// Extra parameters as a query string
        #[arg(long)]
        extra: Option<String>,
    },

    /// Build a shareable signed URL
    Url {
        /// License id
        #[arg(long)]
        license: String,

        /// Origin prepended to `/avatar`
        #[arg(long, default_value = "")]
        prefix: String,

        /// Materials JSON object
        materials: String,

        /// Extra parameters as a query string
        #[arg(long)]
        extra: Option<String>,
    },

    /// Check a cipher/signature pair and show the upstream parameters
    Verify {
        /// License id
        #[arg(long)]
        license: String,

        /// Cipher token
        #[arg(long)]
        cipher: String,

        /// Signature token
        #[arg(long)]
        sign: String,

        /// Remaining query parameters of the signed URL
        #[arg(long)]
        extra: Option<String>,
    },
}

fn run(args: Args) -> Result<()> {
    if let Command::Canon { json } = &args.command {
        println!("{}", commands::canon(json)?);
        return Ok(());
    }

    let session = Session::load(args.config.as_deref())?;

    match args.command {
        Command::Encode { plaintext } => println!("{}", session.encode(&plaintext)),
        Command::Decode { token } => display::print_plaintext(&session.decode(&token)?),
        Command::Canon { .. } => {}
        Command::Sign {
            license,
            materials,
            extra,
        } => display::print_json(&session.sign(&license, &materials, extra.as_deref())?)?,
        Command::Collect {
            license,
            materials,
            extra,
        } => display::print_json(&session.collect(&license, &materials, extra.as_deref())?)?,
        Command::Url {
            license,
            prefix,
            materials,
            extra,
        } => display::print_json(&session.url(
            &license,
            &prefix,
            &materials,
            extra.as_deref(),
        )?)?,
        Command::Verify {
            license,
            cipher,
            sign,
            extra,
        } => display::print_json(&session.verify(&license, &cipher, &sign, extra.as_deref())?)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    log::debug!("Running {:?}", args.command);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e);
            ExitCode::FAILURE
        }
    }
}
