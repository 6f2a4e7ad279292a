//! scriptsign CLI - sign and verify directive-carrying scripts
//!
//! Key files are PEM; scripts are read as UTF-8 (a leading BOM is ignored)
//! and `-` reads the script from stdin.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use scriptsign_lib::{
    Algorithm, CanonicalizerConfig, KeyPair, PublicKey, ScriptCanonicalizer, ScriptError,
    SignatureEncoding,
};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "scriptsign")]
#[command(about = "Sign and verify scripts with RSA keys", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Directive keyword, overrides the config file
    #[arg(long, global = true)]
    keyword: Option<String>,

    /// Signature algorithm for new signatures (e.g. SHA-256)
    #[arg(long, global = true)]
    algorithm: Option<String>,

    /// Emit the signature as one base64 line instead of wrapped lines
    #[arg(long, global = true)]
    compact: bool,

    /// Display debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new RSA-2048 key pair
    Keygen {
        /// Private key output path
        #[arg(long)]
        private: PathBuf,

        /// Public key output path
        #[arg(long)]
        public: Option<PathBuf>,

        /// Overwrite existing key files
        #[arg(short, long)]
        force: bool,
    },
    /// Export the public key of a private key file
    Pubkey {
        /// Private key PEM
        #[arg(short, long)]
        key: PathBuf,

        /// Output path (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the canonical code that would be signed
    Canonicalize {
        /// Script file, or - for stdin
        script: PathBuf,
    },
    /// Print the directive parameters as JSON
    Params {
        /// Script file, or - for stdin
        script: PathBuf,
    },
    /// Sign a script and embed the signature
    Sign {
        /// Script file, or - for stdin
        script: PathBuf,

        /// Private key PEM
        #[arg(short, long)]
        key: PathBuf,

        /// Output path (stdout if omitted)
        #[arg(short, long, conflicts_with = "in_place")]
        out: Option<PathBuf>,

        /// Replace the script file with the signed version
        #[arg(short, long)]
        in_place: bool,
    },
    /// Verify the signature embedded in a script
    Verify {
        /// Script file, or - for stdin
        script: PathBuf,

        /// Public key PEM
        #[arg(short, long)]
        public_key: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let log_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();
}

/// Merge the config file with command-line overrides
fn build_config(cli: &Cli) -> Result<CanonicalizerConfig> {
    let mut config = CanonicalizerConfig::load_or_default(cli.config.as_deref())?;

    if let Some(keyword) = &cli.keyword {
        config.keyword.clone_from(keyword);
    }
    if let Some(name) = &cli.algorithm {
        config.algorithm = name.parse::<Algorithm>()?;
    }
    if cli.compact {
        config.encoding = SignatureEncoding::Compact;
    }

    config.validate()?;
    Ok(config)
}

fn read_script(path: &Path) -> Result<String> {
    let mut content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read script from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?
    };

    if content.starts_with('\u{feff}') {
        content.remove(0);
    }
    Ok(content)
}

fn write_output(out: Option<&Path>, content: &str) -> Result<()> {
    match out {
        Some(path) => fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{content}");
            Ok(())
        }
    }
}

fn keygen(private: &Path, public: Option<&Path>, force: bool) -> Result<()> {
    for path in std::iter::once(private).chain(public) {
        if path.exists() && !force {
            bail!(
                "{} already exists. Use --force to overwrite.",
                path.display()
            );
        }
    }

    let key = KeyPair::generate()?;
    key.save_private(private)?;
    if let Some(public) = public {
        key.save_public(public)?;
    }

    println!("✓ Generated RSA key pair");
    println!("  Private key: {}", private.display());
    if let Some(public) = public {
        println!("  Public key:  {}", public.display());
    }
    println!("  Fingerprint: {}", key.public_key().fingerprint());
    Ok(())
}

fn pubkey(key: &Path, out: Option<&Path>) -> Result<()> {
    let key = KeyPair::load(key)?;
    match out {
        Some(path) => key.save_public(path)?,
        None => print!("{}", key.public_key().to_pem()?),
    }
    Ok(())
}

fn sign(
    canonicalizer: &ScriptCanonicalizer,
    script: &Path,
    key: &Path,
    out: Option<&Path>,
    in_place: bool,
) -> Result<()> {
    if in_place && script.as_os_str() == "-" {
        bail!("--in-place cannot be used with stdin");
    }

    let raw = read_script(script)?;
    let key = KeyPair::load(key)?;
    let signed = canonicalizer.sign(&raw, &key)?;

    let algorithm = signed.signature().algorithm();
    let destination = if in_place { Some(script) } else { out };
    write_output(destination, &signed.into_text())?;

    if let Some(path) = destination {
        println!("✓ Signed {} ({algorithm})", path.display());
    }
    Ok(())
}

fn verify(canonicalizer: &ScriptCanonicalizer, script: &Path, public_key: &Path) -> Result<bool> {
    let text = read_script(script)?;
    let key = PublicKey::load(public_key)?;

    match canonicalizer.verify_script(&text, &key) {
        Ok(true) => {
            println!("✓ Signature valid (key {})", key.fingerprint());
            Ok(true)
        }
        Ok(false) => {
            println!("✗ Signature INVALID for key {}", key.fingerprint());
            Ok(false)
        }
        Err(ScriptError::Unsigned) => {
            println!("✗ Script is not signed");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Commands::Keygen {
            private,
            public,
            force,
        } => keygen(private, public.as_deref(), *force)?,
        Commands::Pubkey { key, out } => pubkey(key, out.as_deref())?,
        Commands::Canonicalize { script } => {
            let canonicalizer = ScriptCanonicalizer::new(build_config(cli)?);
            let raw = read_script(script)?;
            println!("{}", canonicalizer.canonicalize(&raw).code());
        }
        Commands::Params { script } => {
            let canonicalizer = ScriptCanonicalizer::new(build_config(cli)?);
            let raw = read_script(script)?;
            let params = canonicalizer.extract_parameters(&raw);
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
        Commands::Sign {
            script,
            key,
            out,
            in_place,
        } => {
            let canonicalizer = ScriptCanonicalizer::new(build_config(cli)?);
            sign(&canonicalizer, script, key, out.as_deref(), *in_place)?;
        }
        Commands::Verify { script, public_key } => {
            let canonicalizer = ScriptCanonicalizer::new(build_config(cli)?);
            return verify(&canonicalizer, script, public_key);
        }
    }
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
