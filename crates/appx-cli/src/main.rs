//! appx - command-line front end for the appx packaging library
//!
//! Packs directories into packages, unpacks them with interactive conflict
//! resolution, bundles packages, builds from layout files and applies the
//! transport cipher to arbitrary files.

use anyhow::Result;
use appx_core::archive::ArchiveReader;
use appx_core::config::Config;
use appx_core::{
    BundleIdentity, CompressionLevel, ConflictResolver, FixedResolver, Key, NoProgress,
    OverwriteMode, PackOptions, PackReport, ProgressObserver, UnpackOptions, UnpackReport,
};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod interactive;
mod progress;

/// appx - package, bundle and transport-encrypt application directories
#[derive(Parser)]
#[command(name = "appx")]
#[command(author, version, about = "Package, bundle and transport-encrypt application directories", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show progress bar during operations
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a package
    Pack {
        /// Directory to pack
        input: PathBuf,

        /// Output package file
        #[arg(short, long)]
        output: PathBuf,

        /// Compression level (none, fast, normal, maximum)
        #[arg(short, long)]
        compression: Option<String>,

        /// Pack without requiring AppxManifest.xml
        #[arg(long)]
        no_manifest_check: bool,

        /// Follow symlinks (pack link targets instead of skipping links)
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Extract a package into a directory
    Unpack {
        /// Package file to extract
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// What to do with existing files (ask, yes, no)
        #[arg(long)]
        overwrite: Option<String>,
    },

    /// Bundle every .appx/.msix in a directory
    Bundle {
        /// Directory holding the packages
        input: PathBuf,

        /// Output bundle file
        #[arg(short, long)]
        output: PathBuf,

        /// Compression level (none, fast, normal, maximum)
        #[arg(short, long)]
        compression: Option<String>,
    },

    /// Extract a bundle into a directory
    Unbundle {
        /// Bundle file to extract
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// What to do with existing files (ask, yes, no)
        #[arg(long)]
        overwrite: Option<String>,
    },

    /// Build a package from a layout file
    Build {
        /// Layout file mapping local files to package paths
        layout: PathBuf,

        /// Output package file
        #[arg(short, long)]
        output: PathBuf,

        /// Compression level (none, fast, normal, maximum)
        #[arg(short, long)]
        compression: Option<String>,

        /// Build without requiring AppxManifest.xml in the layout
        #[arg(long)]
        no_manifest_check: bool,
    },

    /// Encrypt a file with a 32-byte key
    Encrypt {
        /// File to encrypt
        input: PathBuf,

        /// Encrypted output file
        #[arg(short, long)]
        output: PathBuf,

        /// File holding exactly 32 key bytes
        #[arg(short, long)]
        key_file: PathBuf,
    },

    /// Decrypt a file produced by `encrypt`
    Decrypt {
        /// File to decrypt
        input: PathBuf,

        /// Decrypted output file
        #[arg(short, long)]
        output: PathBuf,

        /// File holding exactly 32 key bytes
        #[arg(short, long)]
        key_file: PathBuf,
    },

    /// Write a new random key file
    Keygen {
        /// Key file to create
        output: PathBuf,
    },

    /// Convert a source content group map
    ConvertCgm {
        /// Source content group map
        input: PathBuf,

        /// Converted output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List package contents
    List {
        /// Package file to inspect
        input: PathBuf,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "path")]
        show: bool,

        /// Show configuration file path
        #[arg(long, conflicts_with = "show")]
        path: bool,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            error!("Error: {}", e);
            let exit_code = map_error_to_exit_code(&e);
            process::exit(exit_code);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = Config::load_or_default();
    let mut observer = observer_for(cli.progress);

    match cli.command {
        Commands::Pack {
            input,
            output,
            compression,
            no_manifest_check,
            follow_symlinks,
        } => {
            let mut options = pack_options(&config, compression.as_deref())?;
            options.require_manifest &= !no_manifest_check;
            options.follow_symlinks = follow_symlinks;

            let report = appx_core::pack(&input, &output, &options, observer.as_mut())?;
            log_pack_report(&output, &report);
        }

        Commands::Unpack {
            input,
            output,
            overwrite,
        }
        | Commands::Unbundle {
            input,
            output,
            overwrite,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from("."));
            let mode = match overwrite {
                Some(mode) => parse_overwrite(&mode)?,
                None => config.extract.overwrite,
            };
            let options = UnpackOptions { overwrite: mode };
            let mut resolver = resolver_for(mode);

            let report = appx_core::unpack(
                &input,
                &output,
                &options,
                resolver.as_mut(),
                observer.as_mut(),
            )?;
            check_unpack_report(&report)?;
        }

        Commands::Bundle {
            input,
            output,
            compression,
        } => {
            let mut options = pack_options(&config, compression.as_deref())?;
            // Contained packages carry their own manifests
            options.require_manifest = false;
            let identity = BundleIdentity::from(&config.bundle);

            let report = appx_core::bundle(&input, &output, &identity, &options, observer.as_mut())?;
            log_pack_report(&output, &report);
        }

        Commands::Build {
            layout,
            output,
            compression,
            no_manifest_check,
        } => {
            let mut options = pack_options(&config, compression.as_deref())?;
            options.require_manifest &= !no_manifest_check;

            let report = appx_core::build(&layout, &output, &options, observer.as_mut())?;
            log_pack_report(&output, &report);
        }

        Commands::Encrypt {
            input,
            output,
            key_file,
        } => {
            let key = Key::from_file(&key_file)?;
            let written = appx_core::encrypt_file(&input, &output, key.as_bytes())?;
            info!("Encrypted {:?} -> {:?} ({} bytes)", input, output, written);
        }

        Commands::Decrypt {
            input,
            output,
            key_file,
        } => {
            let key = Key::from_file(&key_file)?;
            let written = appx_core::decrypt_file(&input, &output, key.as_bytes())?;
            info!("Decrypted {:?} -> {:?} ({} bytes)", input, output, written);
        }

        Commands::Keygen { output } => {
            write_key_file(&output, &Key::generate())?;
            info!("Wrote key file {:?}", output);
        }

        Commands::ConvertCgm { input, output } => {
            let map = appx_core::convert_cgm(&input, &output)?;
            info!("Wrote {} content groups to {:?}", map.groups.len(), output);
        }

        Commands::List { input, json } => {
            let mut reader = ArchiveReader::open(&input)?;
            let entries = reader.entries()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{:<60} {:>15} {:>15} {:>10}", "Path", "Size", "Compressed", "Method");
                println!("{}", "-".repeat(103));
                for entry in &entries {
                    let method = entry
                        .method
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<60} {:>15} {:>15} {:>10}",
                        entry.name, entry.size, entry.compressed_size, method
                    );
                }
            }
        }

        Commands::Config { show, path } => {
            if show {
                match Config::load() {
                    Ok(config) => {
                        let toml_str = toml::to_string_pretty(&config)?;
                        println!("{}", toml_str);
                    }
                    Err(e) => {
                        error!("Failed to load configuration: {}", e);
                        return Err(e.into());
                    }
                }
            } else if path {
                println!("{}", Config::config_path()?.display());
            } else {
                eprintln!("Please specify --show or --path");
            }
        }
    }

    Ok(())
}

fn observer_for(show_progress: bool) -> Box<dyn ProgressObserver> {
    if show_progress {
        Box::new(progress::ConsoleProgress::new())
    } else {
        Box::new(NoProgress)
    }
}

fn resolver_for(mode: OverwriteMode) -> Box<dyn ConflictResolver> {
    match mode {
        OverwriteMode::Ask => Box::new(interactive::PromptResolver),
        OverwriteMode::Yes => Box::new(FixedResolver::overwrite()),
        OverwriteMode::No => Box::new(FixedResolver::skip()),
    }
}

/// Create `path` holding `key`, readable by the owner only; never replaces a file
fn write_key_file(path: &Path, key: &Key) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(appx_core::Error::Validation(format!(
                "Refusing to overwrite existing key file {:?}",
                path
            ))
            .into());
        }
        Err(e) => return Err(appx_core::Error::Io(e).into()),
    };
    file.write_all(key.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(appx_core::Error::Io)?;
    Ok(())
}

fn pack_options(config: &Config, compression: Option<&str>) -> Result<PackOptions> {
    let mut options = PackOptions::from_config(&config.package);
    if let Some(level) = compression {
        options.compression = level
            .parse::<CompressionLevel>()
            .map_err(appx_core::Error::Validation)?;
    }
    Ok(options)
}

fn parse_overwrite(mode: &str) -> Result<OverwriteMode> {
    Ok(mode
        .parse::<OverwriteMode>()
        .map_err(appx_core::Error::Validation)?)
}

fn log_pack_report(output: &Path, report: &PackReport) {
    if let Some(advisory) = &report.advisory {
        warn!("{}", advisory);
    }
    info!(
        "Wrote {:?}: {} entries, {} payload bytes, method {}, {} bytes on disk",
        output, report.entries, report.payload_bytes, report.method, report.archive_size
    );
}

fn check_unpack_report(report: &UnpackReport) -> Result<()> {
    for (name, reason) in &report.failures {
        error!("Failed to extract {}: {}", name, reason);
    }
    info!(
        "Extraction complete: {} extracted, {} skipped, {} failed",
        report.extracted, report.skipped, report.failed
    );

    if report.is_clean() {
        Ok(())
    } else {
        Err(appx_core::Error::Archive(format!(
            "{} entries could not be extracted",
            report.failed
        ))
        .into())
    }
}

/// Map errors to exit codes:
/// - 0: Success
/// - 1: General error
/// - 2: I/O error or missing input
/// - 3: Invalid arguments, validation or key errors
/// - 4: Archive or cipher failure
fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<appx_core::Error>() {
        match core_err {
            appx_core::Error::Io(_) => 2,
            appx_core::Error::NotFound(_) => 2,
            appx_core::Error::NotADirectory(_) => 3,
            appx_core::Error::InvalidPath(_) => 3,
            appx_core::Error::Validation(_) => 3,
            appx_core::Error::InvalidKey(_) => 3,
            appx_core::Error::Xml(_) => 3,
            appx_core::Error::Archive(_) => 4,
            appx_core::Error::Zip(_) => 4,
            appx_core::Error::Entry { .. } => 4,
            appx_core::Error::Crypto(_) => 4,
            appx_core::Error::Config(_) => 1,
        }
    } else if err.is::<std::io::Error>() {
        2
    } else {
        1
    }
}
