// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use miniapt::packages::Package;
use miniapt::resolver::BrokenDependency;
use miniapt::{Config, InstallOutcome, Observer, RemoveOutcome, Store, UpgradeOutcome};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "miniapt")]
#[command(author, version, about = "Minimal Debian-style package manager for self-contained install trees", long_about = None)]
struct Cli {
    /// Install root (state lives in <root>/apt)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Configuration file (default: <root>/apt/sources.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download package lists from every configured source
    Update,
    /// List packages, optionally only one section
    List {
        /// Section name (e.g. cores, plugins)
        section: Option<String>,
    },
    /// Install packages and their dependencies
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Show a package's control stanza
    Show {
        /// Package name
        package: String,
    },
    /// Show the dependencies a package pulls in
    Deps {
        /// Package name
        package: String,
    },
    /// Remove an installed package
    Remove {
        /// Package name
        package: String,
        /// Also remove every installed package that depends on it
        #[arg(short, long)]
        recursive: bool,
    },
    /// Upgrade every installed package with a newer catalog version
    Upgrade,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

/// Prints progress the classic way: `10%` markers with dots in between
struct Console;

impl Observer for Console {
    fn broken_dependency(&mut self, broken: &BrokenDependency) {
        eprintln!(
            "Warning: {} depends on {}, which is not available",
            broken.required_by, broken.name
        );
    }

    fn fetch_started(&mut self, pkg: &Package) {
        print!("Downloading {} ", pkg.name());
        let _ = io::stdout().flush();
    }

    fn fetch_progress(&mut self, _pkg: &Package, percent: u8) {
        progress_mark(percent);
    }

    fn extracting(&mut self, pkg: &Package) {
        println!("Extracting {} {}", pkg.name(), pkg.version());
    }

    fn removing(&mut self, pkg: &Package) {
        print!("Removing {} ", pkg.name());
        let _ = io::stdout().flush();
    }

    fn remove_progress(&mut self, _pkg: &Package, percent: u8) {
        progress_mark(percent);
    }
}

fn progress_mark(percent: u8) {
    if percent % 10 == 0 {
        print!("{}%", percent);
    } else {
        print!(".");
    }
    if percent == 100 {
        println!();
    }
    let _ = io::stdout().flush();
}

fn lookup<'a>(store: &'a Store, name: &str) -> Result<&'a Package> {
    store
        .available_package(name)
        .ok_or_else(|| anyhow::anyhow!("Package '{}' not found", name))
}

fn list(store: &Store, section: Option<&str>) {
    println!("{:<50} {:>10} {:>10}", "Package", "Installed", "Available");

    for pkg in store.packages(section) {
        let installed = store
            .installed_package(pkg.name())
            .map(|p| p.version().to_string())
            .unwrap_or_default();
        let flag = if store.is_upgradable(pkg) { "UPDATE!" } else { "" };
        println!(
            "{:<50} {:>10} {:>10} {}",
            pkg.name(),
            installed,
            pkg.version().to_string(),
            flag
        );
    }

    for pkg in store.installed_only(section) {
        println!("{:<50} {:>10} {:>10}", pkg.name(), pkg.version().to_string(), "");
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "miniapt", &mut io::stdout());
        return Ok(());
    }

    let mut store = Store::open(&cli.root)
        .with_context(|| format!("Failed to open install tree at {}", cli.root.display()))?;
    let config_path = cli.config.unwrap_or_else(|| store.layout().config_path());
    let config = Config::load(&config_path)?;
    let mut console = Console;

    match cli.command {
        Commands::Update => {
            let client = config.client()?;
            let count = store.refresh_catalog(&config.sources(), &client)?;
            println!("{} packages available", count);
            Ok(())
        }
        Commands::List { section } => {
            list(&store, section.as_deref());
            Ok(())
        }
        Commands::Install { packages } => {
            let client = config.client()?;
            let targets = packages
                .iter()
                .map(|name| lookup(&store, name).cloned())
                .collect::<Result<Vec<_>>>()?;

            for pkg in targets {
                match store.install(&pkg, &client, &mut console)? {
                    InstallOutcome::AlreadyInstalled => {
                        println!("{} is already installed", pkg.name());
                    }
                    InstallOutcome::Installed(report) => {
                        info!("Installed {}", report.extracted.join(", "));
                        println!("Installed {} {}", pkg.name(), pkg.version());
                    }
                }
            }
            Ok(())
        }
        Commands::Show { package } => {
            let pkg = lookup(&store, &package)?;
            print!("{}", pkg);
            Ok(())
        }
        Commands::Deps { package } => {
            let pkg = lookup(&store, &package)?;
            let resolution = store.resolve(pkg);
            println!("{} depends on:", pkg.name());
            for dep in &resolution.packages {
                println!("    {}", dep.name());
            }
            for broken in &resolution.broken {
                println!("    {} (missing)", broken.name);
            }
            Ok(())
        }
        Commands::Remove { package, recursive } => {
            if recursive {
                let removed = store.recursive_remove(&package, &mut console)?;
                println!("Removed {}", removed.join(", "));
                return Ok(());
            }

            match store.uninstall(&package, false, &mut console)? {
                RemoveOutcome::Removed(summary) => {
                    println!(
                        "Removed {} ({} files, {} directories)",
                        package, summary.files, summary.directories
                    );
                    Ok(())
                }
                RemoveOutcome::Refused { blockers } => {
                    println!("{} is required by:", package);
                    for name in &blockers {
                        println!("    {}", name);
                    }
                    Err(anyhow::anyhow!("{} cannot be removed", package))
                }
            }
        }
        Commands::Upgrade => {
            let client = config.client()?;
            let targets: Vec<Package> = store.upgradable().into_iter().cloned().collect();
            if targets.is_empty() {
                println!("Everything is up to date");
                return Ok(());
            }

            for pkg in targets {
                // An earlier upgrade may already have pulled this one in
                let Some(current) = store.available_package(pkg.name()).cloned() else {
                    continue;
                };
                match store.upgrade(&current, &client, &mut console)? {
                    UpgradeOutcome::UpToDate => {}
                    UpgradeOutcome::Upgraded(_) => {
                        println!("Upgraded {} to {}", current.name(), current.version());
                    }
                }
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}
