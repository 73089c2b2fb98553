// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn package_arg() -> Arg {
    Arg::new("package").required(true).help("Package name")
}

fn build_cli() -> Command {
    Command::new("miniapt")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Minimal Debian-style package manager for self-contained install trees")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_name("PATH")
                .default_value(".")
                .help("Install root (state lives in <root>/apt)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Configuration file (default: <root>/apt/sources.json)"),
        )
        .subcommand(Command::new("update").about("Download package lists from every configured source"))
        .subcommand(
            Command::new("list")
                .about("List packages, optionally only one section")
                .arg(Arg::new("section").help("Section name (e.g. cores, plugins)")),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages and their dependencies")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show a package's control stanza")
                .arg(package_arg()),
        )
        .subcommand(
            Command::new("deps")
                .about("Show the dependencies a package pulls in")
                .arg(package_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove an installed package")
                .arg(package_arg())
                .arg(
                    Arg::new("recursive")
                        .short('r')
                        .long("recursive")
                        .action(ArgAction::SetTrue)
                        .help("Also remove every installed package that depends on it"),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade every installed package with a newer catalog version"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("miniapt.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
