use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use icetea_ffi::{NativeModuleRegistry, VmHandle};
use icetea_module::{ModuleConfig, SourceLoader, StoreMode};
use serde::Serialize;
use tracing::debug;

use crate::host::ModuleHost;
use crate::utils::logger;

#[derive(Parser, Debug)]
#[command(name = "icetea", version, about = "IceTea module inspector")]
pub struct IceteaCli {
    #[arg(long, global = true, value_name = "dir")]
    /// Folder of internal modules (defaults to $ICETEA_LIB).
    lib: Option<PathBuf>,

    #[arg(long, global = true, value_name = "zip")]
    /// Zip archive of internal modules; takes precedence over `--lib`.
    archive: Option<PathBuf>,

    #[arg(long, global = true, value_name = "dir")]
    /// Directory imports made by the host are resolved against.
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl IceteaCli {
    pub fn command(&self) -> &Command {
        &self.command
    }

    fn config(&self) -> Result<ModuleConfig> {
        let mut config = ModuleConfig::from_env();
        if let Some(archive) = &self.archive {
            let bytes = fs::read(archive)
                .with_context(|| format!("failed to read {}", archive.display()))?;
            config = config.with_archive(bytes);
        }
        if let Some(lib) = &self.lib {
            config = config.with_library_path(lib);
        }
        if let Some(cwd) = &self.cwd {
            config = config.with_working_dir(cwd);
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prints the module id an import resolves to.
    Resolve {
        name: String,
        /// Importing module id, or `@` for the host.
        #[arg(long, default_value = "@")]
        from: String,
    },
    /// Prints the source the VM would evaluate for an import.
    Source {
        name: String,
        #[arg(long, default_value = "@")]
        from: String,
    },
    /// Loads a native module and lists what it exports.
    ///
    /// The module's create function runs without a VM (its VM handle is
    /// null), so modules that use the handle while being created cannot be
    /// inspected.
    Inspect {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Lists the internal modules.
    Internals,
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = IceteaCli::parse();
    debug!("{cli:?}");

    match &cli.command {
        Command::Resolve { name, from } => handle_resolve(&cli, from, name),
        Command::Source { name, from } => handle_source(&cli, from, name),
        Command::Inspect { path, json } => handle_inspect(path, *json),
        Command::Internals => handle_internals(&cli),
    }
}

fn handle_resolve(cli: &IceteaCli, from: &str, name: &str) -> Result<()> {
    let loader = SourceLoader::from_config(cli.config()?);
    let id = loader
        .resolver()
        .resolve_raw(from, name)
        .with_context(|| format!("failed to resolve `{name}`"))?;

    println!("{id}");
    Ok(())
}

fn handle_source(cli: &IceteaCli, from: &str, name: &str) -> Result<()> {
    let mut host = ModuleHost::new(cli.config()?, VmHandle::detached());
    let (id, source) = host
        .import(from, name)
        .with_context(|| format!("failed to load `{name}`"))?;

    debug!("`{name}` is {id}");
    print!("{source}");
    Ok(())
}

#[derive(Serialize)]
struct Inspection<'a> {
    id: &'a str,
    identifier: &'a str,
    #[serde(flatten)]
    summary: icetea_ffi::ModuleSummary,
}

fn handle_inspect(path: &Path, json: bool) -> Result<()> {
    let is_native = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(icetea_module::conventions::is_native_extension);
    if !is_native {
        bail!("{} is not a native module", path.display());
    }

    let mut registry = NativeModuleRegistry::new(VmHandle::detached());
    let entry = registry.load_module(path)?;

    let inspection = Inspection {
        id: entry.id(),
        identifier: entry.identifier(),
        summary: entry.descriptor().summary(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    let summary = &inspection.summary;
    println!("{} ({})", summary.name, inspection.id);
    if let Some(version) = &summary.version {
        println!("  version:   {version}");
    }
    if let Some(copyright) = &summary.copyright {
        println!("  copyright: {copyright}");
    }
    println!("  source:    {}", if summary.has_source { "inline" } else { "none" });
    for class in &summary.classes {
        let kind = if class.foreign { "foreign class" } else { "class" };
        println!("  {kind} {}", class.name);
        for method in &class.methods {
            println!("    {method}");
        }
    }
    Ok(())
}

fn handle_internals(cli: &IceteaCli) -> Result<()> {
    let loader = SourceLoader::from_config(cli.config()?);
    let internals = loader.internals();

    match internals.mode() {
        StoreMode::Archive => println!("internal modules: embedded archive"),
        StoreMode::Directory(root) => println!("internal modules: {}", root.display()),
        StoreMode::Empty => {
            println!("internal modules: none");
            return Ok(());
        }
    }

    for name in internals.names() {
        println!("  {name}");
    }
    Ok(())
}
