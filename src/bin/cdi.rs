//! CDI Spec CLI
//!
//! Validates CDI Spec files, injects their devices into OCI runtime
//! configurations and converts specs between YAML and JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cdi_spec::{
    generate_spec_name, read_spec, write_spec, CdiConfig, RuntimeSpec, Spec, SpecValidator,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cdi-spec")]
#[command(about = "Validate and apply Container Device Interface specs")]
struct Cli {
    /// Configuration file (in addition to cdi.toml and CDI__* variables)
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate spec files and list their devices
    Validate {
        /// Spec files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Inject devices into an OCI runtime config
    Inject {
        /// Spec file providing the devices
        #[arg(short, long)]
        spec: PathBuf,
        /// OCI runtime config (config.json)
        #[arg(short, long)]
        config: PathBuf,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Devices to inject, qualified or by name
        #[arg(required = true)]
        devices: Vec<String>,
    },

    /// Rewrite a spec under another path or encoding
    Convert {
        input: PathBuf,
        /// Destination; the configured format's extension is used if it has none
        output: PathBuf,
    },

    /// Print the file name generated for a vendor and class
    Name { vendor: String, class: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CdiConfig::load_from(cli.config_file.as_deref())
        .context("failed to load configuration")?;
    let validator = config.validator()?;

    match cli.command {
        Commands::Validate { files } => {
            let mut failed = 0;
            for file in &files {
                match load(file, &config, validator.as_ref()) {
                    Ok(spec) => {
                        println!("✅ {} ({}, v{})", file.display(), spec.kind(), spec.version());
                        for device in spec.devices() {
                            println!("  {}", device.qualified_name());
                        }
                    }
                    Err(e) => {
                        println!("❌ {}: {:#}", file.display(), e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} spec files are invalid", failed, files.len());
            }
            Ok(())
        }

        Commands::Inject {
            spec,
            config: oci_config,
            output,
            devices,
        } => {
            let spec = load(&spec, &config, validator.as_ref())?;

            let content = fs::read_to_string(&oci_config)
                .with_context(|| format!("failed to read {}", oci_config.display()))?;
            let mut target: RuntimeSpec = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", oci_config.display()))?;

            spec.inject_devices(&mut target, devices.as_slice())?;

            let json = serde_json::to_string_pretty(&target)?;
            match output {
                Some(path) => fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Convert { input, output } => {
            let spec = load(&input, &config, validator.as_ref())?;

            let output = if output.extension().is_some() {
                output
            } else {
                output.with_extension(config.write.format.extension())
            };
            let written = write_spec(
                spec.raw().clone(),
                &output,
                validator.as_ref(),
                config.write.overwrite,
            )?;
            println!("✅ {} -> {}", input.display(), written.path().display());
            Ok(())
        }

        Commands::Name { vendor, class } => {
            println!("{}", generate_spec_name(&vendor, &class));
            Ok(())
        }
    }
}

fn load(path: &Path, config: &CdiConfig, validator: &dyn SpecValidator) -> anyhow::Result<Spec> {
    match read_spec(path, config.load.priority, validator)? {
        Some(spec) => Ok(spec),
        None => bail!("no CDI Spec at {}", path.display()),
    }
}
