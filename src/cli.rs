use crate::config::Config;
use crate::ecosystem::descriptor;
use crate::error::{DevswitchError, Result};
use crate::guard;
use crate::manager::EcosystemManager;
use crate::models::{Ecosystem, InstalledVersion, Provenance};
use crate::process::{OutputEvent, OutputSink};
use crate::uninstall::version_directory;
use crate::utils::{
    confirm, dir_size, format_size, print_error, print_info, print_success, print_warning,
};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;

#[derive(Parser)]
#[command(name = "devswitch")]
#[command(about = "Switch between JDK, Node.js, Python and Go installations", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(skip)]
    config: Config,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered installations
    #[command(alias = "ls")]
    List {
        /// Ecosystem (jdk, node, python, go); all when omitted
        ecosystem: Option<Ecosystem>,
    },

    /// Show the active installation
    Current {
        ecosystem: Option<Ecosystem>,
    },

    /// Make an installation active
    Use {
        ecosystem: Ecosystem,

        /// Version label or install path
        version: String,
    },

    /// Remove an installation
    #[command(alias = "rm")]
    Uninstall {
        ecosystem: Ecosystem,

        /// Version label or install path
        version: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List formulae the package manager offers
    Search {
        ecosystem: Ecosystem,
    },

    /// Install a formula through the package manager
    Install {
        ecosystem: Ecosystem,

        /// Formula name (e.g. node@20, openjdk@21)
        formula: String,
    },

    /// Show how to load an ecosystem's environment file
    Env {
        ecosystem: Ecosystem,
    },

    /// Show devswitch configuration
    Config {
        /// Show specific config key
        key: Option<String>,
    },
}

impl Cli {
    pub fn new(config: Config) -> Self {
        let mut cli = Self::parse();
        cli.config = config;
        cli
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::List { ecosystem } => self.list(ecosystem).await,
            Commands::Current { ecosystem } => self.current(ecosystem).await,
            Commands::Use { ecosystem, ref version } => self.use_version(ecosystem, version).await,
            Commands::Uninstall {
                ecosystem,
                ref version,
                yes,
            } => self.uninstall(ecosystem, version, yes).await,
            Commands::Search { ecosystem } => self.search(ecosystem).await,
            Commands::Install {
                ecosystem,
                ref formula,
            } => self.install(ecosystem, formula).await,
            Commands::Env { ecosystem } => self.env(ecosystem),
            Commands::Config { ref key } => self.show_config(key.clone()),
        }
    }

    async fn loaded_manager(&self, ecosystem: Ecosystem) -> EcosystemManager {
        let manager = EcosystemManager::from_config(ecosystem, &self.config);
        manager.refresh_now().await;
        manager
    }

    async fn find_version(
        &self,
        ecosystem: Ecosystem,
        query: &str,
    ) -> Result<(EcosystemManager, InstalledVersion)> {
        let manager = self.loaded_manager(ecosystem).await;
        let version = manager
            .snapshot()
            .inventory
            .find(query)
            .cloned()
            .ok_or_else(|| {
                DevswitchError::VersionNotFound(format!("{} {}", ecosystem.display_name(), query))
            })?;
        Ok((manager, version))
    }

    async fn list(&self, ecosystem: Option<Ecosystem>) -> Result<()> {
        let ecosystems = match ecosystem {
            Some(e) => vec![e],
            None => Ecosystem::ALL.to_vec(),
        };

        for (i, ecosystem) in ecosystems.into_iter().enumerate() {
            if i > 0 {
                println!();
            }
            let manager = self.loaded_manager(ecosystem).await;
            let snapshot = manager.snapshot();
            let inventory = &snapshot.inventory;

            println!(
                "{}",
                format!("{} installations:", ecosystem.display_name()).green().bold()
            );

            if inventory.versions.is_empty() {
                println!("  {}", "none found".dimmed());
                continue;
            }

            for version in &inventory.versions {
                let is_active = inventory.active == Some(version.id);
                let prefix = if is_active {
                    "→".green().bold()
                } else {
                    " ".normal()
                };

                let mut markers = vec![version.source.blue().to_string()];
                if is_active {
                    markers.push("active".green().to_string());
                }
                if !manager.can_uninstall(version) {
                    markers.push("protected".yellow().to_string());
                }

                println!(
                    "  {} {} ({})",
                    prefix,
                    version.version.cyan(),
                    markers.join(", ")
                );
                println!("      {}", version.install_root.display().to_string().dimmed());
            }
        }

        Ok(())
    }

    async fn current(&self, ecosystem: Option<Ecosystem>) -> Result<()> {
        let ecosystems = match ecosystem {
            Some(e) => vec![e],
            None => Ecosystem::ALL.to_vec(),
        };

        for ecosystem in ecosystems {
            let manager = self.loaded_manager(ecosystem).await;
            match manager.active_version() {
                Some(version) => println!(
                    "{} {} {}",
                    format!("{}:", ecosystem.display_name()).green().bold(),
                    version.version.cyan(),
                    version.install_root.display().to_string().dimmed()
                ),
                None => println!(
                    "{} {}",
                    format!("{}:", ecosystem.display_name()).green().bold(),
                    "none".dimmed()
                ),
            }
        }

        Ok(())
    }

    async fn use_version(&self, ecosystem: Ecosystem, query: &str) -> Result<()> {
        let (manager, version) = self.find_version(ecosystem, query).await?;
        manager.set_active(&version).await?;

        print_success(&format!(
            "Now using {} {} ({})",
            ecosystem.display_name(),
            version.version,
            version.source
        ));
        println!("\n{}", "To apply it to the current shell, run:".yellow());
        println!("  source \"{}\"", manager.layout().fragment_path.display());

        Ok(())
    }

    async fn uninstall(&self, ecosystem: Ecosystem, query: &str, skip_confirm: bool) -> Result<()> {
        let (manager, version) = self.find_version(ecosystem, query).await?;
        let active = manager.active_version();

        if let Some(rejection) = guard::check(manager.layout(), &version, active.as_ref()) {
            return Err(DevswitchError::UninstallRejected(format!(
                "{} {}: {}",
                ecosystem.display_name(),
                version.version,
                rejection.message()
            )));
        }

        let target = match version.provenance {
            Provenance::VersionManager(_) => version_directory(manager.layout(), &version)
                .unwrap_or_else(|| version.install_root.clone()),
            _ => version.install_root.clone(),
        };
        print_info(&format!(
            "{} ({}) uses {}",
            target.display(),
            version.source,
            format_size(dir_size(&target))
        ));

        let prompt = format!("Uninstall {} {}?", ecosystem.display_name(), version.version);
        if !(skip_confirm || confirm(&prompt)) {
            print_info("Uninstall cancelled");
            return Ok(());
        }

        let label = format!("Removing {} {}", ecosystem.display_name(), version.version);
        let removed =
            with_progress(label, |sink| async move { manager.uninstall(&version, &sink).await })
                .await;

        if removed {
            print_success(&format!("Uninstalled {} {}", ecosystem.display_name(), query));
        } else {
            print_error(&format!("Failed to uninstall {} {}", ecosystem.display_name(), query));
        }

        Ok(())
    }

    async fn search(&self, ecosystem: Ecosystem) -> Result<()> {
        let manager = EcosystemManager::from_config(ecosystem, &self.config);

        print_info(&format!("Searching {} formulae...", ecosystem.display_name()));
        let catalog = manager.remote_catalog().await;

        if catalog.is_empty() {
            print_warning("No formulae found");
            return Ok(());
        }

        println!(
            "\n{}",
            format!("Available {} formulae:", ecosystem.display_name()).green().bold()
        );
        for entry in &catalog {
            let marker = if entry.is_installed {
                format!(" {}", "(installed)".green())
            } else {
                String::new()
            };
            println!(
                "  {} {}{}",
                entry.formula_identifier.cyan(),
                entry.resolved_version.dimmed(),
                marker
            );
        }

        println!("\n{}", "Usage:".yellow());
        println!("  devswitch install {} <formula>", ecosystem);

        Ok(())
    }

    async fn install(&self, ecosystem: Ecosystem, formula: &str) -> Result<()> {
        if !descriptor(ecosystem).matches_package(formula) {
            print_error(&format!(
                "{} is not a {} formula",
                formula,
                ecosystem.display_name()
            ));
            return Ok(());
        }

        let manager = EcosystemManager::from_config(ecosystem, &self.config);
        let label = format!("Installing {}", formula);
        let installed =
            with_progress(label, |sink| async move { manager.install(formula, &sink).await }).await;

        if installed {
            print_success(&format!("{} installed", formula));
            println!("\n{}", "Next steps:".yellow());
            println!("  devswitch list {}", ecosystem);
            println!("  devswitch use {} <version>", ecosystem);
        } else {
            print_error(&format!("Failed to install {}", formula));
        }

        Ok(())
    }

    fn env(&self, ecosystem: Ecosystem) -> Result<()> {
        let path = self.config.env_fragment_path(ecosystem);

        println!("{} {}", "Environment file:".cyan(), path.display());
        match std::fs::read_to_string(&path) {
            Ok(contents) => println!("{}", contents.trim_end().dimmed()),
            Err(_) => print_warning(&format!(
                "No {} version selected yet",
                ecosystem.display_name()
            )),
        }

        println!("\n{}", "Add this to your shell startup file:".yellow());
        println!("  [ -f \"{0}\" ] && source \"{0}\"", path.display());

        Ok(())
    }

    fn show_config(&self, key: Option<String>) -> Result<()> {
        let config = &self.config;
        if let Some(key_name) = key {
            match key_name.as_str() {
                "dir" | "config_dir" => println!("{}", config.config_dir.display()),
                "cellar_roots" => println!("{}", config.cellar_roots.join(", ")),
                "brew_command" => println!("{}", config.brew_command),
                "java_home_helper" => println!("{}", config.java_home_helper),
                "reserved_paths" => println!("{}", config.reserved_paths.join(", ")),
                "scan_system" => println!("{}", config.scan_system),
                _ => print_warning(&format!("Unknown config key: {}", key_name)),
            }
        } else {
            println!("{}", "devswitch Configuration:".green().bold());
            println!("  {} {}", "Config Directory:".cyan(), config.config_dir.display());
            println!("  {} {}", "Config File:".cyan(), config.config_file.display());
            println!("  {} {}", "Cellar Roots:".cyan(), config.cellar_roots.join(", "));
            println!("  {} {}", "Package Manager:".cyan(), config.brew_command);
            println!("  {} {}", "JDK Registry Helper:".cyan(), config.java_home_helper);
            println!("  {} {}", "Reserved Paths:".cyan(), config.reserved_paths.join(", "));
            println!("  {} {}", "Scan PATH:".cyan(), config.scan_system);
        }

        Ok(())
    }
}

/// Run an operation, rendering its output above a progress bar
async fn with_progress<F, Fut>(label: String, operation: F) -> bool
where
    F: FnOnce(OutputSink) -> Fut,
    Fut: Future<Output = bool>,
{
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(label);

    let (sink, mut events) = OutputSink::channel();
    let renderer = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    OutputEvent::Progress(percent) => pb.set_position(percent.round() as u64),
                    OutputEvent::Line(line) => pb.println(format!("  {}", line.dimmed())),
                }
            }
        })
    };

    let succeeded = operation(sink).await;
    let _ = renderer.await;
    pb.finish_and_clear();
    succeeded
}
