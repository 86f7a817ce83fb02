use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use invscan::{
    config::Config,
    detector::VulnCache,
    image::LayeredImage,
    model::{ScanResult, Severity},
    output::{format_result_to_string, print_result, OutputFormat},
    platform,
    plugin::{Capabilities, Network, PluginRegistry},
    scanner::{ScanConfig, Scanner},
    ScanContext, ScanRoot,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const SCAN_FAILED: u8 = 2;
    pub const CRITICAL_VULN: u8 = 3;
    pub const HIGH_VULN: u8 = 4;
    pub const MEDIUM_VULN: u8 = 5;
    pub const LOW_VULN: u8 = 6;
}

#[derive(Parser)]
#[command(name = "invscan")]
#[command(author, version, about = "Scan filesystems and container images for packages and vulnerabilities")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one or more directories
    Scan {
        /// Directories to scan
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Only extract from these files or directories
        #[arg(long = "path")]
        paths: Vec<String>,

        #[command(flatten)]
        opts: ScanArgs,
    },

    /// Scan a container image unpacked as layer directories, bottom layer first
    ScanImage {
        /// Layer directory (repeat for each layer, in order)
        #[arg(long = "layer", required = true)]
        layers: Vec<PathBuf>,

        /// Number of leading layers that belong to the base image
        #[arg(long, default_value_t = 0)]
        base_layers: usize,

        #[command(flatten)]
        opts: ScanArgs,
    },

    /// List available plugins
    ListPlugins,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the vulnerability cache
    ClearCache,
}

#[derive(Args)]
struct ScanArgs {
    /// Plugins to enable, comma separated (defaults to the config file's list)
    #[arg(long, value_delimiter = ',')]
    plugins: Option<Vec<String>>,

    /// Disable plugins that need network access
    #[arg(long)]
    offline: bool,

    /// Directory to skip (repeatable)
    #[arg(long = "skip-dir")]
    skip_dirs: Vec<String>,

    /// Skip files larger than this many bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Skip paths matched by .gitignore files
    #[arg(long)]
    use_gitignore: bool,

    /// Output format (table, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Write output to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Don't read or write the vulnerability cache
    #[arg(long)]
    no_cache: bool,

    /// Exit with an error if the scan or any plugin failed
    #[arg(long)]
    fail_on_error: bool,

    /// Exit with error if vulnerabilities at or above this severity are found
    #[arg(long, value_enum)]
    fail_on: Option<FailLevel>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

enum Target {
    Roots(Vec<PathBuf>, Vec<String>),
    Image(LayeredImage),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "invscan=warn",
        1 => "invscan=debug",
        _ => "invscan=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<u8> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable config file");
            Config::default()
        }
    };

    match command {
        Commands::Scan { roots, paths, opts } => run_scan(&config, Target::Roots(roots, paths), opts).await,
        Commands::ScanImage {
            layers,
            base_layers,
            opts,
        } => {
            let image = LayeredImage::from_dirs(&layers).with_base_layers(base_layers);
            run_scan(&config, Target::Image(image), opts).await
        }
        Commands::ListPlugins => {
            list_plugins(&config);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let path = platform::vuln_cache_path();
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            println!("Cache cleared.");
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(config: &Config, target: Target, opts: ScanArgs) -> Result<u8> {
    let format_str = opts.format.clone().unwrap_or_else(|| config.default_format.clone());
    let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && opts.output.is_none();

    let vuln_cache = Arc::new(VulnCache::new());
    let cache_path = platform::vuln_cache_path();
    let cache_ttl = Duration::from_secs(config.cache_ttl_hours * 3600);
    if !opts.no_cache {
        match vuln_cache.load_from(&cache_path, cache_ttl) {
            Ok(true) => debug!(entries = vuln_cache.len(), "loaded vulnerability cache"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, path = %cache_path.display(), "ignoring unreadable vulnerability cache"),
        }
    }

    let registry = Arc::new(PluginRegistry::builtin(config, vuln_cache.clone()));
    let plugin_names = opts.plugins.clone().unwrap_or_else(|| config.plugins.clone());
    let mut selection = registry.select(&plugin_names)?;

    let network = if opts.offline || config.offline {
        Network::Offline
    } else {
        Network::Online
    };
    let capabilities = match target {
        Target::Roots(..) => Capabilities::running_system(network),
        Target::Image(_) => Capabilities::offline_image(network),
    };
    for dropped in selection.retain_supported(&capabilities) {
        warn!(reason = %dropped, "disabling plugin");
    }

    let mut walk = config.walk.to_options()?;
    walk.dirs_to_skip.extend(opts.skip_dirs.iter().cloned());
    if opts.max_file_size.is_some() {
        walk.max_file_size = opts.max_file_size;
    }
    walk.use_gitignore |= opts.use_gitignore;

    let ctx = ScanContext::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Scanning with {} plugins...", selection.len()));
        Some(pb)
    } else {
        None
    };

    let scanner = Scanner::new(registry);
    let result = match target {
        Target::Roots(roots, paths) => {
            walk.paths_to_extract = paths;
            let mut scan_config = ScanConfig::from_selection(selection, capabilities)
                .with_walk_options(walk);
            for root in &roots {
                scan_config = scan_config.with_root(ScanRoot::from_dir(root));
            }
            scanner.scan(&ctx, &mut scan_config).await
        }
        Target::Image(image) => {
            let mut scan_config = ScanConfig::from_selection(selection, capabilities).with_walk_options(walk);
            scanner.scan_container(&ctx, &image, &mut scan_config).await?
        }
    };

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Found {} packages", result.inventory.packages.len()));
    }

    if !opts.no_cache {
        if let Err(e) = vuln_cache.save_to(&cache_path) {
            warn!(error = %e, path = %cache_path.display(), "failed to save vulnerability cache");
        }
    }

    if let Some(path) = &opts.output {
        std::fs::write(path, format_result_to_string(&result, format)?)?;
        if format == OutputFormat::Table {
            println!("Results written to: {}", path.display());
        }
    } else {
        print_result(&result, format)?;
    }

    Ok(determine_exit_code(&result, opts.fail_on_error, opts.fail_on))
}

/// Determine the exit code from the scan status and the --fail-on settings
fn determine_exit_code(result: &ScanResult, fail_on_error: bool, fail_on: Option<FailLevel>) -> u8 {
    if fail_on_error && (!result.status.is_success() || result.failed_plugins().next().is_some()) {
        return exit_codes::SCAN_FAILED;
    }

    let threshold = match fail_on {
        Some(FailLevel::Critical) => Severity::Critical,
        Some(FailLevel::High) => Severity::High,
        Some(FailLevel::Medium) => Severity::Medium,
        Some(FailLevel::Low) => Severity::Low,
        None => return exit_codes::SUCCESS,
    };

    let worst = result.inventory.unsuppressed_vulns().map(|v| v.severity).max();

    match worst {
        Some(severity) if severity >= threshold => match severity {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Medium => exit_codes::MEDIUM_VULN,
            _ => exit_codes::LOW_VULN,
        },
        _ => exit_codes::SUCCESS,
    }
}

fn list_plugins(config: &Config) {
    let registry = PluginRegistry::builtin(config, Arc::default());

    println!("Available plugins:");
    println!();

    for info in registry.list() {
        let enabled = if config.plugins.iter().any(|p| p == &info.name) {
            "yes"
        } else {
            "no"
        };
        println!("  {:<28} {:<22} [default: {}]", info.name, info.kind, enabled);

        let mut needs = Vec::new();
        if info.requirements.network == Network::Online {
            needs.push("network");
        }
        if info.requirements.running_system {
            needs.push("running system");
        }
        if info.requirements.direct_fs {
            needs.push("direct filesystem");
        }
        if !needs.is_empty() {
            println!("  {:<28} Requires: {}", "", needs.join(", "));
        }
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'invscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use invscan::model::{
        ExploitabilitySignal, Inventory, Justification, Package, PackageVuln, ScanStatus,
    };

    fn result_with(packages: Vec<Package>, vulns: Vec<PackageVuln>) -> ScanResult {
        ScanResult {
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            version: "test".to_string(),
            status: ScanStatus::succeeded(),
            plugin_status: Vec::new(),
            inventory: Inventory {
                packages,
                package_vulns: vulns,
                ..Default::default()
            },
        }
    }

    fn vuln(id: &str, severity: Severity) -> PackageVuln {
        PackageVuln {
            id: id.to_string(),
            package_name: "left-pad".to_string(),
            package_version: "1.0.0".to_string(),
            purl_type: "npm".to_string(),
            severity,
            summary: String::new(),
            fixed_version: None,
            reference_url: None,
            plugins: vec!["vulns/osv".to_string()],
            exploitability_signals: Vec::new(),
        }
    }

    #[test]
    fn test_exit_code_for_worst_vuln() {
        let result = result_with(
            vec![Package::new("left-pad", "1.0.0", "npm")],
            vec![vuln("GHSA-1", Severity::Medium), vuln("GHSA-2", Severity::Critical)],
        );
        assert_eq!(determine_exit_code(&result, false, Some(FailLevel::High)), exit_codes::CRITICAL_VULN);
        assert_eq!(determine_exit_code(&result, false, None), exit_codes::SUCCESS);
    }

    #[test]
    fn test_exit_code_ignores_vulns_of_suppressed_packages() {
        let mut pkg = Package::new("left-pad", "1.0.0", "npm");
        pkg.exploitability_signals
            .push(ExploitabilitySignal::for_all_vulns("vex/cachedir", Justification::ComponentNotPresent));
        let result = result_with(vec![pkg], vec![vuln("GHSA-1", Severity::Critical)]);

        assert_eq!(determine_exit_code(&result, false, Some(FailLevel::Low)), exit_codes::SUCCESS);
    }
}
