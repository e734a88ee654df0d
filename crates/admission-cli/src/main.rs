//! Admission Gate CLI
//!
//! The `admission` command runs the decision engines outside a webhook.
//!
//! ## Commands
//!
//! - `upgrade`: validate a release upgrade against the catalog
//! - `catalog`: list releases or the components of one release
//! - `diff`: print the JSON patch between two documents
//! - `vm-caps`: query VM SKU capabilities from the inventory

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, Level};

use admission_core::{
    diff_from_raw, filter_by_path_prefix, CallContext, CapabilityRecord, PatchOperation,
    ReleaseCatalog, ReleaseCatalogEntry, ReleaseUpgradeValidator, UpgradeDecision,
    VmCapabilities, METRICS,
};
use admission_state::{FsObjectStore, HttpCapabilitySource};

/// Exit status for a denied upgrade.
const EXIT_DENIED: u8 = 2;

#[derive(Parser)]
#[command(name = "admission")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Admission gate decision engines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding `Release/<name>.json` records
    #[arg(long, global = true, env = "ADMISSION_CATALOG_DIR", default_value = ".")]
    catalog_dir: PathBuf,

    /// Deadline for every engine call, in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an upgrade between two releases
    Upgrade {
        /// Current release
        #[arg(long)]
        from: String,

        /// Requested release
        #[arg(long)]
        to: String,
    },

    /// Inspect the release catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Print the JSON patch turning one document into another
    Diff {
        /// Original document (JSON)
        before: PathBuf,

        /// Desired document (JSON)
        after: PathBuf,

        /// Drop operations under this path prefix (repeatable)
        #[arg(long = "skip-prefix")]
        skip_prefixes: Vec<String>,
    },

    /// Query VM SKU capabilities from the inventory
    VmCaps {
        /// Region, e.g. westeurope
        #[arg(long)]
        region: String,

        /// Instance type, e.g. Standard_D4s_v3
        #[arg(long)]
        instance_type: String,

        #[command(subcommand)]
        query: CapsQuery,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List every release
    List,

    /// Show the component versions of one release
    Components {
        /// Release name, e.g. v13.0.0
        release: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum CapsQuery {
    /// Memory in GB
    Memory,
    /// Number of vCPUs
    Cpus,
    /// Whether a capability is supported
    Has {
        /// Capability name, e.g. PremiumIO
        capability: String,
    },
    /// Every typed capability
    Show,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    admission_core::init_tracing(cli.json, level);

    run_and_flush(cli).await
}

/// Run the command, then flush metrics whether it succeeded or not.
async fn run_and_flush(cli: Cli) -> Result<ExitCode> {
    let result = run(cli).await;
    METRICS.flush();
    result
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let ctx = CallContext::with_timeout(Duration::from_secs(cli.timeout_secs));

    let code = match cli.command {
        Commands::Upgrade { from, to } => {
            let decision = cmd_upgrade(&ctx, &cli.catalog_dir, &from, &to).await?;
            if decision.allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_DENIED)
            }
        }
        Commands::Catalog { action } => {
            match action {
                CatalogAction::List => {
                    cmd_catalog_list(&ctx, &cli.catalog_dir).await?;
                }
                CatalogAction::Components { release } => {
                    cmd_catalog_components(&ctx, &cli.catalog_dir, &release).await?;
                }
            }
            ExitCode::SUCCESS
        }
        Commands::Diff {
            before,
            after,
            skip_prefixes,
        } => {
            cmd_diff(&before, &after, &skip_prefixes).await?;
            ExitCode::SUCCESS
        }
        Commands::VmCaps {
            region,
            instance_type,
            query,
        } => {
            cmd_vm_caps(&ctx, &region, &instance_type, query).await?;
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_upgrade(
    ctx: &CallContext,
    catalog_dir: &Path,
    from: &str,
    to: &str,
) -> Result<UpgradeDecision> {
    let validator = ReleaseUpgradeValidator::new(FsObjectStore::new(catalog_dir));
    let decision = validator
        .validate_names(ctx, from, to)
        .await
        .with_context(|| format!("failed to validate upgrade {} -> {}", from, to))?;

    let mut report = serde_json::to_value(&decision)?;
    if let Value::Object(fields) = &mut report {
        fields.insert("message".to_string(), Value::String(decision.message()));
    }
    print_json(&report)?;
    Ok(decision)
}

async fn cmd_catalog_list(
    ctx: &CallContext,
    catalog_dir: &Path,
) -> Result<Vec<ReleaseCatalogEntry>> {
    let catalog = ReleaseCatalog::new(FsObjectStore::new(catalog_dir));
    let mut entries = catalog
        .entries(ctx)
        .await
        .context("failed to read release catalog")?;
    entries.sort_by(|a, b| a.version.cmp(&b.version));

    for entry in &entries {
        let mut flags = Vec::new();
        if entry.ignored {
            flags.push("ignored");
        }
        if entry.version.is_alpha() {
            flags.push("alpha");
        }
        if flags.is_empty() {
            println!("{}", entry.raw_name);
        } else {
            println!("{} ({})", entry.raw_name, flags.join(", "));
        }
    }
    Ok(entries)
}

async fn cmd_catalog_components(
    ctx: &CallContext,
    catalog_dir: &Path,
    release: &str,
) -> Result<()> {
    let catalog = ReleaseCatalog::new(FsObjectStore::new(catalog_dir));
    let versions = catalog
        .component_versions(ctx, release)
        .await
        .with_context(|| format!("failed to read components of release {}", release))?;
    print_json(versions.as_ref())
}

async fn cmd_diff(
    before: &Path,
    after: &Path,
    skip_prefixes: &[String],
) -> Result<Vec<PatchOperation>> {
    let raw = tokio::fs::read(before)
        .await
        .with_context(|| format!("failed to read {}", before.display()))?;
    let desired: Value = serde_json::from_slice(
        &tokio::fs::read(after)
            .await
            .with_context(|| format!("failed to read {}", after.display()))?,
    )
    .with_context(|| format!("{} is not valid JSON", after.display()))?;

    let mut patches = diff_from_raw(&raw, &desired)
        .with_context(|| format!("{} is not valid JSON", before.display()))?;
    for prefix in skip_prefixes {
        patches = filter_by_path_prefix(patches, prefix);
    }
    debug!(ops = patches.len(), "patch computed");

    print_json(&patches)?;
    Ok(patches)
}

async fn cmd_vm_caps(
    ctx: &CallContext,
    region: &str,
    instance_type: &str,
    query: CapsQuery,
) -> Result<()> {
    let source = HttpCapabilitySource::from_env().context("failed to configure inventory client")?;
    let caps = VmCapabilities::new(source);

    match query {
        CapsQuery::Memory => println!("{}", caps.memory(ctx, region, instance_type).await?),
        CapsQuery::Cpus => println!("{}", caps.cpus(ctx, region, instance_type).await?),
        CapsQuery::Has { capability } => println!(
            "{}",
            caps.has_capability(ctx, region, instance_type, &capability)
                .await?
        ),
        CapsQuery::Show => {
            let record: CapabilityRecord = caps.record(ctx, region, instance_type).await?;
            print_json(&record)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use admission_core::UpgradeReason;
    use admission_state::{Record, RELEASE_KIND};
    use serde_json::json;
    use tracing_test::traced_test;

    async fn catalog_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        for name in names {
            store.put(&Record::new(RELEASE_KIND, *name)).await.unwrap();
        }
        dir
    }

    #[test]
    fn parses_upgrade_command() {
        let cli = Cli::try_parse_from([
            "admission",
            "--catalog-dir",
            "/tmp/releases",
            "upgrade",
            "--from",
            "v11.3.0",
            "--to",
            "v11.4.0",
        ])
        .unwrap();
        assert_eq!(cli.catalog_dir, PathBuf::from("/tmp/releases"));
        assert_eq!(cli.timeout_secs, 30);
        assert!(matches!(
            cli.command,
            Commands::Upgrade { ref from, ref to } if from == "v11.3.0" && to == "v11.4.0"
        ));
    }

    #[test]
    fn parses_repeated_skip_prefix() {
        let cli = Cli::try_parse_from([
            "admission",
            "diff",
            "a.json",
            "b.json",
            "--skip-prefix",
            "/spec/networkSpec",
            "--skip-prefix",
            "/status",
        ])
        .unwrap();
        match cli.command {
            Commands::Diff { skip_prefixes, .. } => {
                assert_eq!(skip_prefixes, vec!["/spec/networkSpec", "/status"])
            }
            _ => panic!("expected diff"),
        }
    }

    #[test]
    fn parses_vm_caps_query() {
        let cli = Cli::try_parse_from([
            "admission",
            "vm-caps",
            "--region",
            "westeurope",
            "--instance-type",
            "Standard_D4s_v3",
            "has",
            "PremiumIO",
        ])
        .unwrap();
        match cli.command {
            Commands::VmCaps { query, .. } => assert_eq!(
                query,
                CapsQuery::Has {
                    capability: "PremiumIO".into()
                }
            ),
            _ => panic!("expected vm-caps"),
        }
    }

    #[test]
    fn upgrade_requires_both_versions() {
        assert!(Cli::try_parse_from(["admission", "upgrade", "--from", "v1.0.0"]).is_err());
    }

    #[tokio::test]
    async fn upgrade_reads_catalog_dir() {
        let dir = catalog_dir(&["v11.3.0", "v11.4.0", "v12.0.0"]).await;
        let ctx = CallContext::new();

        let decision = cmd_upgrade(&ctx, dir.path(), "11.3.0", "11.4.0").await.unwrap();
        assert!(decision.allowed);

        let decision = cmd_upgrade(&ctx, dir.path(), "11.3.0", "12.0.0").await.unwrap();
        assert!(!decision.allowed);
        assert!(matches!(decision.reason, UpgradeReason::ReleaseSkipped { .. }));
    }

    #[tokio::test]
    async fn catalog_list_is_sorted_by_version() {
        let dir = catalog_dir(&["v11.10.0", "v11.9.0", "v11.9.1"]).await;
        let entries = cmd_catalog_list(&CallContext::new(), dir.path()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.raw_name.as_str()).collect();
        assert_eq!(names, vec!["v11.9.0", "v11.9.1", "v11.10.0"]);
    }

    #[tokio::test]
    async fn diff_applies_skip_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let before = dir.path().join("before.json");
        let after = dir.path().join("after.json");
        let before_doc = json!({"spec": {"networkSpec": {"vnet": "a"}, "location": "x"}});
        let after_doc = json!({"spec": {"networkSpec": {"vnet": "b"}, "location": "y"}});
        std::fs::write(&before, before_doc.to_string()).unwrap();
        std::fs::write(&after, after_doc.to_string()).unwrap();

        let ops = cmd_diff(&before, &after, &["/spec/networkSpec".to_string()])
            .await
            .unwrap();
        assert_eq!(ops, vec![PatchOperation::replace("/spec/location", json!("y"))]);
    }

    #[tokio::test]
    async fn diff_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = cmd_diff(&missing, &missing, &[]).await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[traced_test]
    #[tokio::test]
    async fn metrics_are_flushed_when_a_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "admission",
            "diff",
            dir.path().join("missing-before.json").to_str().unwrap(),
            dir.path().join("missing-after.json").to_str().unwrap(),
        ])
        .unwrap();

        assert!(run_and_flush(cli).await.is_err());
        assert!(logs_contain("patch_ops_emitted"));
    }
}
