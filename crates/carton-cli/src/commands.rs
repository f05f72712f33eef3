use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;

use carton_bundle::{BundleReader, BundleWriter, FlushedBundle};
use carton_refs::{FsRefStore, RefStore};
use carton_store::{BlobStore, FsBlobStore};
use carton_tree::{extract, snapshot, snapshot_with_base, SnapshotOutcome};
use carton_types::{BundleId, Locator};

use crate::cli::*;
use crate::config::StoreConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ctx = StoreContext::open(&cli.store)?;
    match cli.command {
        Command::Create(args) => cmd_create(&ctx, args, &cli.format),
        Command::Extract(args) => cmd_extract(&ctx, args, &cli.format),
        Command::Inspect(args) => cmd_inspect(&ctx, args, &cli.format),
        Command::Refs(args) => cmd_refs(&ctx, args, &cli.format),
    }
}

/// Everything a command needs: blob backend, ref store, store config.
pub struct StoreContext {
    blobs: Arc<dyn BlobStore>,
    refs: FsRefStore,
    config: StoreConfig,
}

impl StoreContext {
    pub fn open(store_dir: &Path) -> anyhow::Result<Self> {
        let blobs = FsBlobStore::open(store_dir)
            .with_context(|| format!("opening blob store at {}", store_dir.display()))?;
        let refs = FsRefStore::open(store_dir)
            .with_context(|| format!("opening ref store at {}", store_dir.display()))?;
        let config = StoreConfig::load(store_dir)?;
        Ok(Self {
            blobs: Arc::new(blobs),
            refs,
            config,
        })
    }

    fn reader(&self) -> BundleReader {
        BundleReader::new(Arc::clone(&self.blobs))
    }

    fn writer(&self) -> BundleWriter {
        BundleWriter::with_config(Arc::clone(&self.blobs), self.config.writer_config())
    }

    /// A target string is either a locator or a ref name.
    fn resolve_target(&self, target: &str) -> anyhow::Result<Locator> {
        if let Ok(locator) = Locator::from_str(target) {
            return Ok(locator);
        }
        match self.refs.read(target)? {
            Some(r) => Ok(r.locator),
            None => bail!("no such ref or locator: {target}"),
        }
    }
}

fn cmd_create(ctx: &StoreContext, args: CreateArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let policy = ctx.config.chunk_policy(args.target_chunk_size)?;
    let mut writer = ctx.writer();

    let (root, written, generation) = match &args.r#ref {
        None => {
            let flushed = snapshot(&mut writer, &args.input, &policy)?;
            (flushed.root, Some(flushed), None)
        }
        Some(name) => match ctx.refs.read(name)? {
            None => {
                let flushed = snapshot(&mut writer, &args.input, &policy)?;
                let generation = ctx
                    .refs
                    .compare_and_swap(name, flushed.root, None)
                    .with_context(|| format!("publishing ref {name}"))?;
                (flushed.root, Some(flushed), Some(generation))
            }
            Some(current) => {
                let reader = ctx.reader();
                let outcome = snapshot_with_base(
                    &mut writer,
                    &reader,
                    &args.input,
                    &policy,
                    &current.locator,
                )?;
                match outcome {
                    SnapshotOutcome::Unchanged(locator) => (locator, None, None),
                    SnapshotOutcome::Written(flushed) => {
                        let generation = ctx
                            .refs
                            .compare_and_swap(name, flushed.root, Some(current.generation))
                            .with_context(|| {
                                format!("publishing ref {name} (re-read and retry on conflict)")
                            })?;
                        (flushed.root, Some(flushed), Some(generation))
                    }
                }
            }
        },
    };

    match format {
        OutputFormat::Json => {
            let stats = written.as_ref().map(|f| stats_json(f));
            println!(
                "{}",
                serde_json::json!({
                    "root": root.to_string(),
                    "ref": args.r#ref,
                    "generation": generation,
                    "unchanged": written.is_none(),
                    "bundle": stats,
                })
            );
        }
        OutputFormat::Text => {
            match &written {
                Some(flushed) => {
                    println!(
                        "{} Created bundle {}",
                        "✓".green().bold(),
                        flushed.bundle.short_hex().yellow()
                    );
                    print_stats(&flushed.stats);
                }
                None => println!("{} Tree unchanged, nothing written", "✓".green().bold()),
            }
            println!("  Root: {}", root.to_string().cyan());
            if let (Some(name), Some(generation)) = (&args.r#ref, generation) {
                println!("  Ref: {} (generation {})", name.yellow(), generation);
            }
        }
    }
    Ok(())
}

fn cmd_extract(ctx: &StoreContext, args: ExtractArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let locator = ctx.resolve_target(&args.target)?;
    let reader = ctx.reader();
    extract(&reader, &locator, &args.output)
        .with_context(|| format!("extracting {locator}"))?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "root": locator.to_string(),
                "output": args.output.display().to_string(),
            })
        ),
        OutputFormat::Text => println!(
            "{} Extracted {} to {}",
            "✓".green().bold(),
            locator.short_form().cyan(),
            args.output.display().to_string().bold()
        ),
    }
    Ok(())
}

fn cmd_inspect(ctx: &StoreContext, args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let bundle = match Locator::from_str(&args.target) {
        Ok(locator) => locator.bundle,
        Err(_) => BundleId::from_hex(&args.target)
            .map_err(|_| anyhow::anyhow!("not a bundle id or locator: {}", args.target))?,
    };
    let reader = ctx.reader();
    let parsed = reader.header(&bundle)?;
    let header = &parsed.header;

    let decoded: u64 = header.packets.iter().map(|p| p.decoded_len).sum();
    let encoded: u64 = header.packets.iter().map(|p| p.encoded_len).sum();
    let slots = parsed.import_slot_count();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "bundle": bundle.to_hex(),
                    "header_bytes": parsed.header_len,
                    "types": header.types.iter().map(|t| {
                        serde_json::json!({ "type": t.type_id.to_string(), "version": t.version })
                    }).collect::<Vec<_>>(),
                    "imported_bundles": header.imports.len(),
                    "import_slots": slots,
                    "exports": header.exports.len(),
                    "packets": header.packets.iter().map(|p| {
                        serde_json::json!({
                            "encoded": p.encoded_len,
                            "decoded": p.decoded_len,
                        })
                    }).collect::<Vec<_>>(),
                    "decoded_bytes": decoded,
                    "encoded_bytes": encoded,
                })
            );
        }
        OutputFormat::Text => {
            println!("Bundle {}", bundle.to_hex().yellow());
            println!("  Header: {} bytes", parsed.header_len);
            println!("  Types:");
            for t in &header.types {
                println!("    {} v{}", t.type_id.to_string().cyan(), t.version);
            }
            println!(
                "  Imports: {} slots from {} bundles",
                slots,
                header.imports.len()
            );
            println!("  Exports: {}", header.exports.len());
            println!("  Packets: {}", header.packets.len());
            for (i, p) in header.packets.iter().enumerate() {
                println!(
                    "    #{i}: {} -> {} bytes ({})",
                    p.decoded_len,
                    p.encoded_len,
                    ratio(p.encoded_len, p.decoded_len).dimmed()
                );
            }
            if decoded > 0 {
                println!(
                    "  Compression: {} -> {} bytes ({})",
                    decoded,
                    encoded,
                    ratio(encoded, decoded).bold()
                );
            }
        }
    }
    Ok(())
}

fn cmd_refs(ctx: &StoreContext, args: RefsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let refs = ctx.refs.list(args.prefix.as_deref().unwrap_or(""))?;
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!(refs
                    .iter()
                    .map(|r| serde_json::json!({
                        "name": r.name,
                        "locator": r.locator.to_string(),
                        "generation": r.generation,
                    }))
                    .collect::<Vec<_>>())
            );
        }
        OutputFormat::Text => {
            if refs.is_empty() {
                println!("No refs.");
            }
            for r in refs {
                println!(
                    "{}  g{}  {}",
                    r.name.yellow().bold(),
                    r.generation,
                    r.locator.short_form().cyan()
                );
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &carton_bundle::BundleStats) {
    println!(
        "  Exports: {}, imports: {} ({} bundles), packets: {}",
        stats.exports, stats.import_slots, stats.imported_bundles, stats.packets
    );
    println!(
        "  Payload: {} -> {} bytes ({})",
        stats.decoded_bytes,
        stats.encoded_bytes,
        ratio(stats.encoded_bytes, stats.decoded_bytes).dimmed()
    );
}

fn stats_json(flushed: &FlushedBundle) -> serde_json::Value {
    serde_json::json!({
        "id": flushed.bundle.to_hex(),
        "exports": flushed.stats.exports,
        "import_slots": flushed.stats.import_slots,
        "imported_bundles": flushed.stats.imported_bundles,
        "packets": flushed.stats.packets,
        "decoded_bytes": flushed.stats.decoded_bytes,
        "encoded_bytes": flushed.stats.encoded_bytes,
        "blob_bytes": flushed.stats.blob_bytes,
    })
}

fn ratio(encoded: u64, decoded: u64) -> String {
    if decoded == 0 {
        return "-".to_string();
    }
    format!("{:.0}%", encoded as f64 * 100.0 / decoded as f64)
}
