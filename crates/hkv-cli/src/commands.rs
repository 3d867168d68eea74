use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use hkv_archive::Archive;
use hkv_hash::{verification_value, VERIFICATION_VALUE};
use hkv_store::codec;
use hkv_store::{StoreConfig, StorePaths, StringStore};
use hkv_types::RecordNumber;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Set(args) => cmd_set(args, &config, format),
        Command::Get(args) => cmd_get(args, &config, format),
        Command::Remove(args) => cmd_remove(args, &config, format),
        Command::Stats(args) => cmd_stats(args, &config, format),
        Command::Dump(args) => cmd_dump(args, &config, format),
        Command::VerifyHash => cmd_verify_hash(format),
        Command::Backup(args) => cmd_backup(args, &config, format),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if cli.case_sensitive {
        config.case_sensitive = true;
    }
    debug!(?config, "store configuration");
    Ok(config)
}

fn open(db: &std::path::Path, config: &StoreConfig) -> anyhow::Result<StringStore> {
    StringStore::open(db, config).with_context(|| format!("opening store {}", db.display()))
}

fn cmd_set(args: SetArgs, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(&args.db, config)?;
    let number = store.set_str(&args.key, &args.value)?;
    store.shutdown()?;

    match format {
        OutputFormat::Json => println!("{}", json!({ "key": args.key, "record": number.get() })),
        OutputFormat::Text => println!(
            "{} Stored {} as record {}",
            "✓".green().bold(),
            args.key.bold(),
            number.to_string().yellow()
        ),
    }
    Ok(())
}

fn cmd_get(args: KeyArgs, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(&args.db, config)?;
    let value = store.get_str(&args.key)?;
    store.shutdown()?;

    match (format, value) {
        (OutputFormat::Json, value) => println!("{}", json!({ "key": args.key, "value": value })),
        (OutputFormat::Text, Some(value)) => println!("{value}"),
        (OutputFormat::Text, None) => println!("{} {} not found", "✗".red(), args.key.bold()),
    }
    Ok(())
}

fn cmd_remove(args: KeyArgs, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(&args.db, config)?;
    let removed = store.remove(&args.key)?;
    store.shutdown()?;

    match format {
        OutputFormat::Json => println!("{}", json!({ "key": args.key, "removed": removed })),
        OutputFormat::Text if removed => {
            println!("{} Removed {}", "✓".green().bold(), args.key.bold())
        }
        OutputFormat::Text => println!("{} had no live record", args.key.bold()),
    }
    Ok(())
}

fn cmd_stats(args: StoreArgs, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(&args.db, config)?;
    let stats = store.store().stats()?;
    let paths = store.store().paths().clone();
    store.shutdown()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Store {}", paths.name.bold());
            println!("  Archive: {}", paths.data.display());
            println!("  Records: {}", stats.records.to_string().bold());
            println!("  Tombstones: {}", stats.tombstones);
            println!("  Approximate count: {}", stats.approximate_count.to_string().cyan());
            println!(
                "  Hash keys: {} live / {} total ({} chained)",
                stats.live_hash_keys, stats.hash_keys, stats.chained_hash_keys
            );
        }
    }
    Ok(())
}

fn cmd_dump(args: DumpArgs, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(&args.db, config)?;
    let limit = args.limit.unwrap_or(usize::MAX);
    let mut rows = Vec::new();

    for record in store.store().enumerate_storage()?.take(limit) {
        let record = record?;
        let (key, value) = match codec::unpack(&record.data) {
            Ok((key, value)) => (render(key), render(value)),
            Err(_) => (String::new(), render(&record.data)),
        };
        match format {
            OutputFormat::Json => rows.push(json!({
                "record": record.number.get(),
                "hash": record.key.to_hex(),
                "deleted": record.deleted,
                "key": key,
                "value": value,
            })),
            OutputFormat::Text => {
                let marker = if record.deleted {
                    "deleted".red().to_string()
                } else {
                    "live".green().to_string()
                };
                println!(
                    "{} {} {} {} = {}",
                    record.number.to_string().yellow(),
                    record.key.to_string().dimmed(),
                    marker,
                    key.bold(),
                    value
                );
            }
        }
    }
    store.shutdown()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(())
}

/// UTF-16LE text when the bytes decode, hex otherwise.
fn render(bytes: &[u8]) -> String {
    codec::decode_utf16le(bytes).unwrap_or_else(|_| format!("0x{}", hex::encode(bytes)))
}

fn cmd_verify_hash(format: OutputFormat) -> anyhow::Result<()> {
    let actual = verification_value();
    let ok = actual == VERIFICATION_VALUE;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "expected": format!("{VERIFICATION_VALUE:#010x}"),
                "actual": format!("{actual:#010x}"),
                "ok": ok,
            })
        ),
        OutputFormat::Text if ok => println!(
            "{} Murmur3 verification value {:#010x}",
            "✓".green().bold(),
            actual
        ),
        OutputFormat::Text => println!(
            "{} Murmur3 verification value {:#010x}, expected {:#010x}",
            "✗".red().bold(),
            actual,
            VERIFICATION_VALUE
        ),
    }
    anyhow::ensure!(ok, "hash self-test failed");
    Ok(())
}

fn cmd_backup(args: BackupArgs, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open(&args.db, config)?;
    let target_paths = StorePaths::new(&args.target);
    let target = Archive::open(&target_paths.data, config.archive_config())
        .with_context(|| format!("opening backup archive {}", target_paths.data.display()))?;

    let copied = store
        .store()
        .copy_to(&target, RecordNumber::new(args.from))?;
    target.shutdown()?;
    store.shutdown()?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "target": target_paths.data.display().to_string(), "copied": copied })
        ),
        OutputFormat::Text => println!(
            "{} Copied {} records to {}",
            "✓".green().bold(),
            copied.to_string().bold(),
            target_paths.data.display()
        ),
    }
    Ok(())
}
