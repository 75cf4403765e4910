//! Implementation of the `cxxnode cache` commands.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use cxxnode_lib::cache::{CacheRoot, EvictScope, cache_evict, cache_info};

use crate::output::{
  OutputFormat, format_bytes, format_unix_time, print_info, print_json, print_stat, print_success, symbols,
};

fn open_cache() -> Result<CacheRoot> {
  CacheRoot::open_default().context("Failed to open dependency cache")
}

pub fn cmd_cache_info(output: OutputFormat) -> Result<()> {
  let cache = open_cache()?;
  let report = cache_info(&cache)?;

  if output.is_json() {
    return print_json(&report);
  }

  print_stat("Cache", &report.root.display().to_string());
  if report.entries.is_empty() {
    print_info("No cached dependencies");
    return Ok(());
  }
  println!();
  for entry in &report.entries {
    let used = entry
      .last_used
      .map(format_unix_time)
      .unwrap_or_else(|| "never".to_string());
    let marker = if entry.corrupt {
      format!(" {}", "corrupt".if_supports_color(Stream::Stdout, |s| s.red()))
    } else {
      String::new()
    };
    println!(
      "  {} {}  {}  last used {}{}",
      symbols::INFO,
      entry.label,
      format_bytes(entry.size_bytes),
      used,
      marker
    );
  }
  println!();
  print_stat("Entries", &report.entries.len().to_string());
  print_stat("Total size", &format_bytes(report.total_bytes));
  Ok(())
}

pub fn cmd_cache_clean(name: Option<String>, output: OutputFormat) -> Result<()> {
  let cache = open_cache()?;
  let scope = match name {
    Some(name) => EvictScope::Named(name),
    None => EvictScope::All,
  };
  let report = cache_evict(&cache, &scope)?;

  if output.is_json() {
    return print_json(&report);
  }

  if report.removed.is_empty() {
    print_info("Nothing to remove");
  } else {
    print_success("Cache cleaned");
    for label in &report.removed {
      println!("  {} {}", symbols::REMOVE, label);
    }
  }
  print_stat("Removed", &report.removed.len().to_string());
  print_stat("Space freed", &format_bytes(report.bytes_freed));
  Ok(())
}
