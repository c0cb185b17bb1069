use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{command, Arg, ArgAction};

fn main() -> Result<()> {
    let matches = command!()
        .max_term_width(100)
        .args(&[
            Arg::new("input")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("The 6502 source file to assemble"),
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("path")
                .value_parser(clap::value_parser!(PathBuf))
                .help("The relocatable object file to write. Defaults to <input> with its extension replaced by .obj"),
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        ])
        .get_matches();

    if matches.get_flag("verbose") {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("relo6502", log::LevelFilter::Debug)
            .filter_module("asm_cli", log::LevelFilter::Debug)
            .init();
    }

    let in_path = matches.get_one::<PathBuf>("input").unwrap();
    let out_path = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| in_path.with_extension("obj"));
    let sym_path = out_path.with_extension("sym");

    log::debug!("assembling '{}' -> '{}' ('{}')", in_path.display(), out_path.display(), sym_path.display());

    let output = relo6502::assemble_file(in_path).map_err(|e| {
        if let Some(line) = e.line() {
            anyhow::anyhow!("{}:{}: {}", in_path.display(), line, e)
        } else {
            anyhow::anyhow!("{}: {}", in_path.display(), e)
        }
    })?;

    write_output(&out_path, &output.object)
        .with_context(|| format!("Failed to write object file '{}'", out_path.display()))?;
    write_output(&sym_path, &output.listing)
        .with_context(|| format!("Failed to write symbol file '{}'", sym_path.display()))?;

    Ok(())
}

/// Write `data` to `path`, first removing a stale file from a previous
/// failed run so a partial write never masquerades as a complete one.
fn write_output(path: &PathBuf, data: &[u8]) -> anyhow::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::write(path, data)?;
    Ok(())
}
