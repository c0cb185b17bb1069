use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{command, Arg, ArgAction};
use multilink::pack;

fn main() -> Result<()> {
    let matches = command!()
        .max_term_width(100)
        .args(&[
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("path")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("The combined relocatable object to write"),
            Arg::new("core")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("The program assembled at its canonical base address"),
            Arg::new("zp")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("The same program assembled at a different zero-page base"),
            Arg::new("mem")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("The same program assembled at a different text-segment base"),
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Print the resolved paths and the size of each region"),
        ])
        .get_matches();

    if matches.get_flag("verbose") {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("multilink", log::LevelFilter::Debug)
            .init();
    }

    let core_path = matches.get_one::<PathBuf>("core").unwrap();
    let zp_path = matches.get_one::<PathBuf>("zp").unwrap();
    let mem_path = matches.get_one::<PathBuf>("mem").unwrap();
    let out_path = matches.get_one::<PathBuf>("output").unwrap();

    log::debug!("core file: {}", core_path.display());
    log::debug!("zp file:   {}", zp_path.display());
    log::debug!("mem file:  {}", mem_path.display());

    let core = fs::read(core_path).with_context(|| format!("Failed to read core file '{}'", core_path.display()))?;
    let zp = fs::read(zp_path).with_context(|| format!("Failed to read zp file '{}'", zp_path.display()))?;
    let mem = fs::read(mem_path).with_context(|| format!("Failed to read mem file '{}'", mem_path.display()))?;

    let packed = pack::pack(&core, &zp, &mem)?;

    log::debug!(
        "{} code bytes, {} zp relocation bytes, {} text relocation bytes",
        packed.code_len,
        packed.zp_relocation_len,
        packed.text_relocation_len
    );

    if out_path.exists() {
        fs::remove_file(out_path)?;
    }
    fs::write(out_path, &packed.object)
        .with_context(|| format!("Failed to write output file '{}'", out_path.display()))?;

    Ok(())
}
