use std::{
    env,
    ffi::OsString,
    path::PathBuf,
    process,
};

use poisonset::{inject, Error, InjectionSummary, RunPaths};

#[derive(Debug)]
enum CliError {
    Usage(String),
    Run(Error),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(()) => {}
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            process::exit(1);
        }
        Err(CliError::Run(e)) => {
            eprintln!("fatal: {e}");
            process::exit(1);
        }
    }
}

fn run() -> Result<(), CliError> {
    let paths = parse_args(env::args_os().collect())?;
    let summary = inject(&paths).map_err(CliError::Run)?;
    print_summary(&summary, &paths);
    Ok(())
}

fn usage(exe: &str) -> String {
    format!(
        "Usage: {exe} <main_dataset> <malicious_pool> <output_dataset> <profile_config> [plugin_path]
    - <main_dataset> newline-delimited rows, first row is the header.
    - <malicious_pool> newline-delimited rows used verbatim for substitution.
    - <profile_config> JSON mutation profile.
    - [plugin_path] shared library exporting custom_mutate / custom_mutate_free."
    )
}

fn parse_args(args_os: Vec<OsString>) -> Result<RunPaths, CliError> {
    let mut it = args_os.into_iter();
    let exe = it
        .next()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "poisonset".to_string());
    let positionals: Vec<PathBuf> = it.map(PathBuf::from).collect();
    if !(4..=5).contains(&positionals.len()) {
        return Err(CliError::Usage(usage(&exe)));
    }
    let mut p = positionals.into_iter();
    let (Some(dataset), Some(malicious_pool), Some(output), Some(profile)) =
        (p.next(), p.next(), p.next(), p.next())
    else {
        return Err(CliError::Usage(usage(&exe)));
    };
    Ok(RunPaths {
        dataset,
        malicious_pool,
        output,
        profile,
        plugin: p.next(),
    })
}

fn print_summary(summary: &InjectionSummary, paths: &RunPaths) {
    println!(
        "Injection complete. {} entries injected with anomaly level {}.",
        summary.rows_injected, summary.anomaly_level
    );
    println!(
        "  changed={} substituted={} mutated={} truncated={} plugin_fallbacks={} rows={}",
        summary.rows_changed,
        summary.substituted,
        summary.mutated,
        summary.truncated,
        summary.plugin_fallbacks,
        summary.rows_read
    );
    println!("Output saved to: {}", paths.output.to_string_lossy());
}
