use anyhow::{bail, Context, Result};
use scoreroll::{
    cmdline::{parse_args, Cli},
    score_to_pianoroll, Interpretation, MatrixTriple,
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufWriter, Write},
};

#[derive(Serialize)]
struct PartOutput<'a> {
    #[serde(flatten)]
    matrices: &'a MatrixTriple,
    #[serde(skip_serializing_if = "Option::is_none")]
    velocity: Option<Vec<Vec<u8>>>,
}

fn main() {
    let args = parse_args();
    if let Err(err) = run(&args) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let result = score_to_pianoroll(&args.input, args.config())?;
    report(&result, args.quiet);
    if result.matrices.is_empty() && !result.failures.is_empty() {
        bail!("no part of {} could be converted", args.input.display());
    }
    let output: BTreeMap<&str, PartOutput> = result
        .matrices
        .iter()
        .map(|(name, matrices)| {
            let velocity = args.velocity.then(|| matrices.velocity_roll());
            (name.as_str(), PartOutput { matrices, velocity })
        })
        .collect();
    match &args.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("can't create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &output)?;
            writer.flush()?;
            let frames = result.matrices.values().next().map_or(0, MatrixTriple::frames);
            println!(
                "wrote {} parts of {} frames to {}",
                output.len(),
                frames,
                path.display()
            );
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer(&mut lock, &output)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

fn report(result: &Interpretation, quiet: bool) {
    if !quiet {
        for diagnostic in &result.diagnostics {
            eprintln!("warning: {}", diagnostic);
        }
    }
    for failure in &result.failures {
        eprintln!("skipped {}", failure);
    }
}
