use anyhow::{bail, Result};
use scoreroll::{score::pitch_to_name, score_to_pianoroll, Config};
use std::{env, path::Path};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let quantization = match args.len() {
        2 => 4,
        3 => args[2].parse()?,
        _ => bail!("usage: {} <score.xml> [frames per quarter]", args[0]),
    };
    let result = score_to_pianoroll(Path::new(&args[1]), Config::new(quantization))?;

    for (name, part) in &result.matrices {
        let range = match part.pitch_range() {
            Some((low, high)) => format!("{}..{}", pitch_to_name(low), pitch_to_name(high)),
            None => "silent".to_string(),
        };
        println!(
            "{}: {} frames, {} attacks, {}",
            name,
            part.frames(),
            part.attack_count(),
            range
        );
    }
    for diagnostic in &result.diagnostics {
        println!("  {}", diagnostic);
    }
    for failure in &result.failures {
        println!("  skipped {}", failure);
    }
    Ok(())
}
