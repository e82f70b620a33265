use anyhow::{bail, Result};
use scoreroll::musicxml::read_file;
use std::{env, path::Path};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        bail!("usage: {} <score.xml>", args[0]);
    }
    let events = read_file(Path::new(&args[1]))?;
    for event in &events {
        println!("{}", event);
    }
    eprintln!("{} events", events.len());
    Ok(())
}
