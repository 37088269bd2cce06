use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use curbside::{translate, TranslatedStatement, TranslatorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Input .vbs source file
    input: PathBuf,
    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Name of the runtime support reference in the emitted code
    #[arg(long, default_value = "_")]
    support_name: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("unable to read {}", cli.input.display()))?;
    let config = TranslatorConfig {
        support_class_name: cli.support_name.clone(),
        ..TranslatorConfig::default()
    };
    let output = translate(&source, &config)
        .with_context(|| format!("translation of {} failed", cli.input.display()))?;
    for warning in &output.warnings {
        eprintln!("warning: line {}: {}", warning.line + 1, warning.message);
    }
    let text = TranslatedStatement::render(&output.statements);
    match &cli.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("unable to write {}", path.display()))?
        }
        None => print!("{}", text),
    }
    Ok(())
}
