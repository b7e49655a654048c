//! `generate` subcommand: write a synthetic HAR file with injected terms.

use anyhow::{bail, Context, Result};
use std::path::Path;

use har_engine::generator::{write_har_file, GeneratorOptions, InjectField, Injection};

pub fn run(output: &Path, entries: usize, injections: &[String]) -> Result<()> {
    let mut parsed = Vec::with_capacity(injections.len());
    for spec in injections {
        let (term, field) = spec.split_once('=').with_context(|| format!("invalid --inject '{spec}', expected TERM=FIELD"))?;
        let field = InjectField::parse(field).ok_or_else(|| anyhow::anyhow!("unknown field '{field}' in --inject '{spec}'"))?;
        parsed.push(Injection {
            term: term.to_string(),
            field,
        });
    }

    if entries == 0 && parsed.is_empty() {
        bail!("refusing to generate an empty HAR file: pass --entries or --inject");
    }

    let options = GeneratorOptions {
        entry_count: entries,
        injections: parsed,
    };
    write_har_file(output, &options)?;
    println!("wrote {} entries to {}", entries + options.injections.len(), output.display());
    Ok(())
}
