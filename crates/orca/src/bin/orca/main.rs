mod cli;

use anyhow::Context;
use indexmap::IndexMap;
use orca::document::{Documents, Locator, Node};
use orca::issue::{Issues, Severity};
use orca::plan::PlanOptions;
use orca::value::Value;
use std::path::Path;
use std::sync::Arc;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ORCA_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Validate(validate_cli) => validate(validate_cli),
        cli::Command::Plan(plan_cli) => plan(plan_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn validate(cli: cli::ValidateCommand) -> anyhow::Result<()> {
    let documents = load(&cli.input)?;
    let inputs = input_values(&cli.values)?;
    let outcome = orca::process(&documents, &inputs, &mut PlanOptions::default())?;

    report(&outcome.issues);
    let failed = outcome
        .issues
        .iter()
        .filter(|issue| cli.strict || issue.severity == Severity::Error)
        .count();
    anyhow::ensure!(failed == 0, "{failed} issue(s) failed validation");

    eprintln!("{} node template(s) valid", outcome.registry.node_templates.len());
    Ok(())
}

pub fn plan(cli: cli::PlanCommand) -> anyhow::Result<()> {
    let documents = load(&cli.input)?;
    let inputs = input_values(&cli.values)?;
    let mut options = if cli.sequential_ids {
        PlanOptions::sequential()
    } else {
        PlanOptions::default()
    };
    let outcome = orca::process(&documents, &inputs, &mut options)?;

    report(&outcome.issues);
    if outcome.issues.has_errors() && !cli.provisional {
        anyhow::bail!("Errors found, no plan written (use --provisional to print it anyway)");
    }

    match cli.output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), &outcome.plan)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), &outcome.plan)?,
    };

    Ok(())
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Documents> {
    let mut documents = Documents::default();

    if !input.workdir && input.files.is_empty() && input.directories.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        documents.insert_str(&stdin, None)?;
        return Ok(documents);
    }

    if input.workdir {
        documents.load_directory(&std::env::current_dir()?)?;
    }

    for file_path in &input.files {
        documents
            .load_file(file_path)
            .with_context(|| format!("Failed to load {}", file_path.display()))?;
    }

    for dir_path in &input.directories {
        documents
            .load_directory(dir_path)
            .with_context(|| format!("Failed to load directory {}", dir_path.display()))?;
    }

    anyhow::ensure!(documents.document_count() > 0, "No files loaded");

    Ok(documents)
}

/// Input files first, then `--input` pairs, later values win
fn input_values(values: &cli::InputValues) -> anyhow::Result<IndexMap<String, Value>> {
    let mut inputs = IndexMap::new();

    for path in &values.files {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let Value::Object(mapping) = parse_value(&text, Some(path.as_path()), "")? else {
            anyhow::bail!("Inputs file {} must contain a mapping", path.display());
        };
        inputs.extend(mapping);
    }

    for pair in &values.pairs {
        let (key, text) = pair
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, found `{pair}`"))?;
        inputs.insert(key.to_string(), parse_value(text, None, key)?);
    }

    Ok(inputs)
}

fn parse_value(text: &str, source: Option<&Path>, path: &str) -> anyhow::Result<Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    let locator = Locator::new(source.map(|source| Arc::new(source.to_path_buf())), path);
    let node = Node::from_yaml(yaml, &locator)?;
    Ok(Value::from(&node))
}

fn report(issues: &Issues) {
    if !issues.is_empty() {
        eprint!("{issues}");
    }
}

/// (orca-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    let mut documents = Documents::default();
    documents.load_directory(&std::env::current_dir()?)?;

    let presenters = orca::presenters()?;
    let mut issues = Issues::new();
    let registry = orca::registry::Registry::load(&documents, &presenters, &mut issues)?;

    match cli.command {
        cli::DevSubCommand::Documents => println!("{documents:#?}"),
        cli::DevSubCommand::Schemas => println!("{presenters:#?}"),
        cli::DevSubCommand::Registry => println!("{registry:#?}"),
        cli::DevSubCommand::Topology => {
            let topology = orca::linker::Linker::new(&registry).link(&mut issues)?;
            println!("{topology:#?}");
        }
    }

    report(&issues);
    Ok(())
}
