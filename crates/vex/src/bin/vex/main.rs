mod cli;

use vex::collection::Collection;
use vex::value::Value;
use vex::ExpandOptions;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("VEX_LOG"))
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
        cli::Command::Lookup(lookup_cli) => lookup(lookup_cli),
        cli::Command::Keys(keys_cli) => keys(keys_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn lookup(cli: cli::LookupCommand) -> anyhow::Result<()> {
    let collection = load(&cli.input)?;

    let opts = ExpandOptions { lax: cli.input.lax };
    let value = collection.resolve_with(&cli.name, opts)?;

    output(&cli.output, &value)?;
    Ok(())
}

pub fn keys(cli: cli::KeysCommand) -> anyhow::Result<()> {
    let collection = load(&cli.input)?;

    for key in collection.keys()? {
        println!("{key}");
    }
    Ok(())
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Collection> {
    anyhow::ensure!(!input.files.is_empty(), "No root files given (use -f)");

    let mut collection = Collection::default();
    for file_path in &input.files {
        collection.load_file(file_path)?;
    }

    for define in &input.defines {
        let Some((key, value)) = define.split_once('=') else {
            anyhow::bail!("-D/--define expects key=value, got {define:?}");
        };
        collection.set(key, value)?;
    }

    collection.run_collector()?;

    Ok(collection)
}

fn output(output: &cli::OutputArgs, value: &Value) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Text => println!("{value}"),
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (vex-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let collection = load(&cli.input)?;

    match cli.command {
        Store => println!("{collection:#?}"),
        Blanks => {
            collection.expand_all()?;
            for name in collection.blanks() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
