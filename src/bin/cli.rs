use std::io::Read;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use rnp::{translate, FsResolver, Level, TranslateOptions, Translation, Type};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "rnpc", about = "Compile RNP gauge scripts to instruction text", version)]
struct Cli {
    /// Source file, or `-` to read stdin
    input: String,

    /// Name of the module in diagnostics (defaults to the input path)
    #[arg(long)]
    specifier: Option<String>,

    /// Type the program must evaluate to
    #[arg(long, value_enum, default_value_t = ReturnType::Void)]
    return_type: ReturnType,

    /// Directory imports resolve against when the input is not a file
    #[arg(long)]
    root: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReturnType {
    Void,
    Number,
    Boolean,
    String,
    Any,
}

impl From<ReturnType> for Type {
    fn from(value: ReturnType) -> Self {
        match value {
            ReturnType::Void => Type::Void,
            ReturnType::Number => Type::Number,
            ReturnType::Boolean => Type::Boolean,
            ReturnType::String => Type::String,
            ReturnType::Any => Type::Any,
        }
    }
}

// ── Input ────────────────────────────────────────────────────────

fn read_input(input: &str) -> std::io::Result<String> {
    if input == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(input)
    }
}

// ── Output ───────────────────────────────────────────────────────

fn print_translation(translation: &Translation, raw_json: bool) {
    if raw_json {
        match serde_json::to_string_pretty(translation) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }

    for message in &translation.messages {
        let label = match message.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        eprintln!("{label}: {}", message.message);
        if !message.detail.is_empty() {
            eprintln!("{}", message.detail);
        }
    }
    if translation.is_ok() {
        println!("{}", translation.output);
    }
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = match read_input(&cli.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read {}: {e}", cli.input);
            process::exit(1);
        }
    };

    let specifier = cli.specifier.unwrap_or_else(|| {
        if cli.input == "-" {
            "(stdin)".to_string()
        } else {
            cli.input.clone()
        }
    });
    let root = cli
        .root
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    tracing::debug!(%specifier, root = %root.display(), "compiling");

    let resolver = FsResolver::new(root);
    let options = TranslateOptions {
        specifier,
        expected_return_type: cli.return_type.into(),
        resolver: Some(&resolver),
    };
    let translation = translate(&source, &options);
    print_translation(&translation, cli.json);

    if !translation.is_ok() {
        process::exit(1);
    }
}
