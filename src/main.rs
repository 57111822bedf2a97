use std::panic;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dyncompile::analyzers::to_banned_symbols_analyzer;
use dyncompile::core::extensions::to_valid_ref_images;
use dyncompile::metadata::runtime::{
    image_file_name, runtime_assemblies, runtime_references, write_runtime, IMAGE_EXTENSION,
};
use dyncompile::{
    to_ref_with, try_to_language, AssemblyReference, CancellationToken, CodeReference,
    CompilationError, CompilationResultExt, CompileError, CompilerConfig, CompilerProvider,
    Language, Reference,
};

#[derive(Parser)]
#[command(name = "dyncompile")]
#[command(version)]
#[command(about = "Compile sources against reference images and report diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Inputs {
    /// Language name or source extension (inferred from the first source when omitted)
    #[arg(short, long, value_parser = parse_language)]
    language: Option<Language>,

    /// Compilation unit name (defaults to the first source's file stem)
    #[arg(short, long)]
    name: Option<String>,

    /// Reference image to compile against
    #[arg(short = 'r', long = "reference")]
    references: Vec<PathBuf>,

    /// Also reference the runtime assemblies (from the runtime directory when complete)
    #[arg(long)]
    runtime: bool,

    /// Source files
    #[arg(required = true)]
    sources: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile sources into an image
    Compile {
        #[command(flatten)]
        inputs: Inputs,

        /// Where to write the image (defaults to `<name>.dll`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the banned-symbols analyzer over the sources
    Analyse {
        #[command(flatten)]
        inputs: Inputs,

        /// Banned symbol rule, e.g. `T:System.Diagnostics.Process;Don't use Process`
        #[arg(long = "banned")]
        banned: Vec<String>,

        /// File with one banned symbol rule per line
        #[arg(long)]
        banned_file: Option<PathBuf>,
    },

    /// Write the built-in runtime reference assemblies into a directory
    Runtime {
        /// Defaults to the configured runtime directory
        dir: Option<PathBuf>,
    },
}

fn parse_language(value: &str) -> Result<Language, String> {
    try_to_language(value)
        .or_else(|| {
            Language::ALL
                .into_iter()
                .find(|l| l.to_string().eq_ignore_ascii_case(value))
        })
        .ok_or_else(|| format!("unknown language `{}`", value))
}

struct Job {
    language: Language,
    name: String,
    sources: Vec<String>,
    references: Vec<Reference>,
}

/// Runtime assemblies from the configured runtime directory, or the built-in
/// set when that directory is incomplete.
async fn runtime_images(
    config: &CompilerConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Reference>, CompileError> {
    let on_disk: Vec<Arc<dyn CodeReference>> = runtime_assemblies()
        .iter()
        .map(|a| {
            Arc::new(AssemblyReference::new(config.to_full_runtime_path(image_file_name(a))))
                as Arc<dyn CodeReference>
        })
        .collect();

    let images = to_valid_ref_images(&on_disk, cancel).await?;
    if images.len() == on_disk.len() {
        return Ok(images);
    }
    tracing::debug!(
        "Runtime directory {} is incomplete, using built-in runtime",
        config.runtime_dir.display()
    );
    runtime_references()
}

async fn load_job(
    inputs: Inputs,
    config: &CompilerConfig,
    cancel: &CancellationToken,
) -> Result<Job, CompileError> {
    let first = inputs
        .sources
        .first()
        .ok_or_else(|| CompileError::invalid_argument("sources", "at least one source is required"))?;

    let language = match inputs.language {
        Some(language) => language,
        None => first
            .extension()
            .and_then(|e| try_to_language(&e.to_string_lossy()))
            .ok_or_else(|| {
                CompileError::invalid_argument("language", "cannot infer from source extension")
            })?,
    };
    let name = inputs.name.unwrap_or_else(|| stem(first));

    let mut sources = Vec::with_capacity(inputs.sources.len());
    for path in &inputs.sources {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CompileError::io(path, &e))?;
        sources.push(text);
    }

    let mut references =
        futures::future::try_join_all(inputs.references.iter().map(|p| to_ref_with(p, config.reference_naming)))
            .await?;
    if inputs.runtime {
        references.extend(runtime_images(config, cancel).await?);
    }

    Ok(Job {
        language,
        name,
        sources,
        references,
    })
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unit".to_string())
}

fn print_diagnostics(diagnostics: &[CompilationError]) {
    for diagnostic in diagnostics {
        println!("{}", diagnostic);
    }
}

/// Cancels `cancel` on Ctrl-C.
fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
}

async fn compile(
    provider: &CompilerProvider,
    config: &CompilerConfig,
    inputs: Inputs,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<ExitCode, CompileError> {
    let job = load_job(inputs, config, cancel).await?;
    let compiler = provider.get_compiler(job.language)?;

    let result = compiler
        .compile(&job.name, &job.sources, &job.references, cancel)
        .await?;
    print_diagnostics(&result.errors);

    if result.has_errors() {
        tracing::info!("Compilation of {} failed", job.name);
        return Ok(ExitCode::FAILURE);
    }
    let Some(image) = result.assembly() else {
        tracing::warn!("Backend returned no image for {}", job.name);
        return Ok(ExitCode::FAILURE);
    };
    let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.{}", job.name, IMAGE_EXTENSION)));
    tokio::fs::write(&output, image)
        .await
        .map_err(|e| CompileError::io(&output, &e))?;
    tracing::info!("Wrote {} bytes to {}", image.len(), output.display());
    Ok(ExitCode::SUCCESS)
}

async fn analyse(
    provider: &CompilerProvider,
    config: &CompilerConfig,
    inputs: Inputs,
    mut rules: Vec<String>,
    rules_file: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<ExitCode, CompileError> {
    if let Some(path) = rules_file {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CompileError::io(&path, &e))?;
        rules.push(text);
    }
    let job = load_job(inputs, config, cancel).await?;
    let compiler = provider.get_compiler(job.language)?;
    let (analyzer, settings) = to_banned_symbols_analyzer(&rules.join("\n"));

    let diagnostics = compiler
        .analyse(
            analyzer,
            &[settings],
            &job.name,
            &job.sources,
            &job.references,
            cancel,
        )
        .await?;
    print_diagnostics(&diagnostics);

    if diagnostics.iter().any(CompilationError::is_error) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let config = CompilerConfig::from_env();
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let provider = CompilerProvider::with_defaults(&config)?;
    let code = match cli.command {
        Commands::Compile { inputs, output } => {
            compile(&provider, &config, inputs, output, &cancel).await?
        }
        Commands::Analyse {
            inputs,
            banned,
            banned_file,
        } => analyse(&provider, &config, inputs, banned, banned_file, &cancel).await?,
        Commands::Runtime { dir } => {
            let dir = dir.unwrap_or_else(|| config.runtime_dir.clone());
            for path in write_runtime(&dir).await? {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
