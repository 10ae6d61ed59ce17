use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, clap::ValueEnum)]
enum EmitStage {
    Cpp,
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "tgc",
    version,
    about = "Trellis Graph Compiler — lowers scheduled graph-program MIR to parallel C++"
)]
struct Cli {
    /// Input MIR registry (JSON, produced by the front end)
    source: PathBuf,

    /// Output file path
    #[arg(short, long, default_value = "out.cpp")]
    output: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Cpp)]
    emit: EmitStage,

    /// Emit pybind wrappers for exported functions
    #[arg(long)]
    pybind: bool,

    /// Module name for the pybind registration block
    #[arg(long, default_value = "graph_module")]
    module_name: String,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("tgc: source = {}", cli.source.display());
        eprintln!("tgc: output = {}", cli.output.display());
        eprintln!("tgc: emit   = {:?}", cli.emit);
    }

    // ── Read and deserialize the MIR registry ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tgc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let registry: tgc::registry::ProgramRegistry = match serde_json::from_str(&source) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("tgc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    if cli.verbose {
        eprintln!(
            "tgc: loaded {} functions, {} constants, {} edgesets",
            registry.functions().count(),
            registry.constants.len(),
            registry.edgesets.len(),
        );
    }

    if cli.emit == EmitStage::BuildInfo {
        let provenance = tgc::pipeline::compute_provenance(&source);
        print!("{}", provenance.to_json());
        return;
    }

    // ── Run the backend passes ──
    let options = tgc::pipeline::BackendOptions {
        codegen: tgc::codegen::CodegenOptions {
            pybind: cli.pybind,
            module_name: cli.module_name.clone(),
        },
        verbose: cli.verbose,
    };

    let generated = match tgc::pipeline::run_backend(&registry, &options) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("tgc: error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::write(&cli.output, generated.cpp_source) {
        eprintln!("tgc: error: {}: {}", cli.output.display(), e);
        std::process::exit(2);
    }

    if cli.verbose {
        eprintln!("tgc: wrote {}", cli.output.display());
    }
}
