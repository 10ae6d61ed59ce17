// pipeline.rs — Backend orchestration and provenance
//
// Runs the fixed pass sequence (layout lowering → traversal collection →
// code generation) over one program registry and reports per-pass timing
// in verbose mode. Any pass failure aborts the run; the caller discards
// partial output.
//
// Preconditions: registry deserialized/populated by the front end.
// Postconditions: returns the generated translation unit, or the first
//   BackendError encountered.
// Failure modes: any BackendError from a pass.
// Side effects: verbose timing lines on stderr.

use std::time::Instant;

use crate::codegen::{self, CodegenOptions, GeneratedCode};
use crate::diag::Result;
use crate::lower;
use crate::registry::ProgramRegistry;
use crate::traversal;

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub codegen: CodegenOptions,
    pub verbose: bool,
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `mir_hash`: SHA-256 of the raw serialized MIR input.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub mir_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the MIR hash (64 characters).
    pub fn mir_hash_hex(&self) -> String {
        bytes_to_hex(&self.mir_hash)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"mir_hash\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.mir_hash_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Compute provenance from the raw serialized MIR input.
pub fn compute_provenance(mir_json: &str) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(mir_json.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);

    Provenance {
        mir_hash: hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Pass runner ────────────────────────────────────────────────────────────

/// Run the backend pass sequence over a populated registry.
pub fn run_backend(registry: &ProgramRegistry, options: &BackendOptions) -> Result<GeneratedCode> {
    let t = Instant::now();
    let lowered = lower::lower_layout(registry)?;
    verbose_pass(options, "layout lowering", t);

    let t = Instant::now();
    let catalog = traversal::collect_traversals(registry)?;
    verbose_pass(options, "traversal synthesis", t);

    let t = Instant::now();
    let generated = codegen::codegen(registry, &lowered, &catalog, &options.codegen)?;
    verbose_pass(options, "codegen", t);

    Ok(generated)
}

fn verbose_pass(options: &BackendOptions, name: &str, started: Instant) {
    if options.verbose {
        eprintln!(
            "tgc: {} complete, {:.1}ms",
            name,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
