//! Command-line entry point for the barley compiler.
//!
//! Thin shell over the library API: parse arguments into `CompileOptions`,
//! run the pipeline, and write the encoded `.wasm` next to the input (or
//! to the `-o` path). Diagnostics are printed by the compiler itself;
//! this binary only decides the exit status.

use std::path::PathBuf;

use anyhow::Result;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        anyhow::bail!(
            "Usage: {} <source_file> [-o <out.wasm>] [--uintptr-size <4|8>] [--no-lib] [--silent]",
            args[0]
        );
    }

    let src_path = PathBuf::from(&args[1]);
    let mut options = barley::CompileOptions::new();
    let mut out_path: Option<PathBuf> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                if i + 1 >= args.len() {
                    anyhow::bail!("-o requires an argument");
                }
                out_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--uintptr-size" => {
                if i + 1 >= args.len() {
                    anyhow::bail!("--uintptr-size requires an argument");
                }
                options.uintptr_size = args[i + 1]
                    .parse()
                    .map_err(|_| anyhow::anyhow!("--uintptr-size must be 4 or 8"))?;
                i += 2;
            }
            "--no-lib" => {
                options.no_lib = true;
                i += 1;
            }
            "--silent" => {
                options.silent = true;
                i += 1;
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    let module = match barley::compile_file(&src_path, options)? {
        Some(module) => module,
        None => std::process::exit(1),
    };

    let bytes = module.encode()?;
    let out_path = out_path.unwrap_or_else(|| src_path.with_extension("wasm"));
    std::fs::write(&out_path, &bytes)?;
    println!("wrote {} ({} bytes)", out_path.display(), bytes.len());
    Ok(())
}
