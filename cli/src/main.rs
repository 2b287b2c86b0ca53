use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use brine_struct::{decode_to_json, RuntimeError};
use brine_struct_compiler::{compile_module_to_c, compile_module_to_rust, compile_schema, CompileOptions, Module, StructError};
use brine_struct_schema::ByteOrder;

#[derive(Parser)]
#[command(name = "bstruct")]
#[command(about = "Compile struct schemas to C, Rust bindings, or inspect their layout and wire data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that compiles a schema.
#[derive(clap::Args)]
struct TargetArgs {
    /// JSON file with compile options (module name, target, allocator names)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name of the generated module (defaults to the input file stem)
    #[arg(long)]
    module_name: Option<String>,

    /// Pointer width of the target machine, in bytes (4 or 8)
    #[arg(long)]
    target_pointer_width: Option<u8>,

    /// Lay out and serialize for a big-endian target
    #[arg(long)]
    big_endian: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a `.bst` schema to a C header and source file
    Compile {
        /// Input `.bst` file
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Generate Rust FFI bindings for the C functions of a `.bst` schema
    GenRust {
        /// Input `.bst` schema file
        #[arg(short, long)]
        input: PathBuf,

        /// Output `.rs` file (if omitted, prints to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the finalized layout of every struct as JSON
    Layout {
        /// Input `.bst` schema file
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Decode a serialized struct to JSON (printed to stdout)
    Decode {
        /// Schema the data was written with
        #[arg(short, long)]
        schema: PathBuf,

        /// Name of the serialized struct
        #[arg(long = "struct")]
        struct_name: String,

        /// Serialized bytes
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn compile_options(input: &Path, args: &TargetArgs) -> Result<CompileOptions, StructError> {
    let mut options = match &args.config {
        Some(path) => CompileOptions::from_json(&fs::read_to_string(path)?)?,
        None => CompileOptions::default(),
    };
    if let Some(name) = &args.module_name {
        options.module_name = name.clone();
    } else if args.config.is_none() {
        if let Some(stem) = input.file_stem() {
            options.module_name = stem.to_string_lossy().into_owned();
        }
    }
    if let Some(width) = args.target_pointer_width {
        options.target.pointer_width = width;
    }
    if args.big_endian {
        options.target.byte_order = ByteOrder::Big;
    }
    options.target.validate()?;
    Ok(options)
}

fn load(input: &Path, args: &TargetArgs) -> Result<Module, StructError> {
    let options = compile_options(input, args)?;
    let text = fs::read_to_string(input)?;
    let mut module = compile_schema(&text, &options)?;
    module.set_source_file_name(&input.display().to_string());
    Ok(module)
}

fn init_logging() {
    if let Ok(filter) = EnvFilter::try_from_env("BRINE_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<(), RuntimeError> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Compile { input, out_dir, target } => {
            let module = load(input, target)?;
            let c = compile_module_to_c(&module)?;
            let dir = match out_dir {
                Some(dir) => dir.clone(),
                None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            let header_path = dir.join(&c.header_name);
            let source_path = dir.join(format!("{}.c", module.name()));
            fs::write(&header_path, &c.header).map_err(StructError::Io)?;
            fs::write(&source_path, &c.source).map_err(StructError::Io)?;
            info!(structs = module.structs().len(), "compiled module \"{}\"", module.name());
            println!(
                "Compiled {} → {}, {}",
                input.display(),
                header_path.display(),
                source_path.display()
            );
            Ok(())
        }

        Commands::GenRust { input, output, target } => {
            let module = load(input, target)?;
            let rust_code = compile_module_to_rust(&module)?;
            if let Some(out_path) = output {
                fs::write(out_path, &rust_code).map_err(StructError::Io)?;
                println!("Generated Rust bindings written to {}", out_path.display());
            } else {
                println!("{}", rust_code);
            }
            Ok(())
        }

        Commands::Layout { input, target } => {
            let module = load(input, target)?;
            println!("{}", serde_json::to_string_pretty(&module)?);
            Ok(())
        }

        Commands::Decode { schema, struct_name, input } => {
            let text = fs::read_to_string(schema).map_err(StructError::Io)?;
            let module = compile_schema(&text, &CompileOptions::default())?;
            let data = fs::read(input).map_err(StructError::Io)?;
            println!("{}", decode_to_json(&module, struct_name, &data)?);
            Ok(())
        }
    }
}
