//! nproxy - inspect interface schemas and call native functions through them
//!
//! Main CLI entry point for the native-proxy crate.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use native_proxy::{
    Argument, InterfaceDescriptor, MethodDescriptor, NativeType, PassMode, ProxyConfig,
    ProxyFactory, Value,
};
use serde_json::json;
use std::ffi::CString;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nproxy")]
#[command(version)]
#[command(about = "Call native library functions through interface schemas", long_about = None)]
struct Cli {
    /// Configuration file (default: search for native-proxy.toml upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call one method of an interface against a library
    Call {
        /// Interface schema file (TOML)
        schema: PathBuf,

        /// Library path or bare name
        library: PathBuf,

        /// Method name
        method: String,

        /// Arguments; by-reference parameters take their initial value
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the methods an interface schema declares
    Describe {
        /// Interface schema file (TOML)
        schema: PathBuf,

        /// Print the descriptor as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Call {
            schema,
            library,
            method,
            args,
            json,
        } => cmd_call(
            cli.config.as_deref(),
            &schema,
            &library,
            &method,
            &args,
            json,
        ),
        Commands::Describe { schema, json } => cmd_describe(&schema, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<ProxyConfig> {
    match path {
        Some(path) => ProxyConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => ProxyConfig::load_from_cwd().context("Failed to load config"),
    }
}

fn load_schema(path: &Path) -> Result<InterfaceDescriptor> {
    InterfaceDescriptor::load_schema(path)
        .with_context(|| format!("Failed to load schema {}", path.display()))
}

fn cmd_describe(schema: &Path, json: bool) -> Result<()> {
    let descriptor = load_schema(schema)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    println!("interface {} ({} methods)", descriptor.name, descriptor.methods.len());
    for method in &descriptor.methods {
        match method.bound_symbol() {
            Some(_) => println!("  {}", method),
            None => println!("  {} (unbound)", method),
        }
    }
    Ok(())
}

fn cmd_call(
    config: Option<&Path>,
    schema: &Path,
    library: &Path,
    name: &str,
    args: &[String],
    json: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let descriptor = load_schema(schema)?;
    let (method, mut values, _strings) = select_overload(&descriptor, name, args)?;

    let factory = ProxyFactory::from_config(&config);
    // Safety: the schema is the caller's statement of the native signatures
    let proxy = unsafe { factory.build_descriptor(&descriptor, library)? };

    let mut arguments = Vec::with_capacity(values.len());
    for (value, param) in values.iter_mut().zip(&method.params) {
        let argument = match param.mode {
            PassMode::ByValue => Argument::Value(*value),
            PassMode::ByRefInOut => Argument::by_value_ref(value).ok_or_else(|| {
                anyhow!("parameter '{}' of type {} cannot be passed by reference", param.name, param.ty)
            })?,
        };
        arguments.push(argument);
    }

    let result = proxy.invoke_exact(&method.key(), &mut arguments)?;
    drop(arguments);

    let outputs: Vec<(&str, Value)> = method
        .params
        .iter()
        .zip(&values)
        .filter(|(param, _)| param.mode == PassMode::ByRefInOut)
        .map(|(param, value)| (param.name.as_str(), *value))
        .collect();

    if json {
        let outputs: serde_json::Map<String, serde_json::Value> = outputs
            .iter()
            .map(|(name, value)| (name.to_string(), json!(value)))
            .collect();
        let report = json!({
            "method": method.to_string(),
            "result": result,
            "outputs": outputs,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if !result.is_void() {
            println!("{}", result);
        }
        for (name, value) in outputs {
            println!("{} = {}", name, value);
        }
    }
    Ok(())
}

/// Pick the overload whose parameters the textual arguments parse as.
///
/// Returns the method, the parsed values and any C strings that by-value
/// `char*` arguments point into.
fn select_overload<'a>(
    descriptor: &'a InterfaceDescriptor,
    name: &str,
    args: &[String],
) -> Result<(&'a MethodDescriptor, Vec<Value>, Vec<CString>)> {
    let candidates = descriptor.overloads(name);
    if candidates.is_empty() {
        bail!("Interface {} has no method '{}'", descriptor.name, name);
    }

    let mut last_error = None;
    for method in candidates {
        if method.params.len() != args.len() {
            last_error = Some(anyhow!(
                "{} takes {} argument(s), got {}",
                method,
                method.params.len(),
                args.len()
            ));
            continue;
        }
        match parse_arguments(method, args) {
            Ok((values, strings)) => return Ok((method, values, strings)),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("No overload of '{}' matches", name)))
}

fn parse_arguments(
    method: &MethodDescriptor,
    args: &[String],
) -> Result<(Vec<Value>, Vec<CString>)> {
    let mut values = Vec::with_capacity(args.len());
    let mut strings = Vec::new();

    for (param, text) in method.params.iter().zip(args) {
        if param.ty == NativeType::CStr && param.mode == PassMode::ByValue {
            let string = CString::new(text.as_str())
                .with_context(|| format!("Argument '{}' contains a NUL byte", param.name))?;
            // The CString's heap buffer does not move when the CString does
            values.push(Value::Ptr(string.as_ptr() as usize));
            strings.push(string);
            continue;
        }
        let value = Value::parse(text, param.ty).ok_or_else(|| {
            anyhow!("Cannot parse '{}' as {} for parameter '{}'", text, param.ty, param.name)
        })?;
        values.push(value);
    }
    Ok((values, strings))
}
