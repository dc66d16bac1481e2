//! Jembed Runtime
//!
//! Command-line host: runs a script file or an inline snippet inside the
//! embedded runtime, headless or with a GUI event loop.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use jembed_core::{
    BindingSet, BindingValue, Engine, EngineConfig, HeadlessApp, NumericMatrix, NumericVector,
    Script,
};
use jembed_gui::{CloseBehavior, GuiToolkit, OffscreenToolkit, WindowedApp, WinitToolkit};
use jembed_script::QuickJsEngine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    Quickjs,
    Jvm,
}

/// Run a script inside an embedded runtime
#[derive(Parser, Debug)]
#[command(name = "jembed")]
#[command(version = jembed_core::VERSION)]
#[command(about, long_about = None)]
struct Args {
    /// Script file to run
    #[arg(value_name = "FILE", required_unless_present = "eval", conflicts_with = "eval")]
    file: Option<PathBuf>,

    /// Evaluate CODE instead of a file
    #[arg(short, long, value_name = "CODE")]
    eval: Option<String>,

    /// JSON engine configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = EngineKind::Quickjs)]
    engine: EngineKind,

    /// Run inside a GUI event loop
    #[arg(short, long)]
    windowed: bool,

    /// With --windowed: no native windows, close each window as it is shown
    #[arg(long, requires = "windowed")]
    offscreen: bool,

    /// Input binding; VALUE is read as JSON, falling back to text
    #[arg(short, long = "input", value_name = "NAME=VALUE", value_parser = parse_binding)]
    inputs: Vec<(String, BindingValue)>,

    /// Script variable to print after a headless run
    #[arg(short, long = "output", value_name = "NAME")]
    outputs: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_binding(raw: &str) -> Result<(String, BindingValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("binding name missing in '{raw}'"));
    }
    Ok((name.to_string(), parse_value(value)))
}

/// Read a command-line value as JSON where it maps onto a binding value.
fn parse_value(raw: &str) -> BindingValue {
    use serde_json::Value;

    fn numbers(items: &[Value]) -> Option<Vec<f64>> {
        items.iter().map(Value::as_f64).collect()
    }

    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(parsed) => parsed,
        Err(_) => return BindingValue::Text(raw.to_string()),
    };
    match parsed {
        Value::Null => BindingValue::Null,
        Value::Bool(b) => BindingValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BindingValue::Int(i),
            None => n.as_f64().map_or(BindingValue::Text(raw.to_string()), BindingValue::Float),
        },
        Value::String(s) => BindingValue::Text(s),
        Value::Array(items) => {
            if let Some(values) = numbers(&items) {
                return BindingValue::Vector(NumericVector::Double(values));
            }
            let rows: Option<Vec<Vec<f64>>> = items
                .iter()
                .map(|row| row.as_array().and_then(|row| numbers(row)))
                .collect();
            match rows {
                Some(rows) => BindingValue::Matrix(NumericMatrix::Double(rows)),
                None => BindingValue::Text(raw.to_string()),
            }
        }
        Value::Object(_) => BindingValue::Text(raw.to_string()),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_headless<E: Engine>(
    engine: &E,
    config: &EngineConfig,
    script: Script,
    inputs: &BindingSet,
    output_names: &[String],
) -> Result<()> {
    let mut app = HeadlessApp::new(engine, config).context("failed to start runtime")?;

    let mut outputs = BindingSet::new();
    for name in output_names {
        outputs.declare(name.as_str());
    }

    let origin = script.name().to_string();
    app.start(script, inputs, &mut outputs)
        .with_context(|| format!("failed to run {origin}"))?;

    for (name, value) in outputs.iter() {
        println!("{name} = {value}");
    }
    app.shutdown()?;
    Ok(())
}

fn run_windowed<E: Engine, T: GuiToolkit>(
    engine: &E,
    toolkit: T,
    config: &EngineConfig,
    script: Script,
    inputs: &BindingSet,
) -> Result<()> {
    let mut app = WindowedApp::new(engine, toolkit, config).context("failed to start runtime")?;
    let origin = script.name().to_string();
    app.start(script, inputs)
        .with_context(|| format!("failed to run {origin}"))?;
    app.shutdown()?;
    Ok(())
}

fn run_with<E: Engine>(engine: &E, args: &Args, config: &EngineConfig, script: Script) -> Result<()> {
    let inputs: BindingSet = args.inputs.iter().cloned().collect();

    if !args.windowed {
        return run_headless(engine, config, script, &inputs, &args.outputs);
    }

    if !args.outputs.is_empty() {
        tracing::warn!("output bindings are not read back in windowed mode");
    }
    if args.offscreen {
        let toolkit = OffscreenToolkit::new(CloseBehavior::Immediately);
        run_windowed(engine, toolkit, config, script, &inputs)
    } else {
        let toolkit = WinitToolkit::new().context("failed to create the GUI event loop")?;
        run_windowed(engine, toolkit, config, script, &inputs)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    tracing::info!("Jembed v{}", jembed_core::VERSION);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .with_headless(!args.windowed);

    let script = match (&args.eval, &args.file) {
        (Some(code), _) => Script::named("<eval>", code.as_str()),
        (None, Some(path)) => Script::from_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("no script given"),
    };

    match args.engine {
        EngineKind::Quickjs => run_with(&QuickJsEngine, &args, &config, script),
        #[cfg(feature = "jvm")]
        EngineKind::Jvm => run_with(&jembed_script::JvmEngine, &args, &config, script),
        #[cfg(not(feature = "jvm"))]
        EngineKind::Jvm => bail!("this build has no JVM support (enable the `jvm` feature)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), BindingValue::Int(42));
        assert_eq!(parse_value("-1.5"), BindingValue::Float(-1.5));
        assert_eq!(parse_value("true"), BindingValue::Bool(true));
        assert_eq!(parse_value("\"quoted\""), BindingValue::from("quoted"));
        assert_eq!(parse_value("world"), BindingValue::from("world"));
        assert_eq!(parse_value("[1, 2.5]"), BindingValue::from(vec![1.0, 2.5]));
        assert_eq!(
            parse_value("[[1], [2, 3]]"),
            BindingValue::from(vec![vec![1.0], vec![2.0, 3.0]])
        );
        assert_eq!(parse_value("[1, \"a\"]"), BindingValue::from("[1, \"a\"]"));
        assert_eq!(parse_value("{\"a\": 1}"), BindingValue::from("{\"a\": 1}"));
    }

    #[test]
    fn test_parse_binding() {
        assert_eq!(
            parse_binding("greetee=world").unwrap(),
            ("greetee".to_string(), BindingValue::from("world"))
        );
        assert_eq!(
            parse_binding("expr=a=b").unwrap(),
            ("expr".to_string(), BindingValue::from("a=b"))
        );
        assert!(parse_binding("missing").is_err());
        assert!(parse_binding("=1").is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "jembed", "--eval", "result = abs(val)", "-i", "val=-1.5", "-o", "result",
        ])
        .unwrap();
        assert_eq!(args.inputs, vec![("val".to_string(), BindingValue::Float(-1.5))]);
        assert_eq!(args.outputs, vec!["result"]);
        assert!(!args.windowed);

        assert!(Args::try_parse_from(["jembed"]).is_err());
        assert!(Args::try_parse_from(["jembed", "--offscreen", "-e", "1"]).is_err());
        assert!(Args::try_parse_from(["jembed", "script.js", "-e", "1"]).is_err());
    }
}
