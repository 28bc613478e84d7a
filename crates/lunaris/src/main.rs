use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use lunaris_state::{BridgeError, LuaFunction, LuaState, LuaValue, StateConfig};
use rustyline::error::ReadlineError;
use tracing::{debug, error};
use tracing_subscriber::{fmt, EnvFilter};

const VERSION_BANNER: &str = concat!("Lunaris ", env!("CARGO_PKG_VERSION"), " -- Lua 5.4");

#[derive(Parser, Debug)]
#[command(name = "lunaris", version, about = "Run Lua 5.4 scripts through the Lunaris bridge")]
struct Cli {
    /// Script to run; `-` reads it from stdin
    script: Option<String>,

    /// Arguments handed to the script as `arg[1..]` and `...`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Execute a chunk before the script
    #[arg(short = 'e', value_name = "CHUNK")]
    execute: Vec<String>,

    /// Enter the interactive prompt after running the script
    #[arg(short, long)]
    interactive: bool,

    /// TOML file with instance settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compile the script and write its bytecode to FILE instead of running it
    #[arg(long, value_name = "FILE", requires = "script")]
    dump: Option<PathBuf>,

    /// Leave debug information out of dumped bytecode
    #[arg(long, requires = "dump")]
    strip: bool,

    /// Print the script's return values as a JSON array
    #[arg(long)]
    json: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Lua(#[from] BridgeError),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: String,
        source: toml::de::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot initialize prompt: {0}")]
    Prompt(#[from] ReadlineError),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lunaris: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => StateConfig::default(),
    };
    let lua = LuaState::with_config(config)?;

    if let (Some(script), Some(out)) = (&cli.script, &cli.dump) {
        return dump_script(&lua, script, out, cli.strip);
    }

    set_arg_table(&lua, cli.script.as_deref(), &cli.args)?;

    for chunk in &cli.execute {
        let results = lua.run_string(chunk, "(command line)")?;
        if cli.json {
            print_json(&results)?;
        }
    }

    let stdin_is_tty = std::io::stdin().is_terminal();
    match cli.script.as_deref() {
        Some(script) => {
            let results = run_script(&lua, script, &cli.args)?;
            if cli.json {
                print_json(&results)?;
            }
            if cli.interactive {
                run_repl(&lua)?;
            }
        }
        None if cli.interactive || (cli.execute.is_empty() && stdin_is_tty) => {
            println!("{VERSION_BANNER}");
            run_repl(&lua)?;
        }
        None if cli.execute.is_empty() => {
            let results = run_stdin(&lua, &[])?;
            if cli.json {
                print_json(&results)?;
            }
        }
        None => {}
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<StateConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config: StateConfig = toml::from_str(&text).map_err(|source| CliError::Config {
        path: path.display().to_string(),
        source,
    })?;
    debug!(?config, "loaded config");
    Ok(config)
}

/// `arg[0]` is the script, `arg[1..]` its arguments, `arg[-1]` the program.
fn set_arg_table(lua: &LuaState, script: Option<&str>, args: &[String]) -> Result<(), BridgeError> {
    let table = lua.create_table_with_capacity(args.len(), 2)?;
    table.raw_set(-1, "lunaris")?;
    if let Some(script) = script {
        table.raw_set(0, script)?;
    }
    for (i, a) in args.iter().enumerate() {
        table.raw_set(i as i64 + 1, a.as_str())?;
    }
    lua.set_global("arg", table)
}

fn script_args(args: &[String]) -> Vec<LuaValue> {
    args.iter().map(|a| LuaValue::from(a.as_str())).collect()
}

fn run_script(lua: &LuaState, script: &str, args: &[String]) -> Result<Vec<LuaValue>, CliError> {
    if script == "-" {
        return run_stdin(lua, args);
    }
    let chunk = load_script(lua, script)?;
    Ok(chunk.call_multi(script_args(args))?)
}

/// Text or precompiled; the loader accepts both.
fn load_script(lua: &LuaState, script: &str) -> Result<LuaFunction, CliError> {
    lua.load_file(script).map_err(|e| match e {
        BridgeError::Io(source) => CliError::Read {
            path: script.to_string(),
            source,
        },
        e => CliError::Lua(e),
    })
}

fn run_stdin(lua: &LuaState, args: &[String]) -> Result<Vec<LuaValue>, CliError> {
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .map_err(|source| CliError::Read {
            path: "stdin".to_string(),
            source,
        })?;
    let chunk = lua.load(&buf, "stdin")?;
    Ok(chunk.call_multi(script_args(args))?)
}

fn dump_script(lua: &LuaState, script: &str, out: &Path, strip: bool) -> Result<(), CliError> {
    let chunk = load_script(lua, script)?;
    let bytes = lua.dump(&chunk, strip)?;
    std::fs::write(out, &bytes).map_err(|source| CliError::Write {
        path: out.display().to_string(),
        source,
    })?;
    debug!(script, out = %out.display(), len = bytes.len(), "wrote bytecode");
    Ok(())
}

fn print_json(results: &[LuaValue]) -> Result<(), BridgeError> {
    let items = results
        .iter()
        .map(LuaValue::to_json)
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::Value::Array(items));
    Ok(())
}

fn run_repl(lua: &LuaState) -> Result<(), CliError> {
    let config = rustyline::config::Config::builder()
        .auto_add_history(true)
        .build();
    let mut rl = rustyline::DefaultEditor::with_config(config)?;

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!(%e, "readline failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Expressions first, so `1 + 1` prints its value.
        if let Ok(chunk) = lua.load(format!("return {line}"), "stdin") {
            report(chunk.call_multi([]));
            continue;
        }

        let mut source = line.to_string();
        loop {
            match lua.load(&source, "stdin") {
                Ok(chunk) => {
                    report(chunk.call_multi([]));
                    break;
                }
                Err(BridgeError::Runtime(msg)) if msg.ends_with("<eof>") => match rl.readline(">> ") {
                    Ok(more) => {
                        source.push('\n');
                        source.push_str(&more);
                    }
                    Err(_) => {
                        eprintln!("{msg}");
                        break;
                    }
                },
                Err(e) => {
                    eprintln!("{e}");
                    break;
                }
            }
        }
    }
    Ok(())
}

fn report(results: Result<Vec<LuaValue>, BridgeError>) {
    match results {
        Ok(values) if values.is_empty() => {}
        Ok(values) => {
            let parts: Vec<String> = values.iter().map(LuaValue::to_string).collect();
            println!("{}", parts.join("\t"));
        }
        Err(e) => eprintln!("{e}"),
    }
}
