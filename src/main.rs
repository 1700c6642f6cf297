use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use env_logger::Env;
use progs_vm::bytecode::{dump_module, AssemblyError, AssemblySource};
use progs_vm::config::{self, ConfigError, VmConfig, CONFIG};
use progs_vm::events::{set_log_file, set_log_format, Event, LogFormat};
use progs_vm::vm::types::format_version;
use progs_vm::vm::{load, validate, LoadError, Module, RuntimeError, ValidationError, VMError, VM};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::process;
use thiserror::Error;

#[derive(Debug, Error)]
enum AppError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("VM error: {0}")]
    VM(#[from] VMError),

    #[error("Runtime error: {0}")]
    Runtime(Box<RuntimeError>),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<RuntimeError> for AppError {
    fn from(err: RuntimeError) -> Self {
        AppError::Runtime(Box::new(err))
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

fn module_arg() -> Arg {
    Arg::new("module")
        .value_name("FILE")
        .help("Compiled progs module")
        .required(true)
}

fn entities_arg() -> Arg {
    Arg::new("entities")
        .long("entities")
        .value_name("COUNT")
        .help("Number of entity records to allocate")
        .default_value("16")
        .value_parser(value_parser!(usize))
}

fn heap_arg() -> Arg {
    Arg::new("heap")
        .long("heap")
        .value_name("BYTES")
        .help("Size of the auxiliary heap")
        .default_value("0")
        .value_parser(value_parser!(usize))
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help).action(ArgAction::SetTrue)
}

fn cli() -> Command {
    Command::new("progs-vm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Loader, validator and interpreter for progs bytecode modules")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Display detailed loading and execution information")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output events and reports in JSON format")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Also append events to this file")
                .global(true),
        )
        .subcommand(
            Command::new("info")
                .about("Show the header, checksum and memory layout of a module")
                .arg(module_arg())
                .arg(entities_arg())
                .arg(heap_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Run the static opcode and operand validator")
                .arg(module_arg()),
        )
        .subcommand(
            Command::new("disasm")
                .about("Disassemble a module or one of its functions")
                .arg(module_arg())
                .arg(
                    Arg::new("function")
                        .long("function")
                        .short('f')
                        .value_name("NAME")
                        .help("Only disassemble this function"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a function of a module")
                .arg(module_arg())
                .arg(
                    Arg::new("function")
                        .long("function")
                        .short('f')
                        .value_name("NAME")
                        .help("Function to execute")
                        .default_value("main"),
                )
                .arg(entities_arg())
                .arg(heap_arg())
                .arg(flag("boundscheck", "Validate on load and check entity, field and jump bounds"))
                .arg(flag("faultchecks", "Substitute a sentinel for division by zero"))
                .arg(flag("no-exec-limit", "Disable the runaway-loop budget"))
                .arg(flag("trace", "Print every executed statement"))
                .arg(flag("profile", "Print the functions that executed the most statements"))
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("FILE")
                        .help("JSON configuration file"),
                ),
        )
        .subcommand(
            Command::new("assemble")
                .about("Build a module from a JSON assembly source")
                .arg(
                    Arg::new("source")
                        .value_name("SOURCE")
                        .help("JSON assembly source")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Where to write the module")
                        .default_value("progs.dat"),
                ),
        )
}

fn main() {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");
    let json_output = matches.get_flag("json");

    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();
    if json_output {
        set_log_format(LogFormat::Json);
    }
    set_log_file(matches.get_one::<String>("log-file").cloned());
    config::init();

    let result = match matches.subcommand() {
        Some(("info", sub)) => run_info(sub, json_output),
        Some(("check", sub)) => run_check(sub),
        Some(("disasm", sub)) => run_disasm(sub),
        Some(("run", sub)) => run_program(sub, json_output),
        Some(("assemble", sub)) => run_assemble(sub),
        _ => Err(AppError::Other("unknown command".to_string())),
    };

    if let Err(err) = result {
        let event = match &err {
            AppError::Runtime(runtime) => Event::error("fault".to_string(), runtime.to_string())
                .with_data(json!({
                    "statement": runtime.statement,
                    "function": runtime.function,
                    "backtrace": runtime.backtrace,
                })),
            other => Event::error("error".to_string(), other.to_string()),
        };
        if let AppError::Runtime(runtime) = &err {
            eprint!("{}", runtime.dump());
        }
        if event.emit().is_err() {
            eprintln!("Error: {}", err);
        }
        process::exit(1);
    }
}

fn module_path(matches: &ArgMatches) -> Result<&str, AppError> {
    matches
        .get_one::<String>("module")
        .map(String::as_str)
        .ok_or_else(|| AppError::Other("missing module path".to_string()))
}

fn read_module(path: &str) -> Result<Vec<u8>, AppError> {
    if !Path::new(path).exists() {
        return Err(format!("Module file not found: {}", path).into());
    }
    Ok(fs::read(path)?)
}

fn sizes(matches: &ArgMatches) -> (usize, usize) {
    (
        matches.get_one::<usize>("entities").copied().unwrap_or(16),
        matches.get_one::<usize>("heap").copied().unwrap_or(0),
    )
}

fn run_info(matches: &ArgMatches, json_output: bool) -> Result<(), AppError> {
    let bytes = read_module(module_path(matches)?)?;
    let (entities, heap) = sizes(matches);
    let module = load(&bytes, entities, heap)?;
    let digest = hex::encode(Sha256::digest(&bytes));

    if json_output {
        let report = json!({
            "version": format_version(module.version()),
            "crc": format!("{:04x}", module.crc),
            "sha256": digest,
            "size": module.size,
            "header": module.header,
            "layout": module.layout.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("version:     {}", format_version(module.version()));
    println!("crc:         {:04x}", module.crc);
    println!("sha256:      {}", digest);
    println!("size:        {} bytes", module.size);
    println!("statements:  {}", module.statements.len());
    println!("functions:   {}", module.functions.len());
    println!("globals:     {}", module.globals.len());
    println!("globaldefs:  {}", module.global_defs.len());
    println!("fielddefs:   {}", module.field_defs.len());
    println!("entity size: {} words", module.header.entity_fields);
    println!("layout:      {}", module.layout);
    Ok(())
}

fn run_check(matches: &ArgMatches) -> Result<(), AppError> {
    let bytes = read_module(module_path(matches)?)?;
    let module = load(&bytes, 1, 0)?;
    validate(&module)?;
    println!("ok: {} statements validated", module.statements.len());
    Ok(())
}

fn run_disasm(matches: &ArgMatches) -> Result<(), AppError> {
    let bytes = read_module(module_path(matches)?)?;
    match matches.get_one::<String>("function") {
        Some(name) => {
            let vm = VM::load(&bytes, 1, 0, VmConfig::default())?;
            let function = vm
                .find_function(name)
                .ok_or_else(|| AppError::Other(format!("Function not found: {}", name)))?;
            for line in vm.disassemble(Some(function)) {
                println!("{}", line);
            }
        }
        None => {
            let module: Module = load(&bytes, 1, 0)?;
            print!("{}", dump_module(&module)?);
        }
    }
    Ok(())
}

fn format_float(value: f32) -> String {
    if value == value.trunc() && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

/// The small builtin set the command-line runner provides.
fn register_demo_builtins(vm: &mut VM) {
    vm.register_builtin(1, "print", |vm| {
        let text = vm.param_string(0)?;
        print!("{}", text);
        Ok(())
    });
    vm.register_builtin(2, "ftos", |vm| {
        let value = vm.param_float(0)?;
        vm.return_string(format_float(value))?;
        Ok(())
    });
    vm.register_builtin(3, "vtos", |vm| {
        let [x, y, z] = vm.param_vector(0)?;
        vm.return_string(format!("'{:5.1} {:5.1} {:5.1}'", x, y, z))?;
        Ok(())
    });
}

fn run_config(matches: &ArgMatches) -> Result<VmConfig, AppError> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => VmConfig::from_json_file(path)?,
        None => CONFIG.clone(),
    };
    config.bounds_check |= matches.get_flag("boundscheck");
    config.fault_checks |= matches.get_flag("faultchecks");
    config.no_exec_limit |= matches.get_flag("no-exec-limit");
    Ok(config)
}

fn run_program(matches: &ArgMatches, json_output: bool) -> Result<(), AppError> {
    let bytes = read_module(module_path(matches)?)?;
    let (entities, heap) = sizes(matches);
    let config = run_config(matches)?;
    let function = matches
        .get_one::<String>("function")
        .map(String::as_str)
        .unwrap_or("main");

    let mut vm = VM::load(&bytes, entities, heap, config)?;
    register_demo_builtins(&mut vm);
    vm.set_trace(matches.get_flag("trace"));

    let result = vm.execute_by_name(function);

    if matches.get_flag("trace") {
        for line in vm.trace_lines() {
            println!("{}", line);
        }
    }
    result?;

    let value = vm.result_float()?;
    if json_output {
        println!("{}", json!({ "function": function, "return": value }));
    } else {
        println!("return: {}", format_float(value));
    }

    if matches.get_flag("profile") {
        let report = vm.profile_report(10);
        if json_output {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            for entry in report {
                println!("{:>8} {} ({})", entry.statements, entry.function, entry.file);
            }
        }
    }
    Ok(())
}

fn run_assemble(matches: &ArgMatches) -> Result<(), AppError> {
    let source_path = matches
        .get_one::<String>("source")
        .ok_or_else(|| AppError::Other("missing source path".to_string()))?;
    let output = matches
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or("progs.dat");

    let source = AssemblySource::from_file(source_path)?;
    if source.functions.iter().all(|f| f.builtin.is_some()) {
        Event::warn(
            "assemble".to_string(),
            format!("{} defines no bytecode functions", source_path),
        )
        .emit()?;
    }
    let bytes = source.assemble()?.to_bytes();
    fs::write(output, &bytes)?;

    Event::info(
        "assemble".to_string(),
        format!("wrote {} bytes to {}", bytes.len(), output),
    )
    .emit()?;
    Ok(())
}
