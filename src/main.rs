use std::collections::HashMap;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sieve::{compile, CachedMapAccessor, Schema, Vm, VmOptions};

/// Compile trait expressions and evaluate them against a record.
#[derive(Parser)]
#[command(name = "sieve", version, about)]
struct Args {
    /// Trait expressions, e.g. '(trait-eq "long" "1")'
    #[arg(required = true)]
    expressions: Vec<String>,

    /// Schema DDL, e.g. "long LONG, strings ARRAY<STRING>"
    #[arg(long, default_value = "")]
    schema: String,

    /// Record fields as KEY=VALUE pairs (repeatable)
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,

    /// Record as a JSON object of string fields
    #[arg(long, value_name = "JSON")]
    record: Option<String>,

    /// Print the compiled program instead of evaluating
    #[arg(long)]
    dump: bool,

    /// Disable the vectorized string comparison path
    #[arg(long)]
    no_simd: bool,

    /// Emit results as JSON instead of one boolean per line
    #[arg(long)]
    json: bool,
}

#[derive(serde::Serialize)]
struct Outcome<'a> {
    expression: &'a str,
    result: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let schema = match Schema::from_ddl(&args.schema) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("Schema error: {e}");
            process::exit(1);
        }
    };

    let program = match compile(&schema, &args.expressions) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Compile error: {e}");
            process::exit(1);
        }
    };

    if args.dump {
        print!("{program}");
        return;
    }

    let mut entries: HashMap<String, String> = HashMap::new();
    if let Some(json) = &args.record {
        match serde_json::from_str::<HashMap<String, String>>(json) {
            Ok(parsed) => entries.extend(parsed),
            Err(e) => {
                eprintln!("Record error: {e}");
                process::exit(1);
            }
        }
    }
    for pair in &args.fields {
        match pair.split_once('=') {
            Some((key, value)) => {
                entries.insert(key.to_string(), value.to_string());
            }
            None => {
                eprintln!("Record error: field '{pair}' is not KEY=VALUE");
                process::exit(1);
            }
        }
    }

    let mut traits = CachedMapAccessor::new(&schema, entries);
    let mut vm = Vm::new(VmOptions {
        vectorized: !args.no_simd,
    });

    if let Err(fault) = vm.evaluate(&program, &mut traits) {
        eprintln!("Evaluation fault: {fault}");
        process::exit(2);
    }

    if args.json {
        let outcomes: Vec<Outcome> = args
            .expressions
            .iter()
            .zip(vm.results())
            .map(|(expression, result)| Outcome {
                expression,
                result: *result,
            })
            .collect();
        match serde_json::to_string_pretty(&outcomes) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Serialization error: {e}");
                process::exit(1);
            }
        }
    } else {
        for result in vm.results() {
            println!("{result}");
        }
    }
}
