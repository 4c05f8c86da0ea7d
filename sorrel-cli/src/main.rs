use std::fs;
use std::process;
use std::rc::Rc;

use colored::Colorize;
use sorrel::common::FunctionPrototype;
use sorrel::{Config, Module, Value, VM};

mod cli;

fn main() {
    let args = cli::Cli::new();
    let config = Config::from(&args);

    let source = match fs::read_to_string(&args.path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{} cannot read {}: {}", "error:".red().bold(), args.path, err);
            process::exit(1);
        }
    };

    let prototype = match FunctionPrototype::from_json(&source) {
        Ok(prototype) => prototype,
        Err(err) => {
            eprintln!(
                "{} {} is not a compiled prototype: {}",
                "error:".red().bold(),
                args.path,
                err
            );
            process::exit(1);
        }
    };

    let mut vm = VM::with_config(config);
    let module = Module::new(&args.path);

    match vm.interpret(Rc::new(prototype), module) {
        Ok(Value::Nil) => {}
        Ok(value) => println!("{}", value),
        Err(err) => {
            err.emit();
            process::exit(1);
        }
    }
}
