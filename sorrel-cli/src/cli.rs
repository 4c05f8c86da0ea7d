//! CLI for the Sorrel bytecode runtime.

use clap::{App, Arg};
use sorrel::Config;

#[derive(Debug)]
pub struct Cli {
    /// Path to the compiled prototype to run.
    pub path: String,
    pub dump_code: bool,
    pub trace: bool,
}

impl Cli {
    pub fn new() -> Self {
        let version = &format!("v{}", env!("CARGO_PKG_VERSION"))[..];

        let app = App::new("sorrel")
            .about("The Sorrel bytecode runtime")
            .version(version)
            .arg(
                Arg::with_name("dump-bytecode")
                    .long("dump-bytecode")
                    .short("d")
                    .help("Dump the program's bytecode before running"),
            )
            .arg(
                Arg::with_name("trace")
                    .long("trace")
                    .short("t")
                    .help("Trace the VM's execution"),
            )
            .arg(
                Arg::with_name("FILE.json")
                    .help("Path to a compiled prototype")
                    .required(true),
            );

        let matches = app.get_matches();

        let path = matches
            .value_of("FILE.json")
            .unwrap_or_default()
            .to_string();
        let dump_code = matches.is_present("dump-bytecode");
        let trace = matches.is_present("trace");

        Cli {
            path,
            dump_code,
            trace,
        }
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Config {
            dump_bytecode: cli.dump_code,
            trace: cli.trace,
            ..Default::default()
        }
    }
}
