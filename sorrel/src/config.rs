const DEFAULT_FILE_NAME: &str = "EVAL";

#[derive(Debug)]
pub struct Config {
    /// Print every prototype's bytecode before running.
    pub dump_bytecode: bool,
    /// Print each instruction as it executes.
    pub trace: bool,
    pub default_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            dump_bytecode: false,
            trace: false,
            default_filename: DEFAULT_FILE_NAME.to_string(),
        }
    }
}
