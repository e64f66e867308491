//! A small inspection tool that prints a run summary per file.

use std::env;
use std::process::ExitCode;

use mzcraft::RawDataFile;

fn main() -> ExitCode {
    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("Usage: mzcraft <file.mzML|file.mzXML> ...");
        return ExitCode::from(2);
    }

    let mut failed = false;
    for path in paths {
        match RawDataFile::open(&path) {
            Ok(data) => {
                print!("{}", data.summary());
                for warning in data.warnings() {
                    eprintln!("Warning: {warning}");
                }
                println!();
            }
            Err(error) => {
                eprintln!("{path}: {error}");
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
