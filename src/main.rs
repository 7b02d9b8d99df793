mod cli;
mod io;
mod processing;
mod utils;

use std::process::ExitCode;

use anyhow::Context;

use crate::cli::{Arguments, CliParser};
use crate::io::exr_sink::ExrSinkFactory;
use crate::io::exr_source::ExrSource;
use crate::processing::layer_export::{LayerExporter, SplitReport};
use crate::utils::logging::{init_logging, LogMessage};
use crate::utils::progress::LogProgress;
use crate::utils::splitter_config::load_config;

fn main() -> ExitCode {
    init_logging();

    // Błędy składni argumentów kończą proces z kodem 2 wewnątrz clap
    let arguments = CliParser::default().parse(std::env::args_os());

    match run(&arguments) {
        Ok(report) => {
            LogMessage::info(format!(
                "{} plane(s), {} row(s), {} channel(s) skipped",
                report.planes.len(),
                report.rows,
                report.discarded.len()
            ))
            .with_context("split")
            .send();
            for plane in &report.planes {
                let name = if plane.name.is_empty() { "<default>" } else { plane.name.as_str() };
                println!("{}\t{}\t{}", plane.path.display(), name, plane.channel_names.join(","));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            // Tylko stderr, niezależnie od filtra RUST_LOG
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// One line with the whole cause chain, outermost context first.
fn failure_message(error: &anyhow::Error) -> String {
    format!("Error: {:#}", error)
}

fn run(arguments: &Arguments) -> anyhow::Result<SplitReport> {
    let mut config = load_config(arguments.config_file.as_deref()).context("loading configuration")?;
    arguments.apply_to(&mut config);

    let input = arguments.input_file.as_path();
    let mut source = ExrSource::open(input)?;
    let factory = ExrSinkFactory::new(config.compression);
    let progress = LogProgress::new("split");

    let report = LayerExporter::new(&config)
        .export_planes(input, &mut source, &factory, &progress)
        .with_context(|| format!("splitting {}", input.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_carries_cause_chain() {
        let error = anyhow::Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
            .context("loading configuration");
        let message = failure_message(&error);
        assert_eq!(message, "Error: loading configuration: no such file");
        assert_eq!(message.lines().count(), 1);
    }
}
