use std::ffi::OsString;
use std::path::PathBuf;

use clap::{
    arg, builder::PossibleValue, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    ArgMatches, Command, ValueEnum,
};

use crate::processing::layer_export::ChannelPacking;
use crate::utils::splitter_config::{OutputCompression, SplitterConfig};

/// Command line options. Options left unset keep the value from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arguments {
    pub input_file: PathBuf,
    pub config_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub packing: Option<ChannelPacking>,
    pub compression: Option<OutputCompression>,
    pub keep_partial: bool,
}

impl Arguments {
    pub fn apply_to(&self, config: &mut SplitterConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(packing) = self.packing {
            config.packing = packing;
        }
        if let Some(compression) = self.compression {
            config.compression = compression;
        }
        if self.keep_partial {
            config.cleanup_on_failure = false;
        }
    }
}

impl ValueEnum for ChannelPacking {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Compact, Self::FixedRgba]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            Self::Compact => Some(PossibleValue::new("compact").help("Only the present components")),
            Self::FixedRgba => Some(PossibleValue::new("fixed-rgba").help("Always R, G, B, A; missing ones are zero")),
        }
    }
}

impl ValueEnum for OutputCompression {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::None, Self::Rle, Self::Zip1, Self::Zip16, Self::Piz]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            Self::None => Some(PossibleValue::new("none")),
            Self::Rle => Some(PossibleValue::new("rle")),
            Self::Zip1 => Some(PossibleValue::new("zip1")),
            Self::Zip16 => Some(PossibleValue::new("zip16")),
            Self::Piz => Some(PossibleValue::new("piz")),
        }
    }
}

pub struct CliParser {
    command: Command,
}

impl CliParser {
    pub fn new() -> Self {
        let command = Self::create_base_command();
        let command = Self::register_arguments(command);
        CliParser { command }
    }

    /// Parses the arguments; prints usage and exits with status 2 when they are invalid.
    pub fn parse<I, T>(&mut self, itr: I) -> Arguments
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self
            .command
            .try_get_matches_from_mut(itr)
            .unwrap_or_else(|e| e.exit());
        Self::extract_arguments(&matches)
    }

    fn register_arguments(command: Command) -> Command {
        let command = Self::register_input_file_argument(command);
        let command = Self::register_config_file_argument(command);
        let command = Self::register_output_dir_argument(command);
        let command = Self::register_packing_argument(command);
        let command = Self::register_compression_argument(command);
        Self::register_keep_partial_argument(command)
    }

    fn register_input_file_argument(command: Command) -> Command {
        command.arg(Self::create_input_file_argument())
    }

    fn register_config_file_argument(command: Command) -> Command {
        command.arg(Self::create_config_file_argument())
    }

    fn register_output_dir_argument(command: Command) -> Command {
        command.arg(Self::create_output_dir_argument())
    }

    fn register_packing_argument(command: Command) -> Command {
        command.arg(Self::create_packing_argument())
    }

    fn register_compression_argument(command: Command) -> Command {
        command.arg(Self::create_compression_argument())
    }

    fn register_keep_partial_argument(command: Command) -> Command {
        command.arg(Self::create_keep_partial_argument())
    }

    fn create_base_command() -> Command {
        Command::new(crate_name!())
            .version(crate_version!())
            .about(crate_description!())
    }

    fn create_input_file_argument() -> Arg {
        Arg::new("input_file")
            .help("Layered EXR file to split")
            .value_parser(value_parser!(PathBuf))
            .required(true)
    }

    fn create_config_file_argument() -> Arg {
        arg!(config_file: -c --config <FILE> "Config file (default: exr_splitter.json next to the executable)")
            .required(false)
            .value_parser(value_parser!(PathBuf))
    }

    fn create_output_dir_argument() -> Arg {
        arg!(output_dir: -o --"output-dir" <DIR> "Directory for the plane files (default: next to the input)")
            .required(false)
            .value_parser(value_parser!(PathBuf))
    }

    fn create_packing_argument() -> Arg {
        arg!(packing: -p --packing <PACKING> "Channel layout of the output planes")
            .required(false)
            .value_parser(value_parser!(ChannelPacking))
    }

    fn create_compression_argument() -> Arg {
        arg!(compression: --compression <COMPRESSION> "Compression of the output files")
            .required(false)
            .value_parser(value_parser!(OutputCompression))
    }

    fn create_keep_partial_argument() -> Arg {
        arg!(keep_partial: --"keep-partial" "Keep already written files when the split fails")
            .action(ArgAction::SetTrue)
    }

    fn extract_arguments(matches: &ArgMatches) -> Arguments {
        Arguments {
            input_file: Self::extract_input_file_argument(matches),
            config_file: Self::extract_config_file_argument(matches),
            output_dir: Self::extract_output_dir_argument(matches),
            packing: Self::extract_packing_argument(matches),
            compression: Self::extract_compression_argument(matches),
            keep_partial: Self::extract_keep_partial_argument(matches),
        }
    }

    fn extract_input_file_argument(matches: &ArgMatches) -> PathBuf {
        matches
            .get_one::<PathBuf>("input_file")
            .expect("Required argument input_file not provided")
            .clone()
    }

    fn extract_config_file_argument(matches: &ArgMatches) -> Option<PathBuf> {
        matches.get_one::<PathBuf>("config_file").cloned()
    }

    fn extract_output_dir_argument(matches: &ArgMatches) -> Option<PathBuf> {
        matches.get_one::<PathBuf>("output_dir").cloned()
    }

    fn extract_packing_argument(matches: &ArgMatches) -> Option<ChannelPacking> {
        matches.get_one::<ChannelPacking>("packing").copied()
    }

    fn extract_compression_argument(matches: &ArgMatches) -> Option<OutputCompression> {
        matches.get_one::<OutputCompression>("compression").copied()
    }

    fn extract_keep_partial_argument(matches: &ArgMatches) -> bool {
        matches.get_flag("keep_partial")
    }
}

impl Default for CliParser {
    fn default() -> Self {
        Self::new()
    }
}
