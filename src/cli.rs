use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub(crate) struct Requal {
    /// Determines verbosity of the processing, can be specified multiple times -vvv
    #[structopt(short, long, parse(from_occurrences))]
    pub verbosity: u8,
    #[structopt(
        short,
        long,
        help = "K-mer length used for sampling and error detection",
        default_value = "32"
    )]
    pub(crate) ksize: usize,
    #[structopt(short, long, help = "Read reported qualities from the OQ tag")]
    pub(crate) use_oq: bool,
    #[structopt(
        short,
        long,
        help = "Store the overwritten qualities in the OQ tag of the output"
    )]
    pub(crate) set_oq: bool,
    #[structopt(
        short,
        long,
        help = "Total genome length; required for FASTQ input, taken from the header otherwise"
    )]
    pub(crate) genomelen: Option<u64>,
    #[structopt(
        short,
        long,
        help = "Sequencing depth; estimated from the input when absent"
    )]
    pub(crate) coverage: Option<u32>,
    #[structopt(short, long, help = "K-mer sampling rate; defaults to 7/coverage")]
    pub(crate) alpha: Option<f64>,
    #[structopt(
        short,
        long,
        help = "Corrected copy of the input used as ground truth; skips the k-mer phase"
    )]
    pub(crate) fixed: Option<PathBuf>,
    #[structopt(
        short,
        long,
        help = "Number of extra htslib reader/writer threads",
        default_value = "0"
    )]
    pub(crate) threads: usize,
    #[structopt(long, help = "Subsampler seed; drawn from entropy when absent")]
    pub(crate) seed: Option<u64>,
    #[structopt(
        help = "Reads to recalibrate (BAM, CRAM or FASTQ)",
        required = true,
        parse(from_os_str)
    )]
    pub(crate) input: PathBuf,
}

impl Requal {
    pub fn set_logging(&self) {
        use log::LevelFilter::*;

        let log_level = match self.verbosity {
            level if level == 1 => Info,
            level if level == 2 => Debug,
            level if level > 2 => Trace,
            _ => Warn,
        };

        env_logger::builder()
            .format_module_path(false)
            .filter_module("requal", log_level)
            .init();
    }
}
