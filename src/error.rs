use thiserror::Error;

#[derive(Debug, Error)]
/// Lists errors that abort a recalibration run
pub enum Error {
    #[error("Invalid argument: {0}")]
    /// A command line value is out of range or missing
    InvalidArgument(String),
    #[error("Input must be a BAM, CRAM or FASTQ file, got {0}")]
    /// The input extension names no supported container
    UnsupportedFormat(String),
    #[error("Empty input: {0}")]
    /// No sequence to work with, or coverage estimated at zero
    EmptyInput(String),
    #[error("Sample filter false positive rate {0:.4} is too high; increase --genomelen and try again")]
    /// The realized filter load says the genome length was underestimated
    ParameterOutOfRange(f64),
    #[error("Could not process the BAM file")]
    /// Bam reading or writing error
    BamError(#[from] rust_htslib::errors::Error),
    #[error("Could not read the input")]
    /// Plain I/O error, including FASTQ record parsing
    IoError(#[from] std::io::Error),
    #[error("Could not open compressed input")]
    /// Decompression sniffing failed
    DecompressError(#[from] niffler::Error),
    #[error("Could not convert bytes as it is invalid UTF-8")]
    /// Data is not in UTF-8 format
    NotUTF8(#[from] std::string::FromUtf8Error),
}
