use thiserror::Error;

#[derive(Error, Debug)]
pub enum FatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown disk format: image is not FAT32")]
    NotFat32,

    #[error("Out of space: {0}")]
    OutOfSpace(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Unsupported name: {0}")]
    UnsupportedName(String),

    #[error("{operation} interrupted after {completed} of its writes: {source}")]
    PartialWrite {
        operation: &'static str,
        completed: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Cluster {0} is outside the data region")]
    InvalidCluster(u32),
}

pub type Result<T, E = FatError> = std::result::Result<T, E>;
