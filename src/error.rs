use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing was processed; fix the configuration and run again.
    #[display("configuration error")]
    Config,
    #[display("could not open the processing journal")]
    Journal,
}
