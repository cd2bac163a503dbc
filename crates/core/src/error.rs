use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProberError {
    #[error("unknown collector: {0}")]
    UnknownCollector(String),

    #[error("sampler configuration error: {0}")]
    SamplerConfig(String),

    #[error("tag parse error: {0}")]
    TagParse(String),

    #[error("expression evaluation error: {0}")]
    ExpressionEval(String),

    #[error("unknown plugin policy: {0}")]
    UnknownPolicy(String),

    #[error("sample error: {0}")]
    Sample(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ProberError>;
