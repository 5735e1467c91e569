use clap::ValueEnum;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Plaintext logs
    Plain,
    /// JSON logs
    Json,
}

pub fn init_logging(format: LogFormat) {
    let builder =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    match format {
        LogFormat::Plain => builder.try_init().ok(),
        LogFormat::Json => builder.json().try_init().ok(),
    };
}
