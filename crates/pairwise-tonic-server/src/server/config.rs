use anyhow::bail;
use clap::Parser;

/// Runtime configuration for the `pairwise-tonic-server` binary.
///
/// These settings control the listening endpoint, per-stream buffering, and
/// shutdown behavior of the pairwise reduction service. All values are parsed
/// from CLI arguments or environment variables, with defaults suitable for
/// production.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pairwise-tonic-server",
    version,
    about = "A gRPC service that pairs streamed requests by timestamp and reduces each pair"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:8088" or "/tmp/pairwise.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8088"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of the response buffer between a session task and its gRPC
    /// stream.
    ///
    /// This affects how many responses can be buffered during the drain phase
    /// before the session must wait for the client to consume more data.
    /// Lower values increase backpressure responsiveness; higher values
    /// enable deeper pipelining.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to finish during graceful
    /// shutdown before cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub shutdown_timeout_secs: u64,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if !args.uds && args.server_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!(
                "SERVER_ADDR ({}) is not a valid socket address (did you mean --uds?)",
                args.server_addr
            );
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout_secs: args.shutdown_timeout_secs,
        })
    }
}
