use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let args = browsergate::Cli::parse();
	if let Err(failure) = browsergate::run(args).await {
		error!(target = "gate", %failure, "session failed");
		std::process::exit(1);
	}
}
