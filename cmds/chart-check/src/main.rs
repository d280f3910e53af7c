use anyhow::Result;
use chart_check::{commands, commands::util::BrokenPipeGuard, telemetry};
use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "chart-check")]
#[command(about = "Render a chart and check the manifest it produces", long_about = None)]
#[command(version)]
struct Cli {
	/// Log level; takes priority over RUST_LOG
	#[arg(long, global = true)]
	log_level: Option<Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Render the chart and list the resources it produces
	Render(commands::render::RenderArgs),

	/// Print one rendered resource
	Get(commands::get::GetArgs),

	/// Compare a rendered resource with a YAML fixture
	Compare(commands::compare::CompareArgs),

	/// Check that every resource carries a label with one consistent value
	Labels(commands::labels::LabelsArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Render(args) => commands::render::run(args, stdout),
		Commands::Get(args) => commands::get::run(args, stdout),
		Commands::Compare(args) => commands::compare::run(args, stdout),
		Commands::Labels(args) => commands::labels::run(args, stdout),
	}
}
