use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = mediaratectl::Cli::parse();
    mediaratectl::init_tracing(cli.log_json);
    if let Err(err) = mediaratectl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
