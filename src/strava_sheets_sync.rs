use sync_cli::sync_cli_opts::SyncCliOpts;

#[tokio::main]
async fn main() {
    env_logger::init();

    match SyncCliOpts::process_args().await {
        Ok(()) => (),
        Err(e) => {
            if e.to_string().contains("Broken pipe") {
            } else {
                eprintln!("ERROR: {e}");
                std::process::exit(1);
            }
        }
    }
}
