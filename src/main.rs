use lawmatics_mcp::config::Settings;

#[tokio::main]
async fn main() {
    let result = match Settings::load() {
        Ok(settings) => lawmatics_mcp::run(settings).await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        eprintln!("lawmatics-mcp: {}", err.render());
        std::process::exit(1);
    }
}
