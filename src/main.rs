use lodestone::config::ServerConfig;
use lodestone::logger::{self, log, LogSeverity::*};
use lodestone::server::Server;

async fn serve(config: ServerConfig) -> lodestone::Result<()> {
    let server = Server::builder(config).build()?;
    let listener = server.bind().await?;
    server.run(listener).await
}

#[tokio::main]
async fn main() {
    logger::init();
    log("Lodestone init".to_string(), Info);

    let config = match std::env::args().nth(1) {
        Some(path) => match ServerConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                log(format!("{}", err), Fatal);
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    if let Err(err) = serve(config).await {
        log(format!("Server stopped: {}", err), Fatal);
        std::process::exit(1);
    }
}
