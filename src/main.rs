use clap::Parser;
use robot_directory::{logging, Acceptor, Cli, Config, ServerError};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    logging::set_up();

    let config = Config::from(Cli::parse());
    tracing::debug!("{config:?}");

    let mut acceptor = Acceptor::new(config);
    acceptor.start().await?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!("failed to listen for ctrl-c: {e}");
            }
        }
        _ = acceptor.closed() => {}
    }

    acceptor.stop().await
}
