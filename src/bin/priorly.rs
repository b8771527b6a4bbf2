use anyhow::Result;
use priorly::cli::{actions, actions::Action, start};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    match action {
        Action::Server(_) => actions::server::handle(action).await?,
    }

    Ok(())
}
