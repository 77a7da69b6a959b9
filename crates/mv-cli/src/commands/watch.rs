//! Watch command implementation

use anyhow::Result;
use futures::StreamExt;

use mv_core::config::ClientConfig;

use super::open_context;
use crate::output::{format_state_line, print_info};

/// Print every session change until interrupted
pub async fn watch_command(config: &ClientConfig) -> Result<()> {
    let (context, _) = open_context(config).await?;
    print_info("Watching session state (Ctrl+C to stop)");

    let mut states = context.observe_session_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = states.next() => match next {
                Some(state) => println!("{}", format_state_line(&state)),
                None => break,
            },
        }
    }

    context.shutdown();
    Ok(())
}
