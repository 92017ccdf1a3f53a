//! Interactive console gateway.

use super::MsgGateway;
use crate::command::CommandHandler;
use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Gateway on stdin/stdout for local interactive use.
#[derive(Default)]
pub struct ConsoleGateway;

impl ConsoleGateway {
    pub fn new() -> Self {
        Self
    }

    /// Spawn the stdin command loop. Each line is dispatched to the command
    /// handler and the reply printed; the loop exits on shutdown or EOF.
    pub fn spawn_command_loop(
        handler: Arc<CommandHandler>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) => {
                        let reply = handler.handle(&line).await;
                        println!("{}", reply);
                    }
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        debug!("Console read failed: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl MsgGateway for ConsoleGateway {
    async fn send_message(&self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }
}
